// src/logformat/units.rs
//! Unit-aware rendering for the numeric placeholders.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::Duration;

const LATENCY_LADDER: &[(f64, &str)] = &[(1e9, "s"), (1e6, "ms"), (1e3, "mcs"), (1.0, "ns")];
const SIZE_LADDER: &[(f64, &str)] = &[(1e9, "gb"), (1e6, "mb"), (1e3, "kb"), (1.0, "b")];

// strftime conversions we hand to chrono; anything else is printed verbatim.
const TIME_TOKENS: &[char] = &[
    'Y', 'y', 'm', 'b', 'B', 'd', 'e', 'j', 'a', 'A', 'H', 'I', 'M', 'S', 'p', 'f', 'z', 'Z',
];

pub fn render_time(time: &DateTime<Utc>, pattern: Option<&str>) -> String {
    match pattern {
        None => time.to_rfc3339_opts(SecondsFormat::Secs, true),
        Some(pattern) => time.format(&translate_time_pattern(pattern)).to_string(),
    }
}

/// Rewrite a strftime-like pattern so every `%` either starts a conversion
/// chrono understands or is escaped.
pub fn translate_time_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut chars = pattern.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(next) if TIME_TOKENS.contains(&next) => {
                out.push('%');
                out.push(next);
                chars.next();
            }
            Some('%') => {
                out.push_str("%%");
                chars.next();
            }
            Some(next) => {
                out.push_str("%%");
                out.push(next);
                chars.next();
            }
            None => out.push_str("%%"),
        }
    }
    out
}

pub fn render_latency(latency: Duration, unit: Option<&str>) -> String {
    let nanos = latency.as_nanos() as f64;
    let divisor = match unit.map(str::to_ascii_lowercase).as_deref() {
        Some("s") => 1e9,
        Some("ms") => 1e6,
        Some("mcs") | Some("us") | Some("micros") => 1e3,
        Some("ns") => 1.0,
        _ => return auto_scale(nanos, LATENCY_LADDER),
    };
    trimmed(nanos / divisor)
}

pub fn render_size(bytes: u64, unit: Option<&str>) -> String {
    let bytes = bytes as f64;
    let divisor = match unit.map(str::to_ascii_lowercase).as_deref() {
        Some("b") => 1.0,
        Some("kb") => 1e3,
        Some("mb") => 1e6,
        Some("gb") => 1e9,
        _ => return auto_scale(bytes, SIZE_LADDER),
    };
    trimmed(bytes / divisor)
}

/// Largest unit keeping the magnitude at or above one, three decimals.
fn auto_scale(value: f64, ladder: &[(f64, &str)]) -> String {
    let (factor, label) = ladder
        .iter()
        .find(|(factor, _)| value >= *factor)
        .copied()
        .unwrap_or_else(|| ladder[ladder.len() - 1]);
    format!("{:.3}{}", value / factor, label)
}

fn trimmed(value: f64) -> String {
    let rounded = (value * 1000.0).round() / 1000.0;
    format!("{rounded}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap()
    }

    #[test]
    fn latency_units() {
        let one_second = Duration::from_nanos(1_000_000_000);
        assert_eq!(render_latency(one_second, Some("s")), "1");
        assert_eq!(render_latency(one_second, Some("ms")), "1000");
        assert_eq!(render_latency(one_second, Some("mcs")), "1000000");
        assert_eq!(render_latency(one_second, None), "1.000s");
        assert_eq!(render_latency(Duration::from_micros(1500), Some("ms")), "1.5");
        assert_eq!(render_latency(Duration::from_micros(1500), None), "1.500ms");
        assert_eq!(render_latency(Duration::ZERO, None), "0.000ns");
    }

    #[test]
    fn unknown_latency_unit_falls_back_to_auto() {
        assert_eq!(render_latency(Duration::from_millis(20), Some("fortnights")), "20.000ms");
    }

    #[test]
    fn size_units() {
        assert_eq!(render_size(10_001, None), "10.001kb");
        assert_eq!(render_size(512, None), "512.000b");
        assert_eq!(render_size(2_500_000, Some("mb")), "2.5");
        assert_eq!(render_size(2_500_000, Some("b")), "2500000");
        assert_eq!(render_size(3_000_000_000, None), "3.000gb");
    }

    #[test]
    fn time_without_pattern_is_rfc3339() {
        assert_eq!(render_time(&at(), None), "2024-03-07T09:05:02Z");
    }

    #[test]
    fn time_tokens_translate() {
        assert_eq!(render_time(&at(), Some("%d/%m/%Y:%H:%M:%S")), "07/03/2024:09:05:02");
        assert_eq!(render_time(&at(), Some("%d/%b/%Y")), "07/Mar/2024");
    }

    #[test]
    fn unknown_time_tokens_pass_through() {
        assert_eq!(render_time(&at(), Some("%Y %Q %")), "2024 %Q %");
        assert_eq!(render_time(&at(), Some("100%%")), "100%");
    }
}
