// src/logformat/mod.rs
//! Placeholder-based line templates used for access logs and synthetic logs.

mod event;
mod generator;
mod template;
mod units;

pub use event::LogEvent;
pub use generator::generate_random_format;
pub use template::{resolve, LogFormat, Placeholder, PlaceholderKey, Segment, UNKNOWN_PLACEHOLDER};
pub use units::{render_latency, render_size, render_time};

use rand::Rng;

pub const APACHE_FORMAT: &str =
    "{client_ip} - - {time:%d/%m/%Y:%H:%M:%S} {method} {path} {status_code} -";
pub const NGINX_FORMAT: &str =
    "{client_ip} - {time:%d/%b/%Y:%H:%M:%S} {method} {path} {status_code} {latency:ms}";
pub const FULL_FORMAT: &str = "{time} {status_code} {method} {path} {client_ip} {latency} \"{user_agent}\" {protocol} {request_size} {response_size}";

/// Pick the process format from a `LOG_FORMAT` value: a preset name,
/// `random`, or a custom pattern. Empty selects the apache preset.
pub fn select<R: Rng + ?Sized>(value: &str, rng: &mut R) -> LogFormat {
    let trimmed = value.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "apache" => LogFormat::parse(APACHE_FORMAT),
        "nginx" => LogFormat::parse(NGINX_FORMAT),
        "full" => LogFormat::parse(FULL_FORMAT),
        "random" => generate_random_format(rng),
        _ => LogFormat::parse(trimmed),
    }
}
