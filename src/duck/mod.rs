// src/duck/mod.rs
//! Duck-typed numeric fields.
//!
//! A request field may carry a plain JSON number, a numeric string, the bare
//! token `RANDOM`, or `RANDOM:<start>:<end>`. Fields are decoded leniently into
//! [`RawDuck`] and resolved into a concrete value once, while the request is
//! being decoded, so two decodes of the same body draw independently.

use rand::Rng;
use serde::Deserialize;
use std::ops::Range;

const RANDOM_TOKEN: &str = "RANDOM";

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DuckError {
    #[error("invalid RANDOM range {start}:{end}, start must be less than end")]
    InvalidRange { start: String, end: String },

    #[error("invalid RANDOM syntax: {0}")]
    InvalidSyntax(String),

    #[error("cannot parse {0:?} as a number")]
    NotANumber(String),

    #[error("expected an integer, got {0}")]
    NotAnInteger(String),
}

impl DuckError {
    pub fn is_range_error(&self) -> bool {
        matches!(self, DuckError::InvalidRange { .. })
    }
}

/// The parsed shape of a duck-typed field.
#[derive(Debug, Clone, PartialEq)]
pub enum DuckValue {
    Integer(i64),
    Float(f64),
    RandomInt(Range<i64>),
    RandomFloat(Range<f64>),
    RandomToken,
}

/// Numeric kinds a duck field can resolve into.
pub trait DuckKind: Copy + PartialOrd + std::fmt::Display + std::str::FromStr {
    fn literal(number: &serde_json::Number) -> Result<DuckValue, DuckError>;
    fn parsed(value: Self) -> DuckValue;
    fn ranged(range: Range<Self>) -> DuckValue;
    fn draw<R: Rng + ?Sized>(rng: &mut R, range: &Range<Self>) -> Self;
    fn extract(value: &DuckValue) -> Option<Self>;
    fn extract_range(value: &DuckValue) -> Option<Range<Self>>;
}

impl DuckKind for i64 {
    fn literal(number: &serde_json::Number) -> Result<DuckValue, DuckError> {
        number
            .as_i64()
            .map(DuckValue::Integer)
            .ok_or_else(|| DuckError::NotAnInteger(number.to_string()))
    }

    fn parsed(value: Self) -> DuckValue {
        DuckValue::Integer(value)
    }

    fn ranged(range: Range<Self>) -> DuckValue {
        DuckValue::RandomInt(range)
    }

    fn draw<R: Rng + ?Sized>(rng: &mut R, range: &Range<Self>) -> Self {
        rng.gen_range(range.clone())
    }

    fn extract(value: &DuckValue) -> Option<Self> {
        match value {
            DuckValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    fn extract_range(value: &DuckValue) -> Option<Range<Self>> {
        match value {
            DuckValue::RandomInt(range) => Some(range.clone()),
            _ => None,
        }
    }
}

impl DuckKind for f64 {
    fn literal(number: &serde_json::Number) -> Result<DuckValue, DuckError> {
        number
            .as_f64()
            .map(DuckValue::Float)
            .ok_or_else(|| DuckError::NotANumber(number.to_string()))
    }

    fn parsed(value: Self) -> DuckValue {
        DuckValue::Float(value)
    }

    fn ranged(range: Range<Self>) -> DuckValue {
        DuckValue::RandomFloat(range)
    }

    fn draw<R: Rng + ?Sized>(rng: &mut R, range: &Range<Self>) -> Self {
        range.start + rng.gen::<f64>() * (range.end - range.start)
    }

    fn extract(value: &DuckValue) -> Option<Self> {
        match value {
            DuckValue::Float(n) => Some(*n),
            _ => None,
        }
    }

    fn extract_range(value: &DuckValue) -> Option<Range<Self>> {
        match value {
            DuckValue::RandomFloat(range) => Some(range.clone()),
            _ => None,
        }
    }
}

impl DuckValue {
    /// Parse a JSON number literal as the declared kind.
    pub fn from_number<K: DuckKind>(number: &serde_json::Number) -> Result<Self, DuckError> {
        K::literal(number)
    }

    /// Parse a string field as the declared kind, expanding the RANDOM syntax.
    pub fn from_text<K: DuckKind>(text: &str) -> Result<Self, DuckError> {
        let text = text.trim();
        if text == RANDOM_TOKEN {
            return Ok(DuckValue::RandomToken);
        }

        if let Some(rest) = text.strip_prefix("RANDOM:") {
            let parts: Vec<&str> = rest.split(':').collect();
            if parts.len() != 2 {
                return Err(DuckError::InvalidSyntax(text.to_string()));
            }
            let start = parse_kind::<K>(parts[0])?;
            let end = parse_kind::<K>(parts[1])?;
            if start >= end {
                return Err(DuckError::InvalidRange {
                    start: start.to_string(),
                    end: end.to_string(),
                });
            }
            return Ok(K::ranged(start..end));
        }

        parse_kind::<K>(text).map(K::parsed)
    }

    /// Produce the concrete value, drawing from `default` for a bare `RANDOM`.
    pub fn resolve<K: DuckKind, R: Rng + ?Sized>(&self, rng: &mut R, default: Range<K>) -> K {
        if let Some(value) = K::extract(self) {
            return value;
        }
        let range = K::extract_range(self).unwrap_or(default);
        K::draw(rng, &range)
    }
}

fn parse_kind<K: DuckKind>(text: &str) -> Result<K, DuckError> {
    text.trim()
        .parse::<K>()
        .map_err(|_| DuckError::NotANumber(text.to_string()))
}

/// A field as it arrives on the wire: a JSON number or a string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawDuck {
    Number(serde_json::Number),
    Text(String),
}

impl Default for RawDuck {
    fn default() -> Self {
        RawDuck::Number(serde_json::Number::from(0))
    }
}

impl RawDuck {
    pub fn parse<K: DuckKind>(&self) -> Result<DuckValue, DuckError> {
        match self {
            RawDuck::Number(number) => DuckValue::from_number::<K>(number),
            RawDuck::Text(text) => DuckValue::from_text::<K>(text),
        }
    }

    pub fn resolve_with<K: DuckKind, R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        default: Range<K>,
    ) -> Result<K, DuckError> {
        Ok(self.parse::<K>()?.resolve(rng, default))
    }
}

/// Integer field whose bare `RANDOM` draws from `[LO, HI)`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct DuckInt<const LO: i64, const HI: i64>(pub RawDuck);

impl<const LO: i64, const HI: i64> DuckInt<LO, HI> {
    pub fn resolve(&self) -> Result<i64, DuckError> {
        self.0.resolve_with(&mut rand::thread_rng(), LO..HI)
    }
}

/// Float field whose bare `RANDOM` draws from `[0, 1)`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct DuckFloat(pub RawDuck);

impl DuckFloat {
    pub fn resolve(&self) -> Result<f64, DuckError> {
        self.0.resolve_with(&mut rand::thread_rng(), 0.0..1.0)
    }
}

/// Resolve a plain string (environment or query value) as an integer.
pub fn resolve_int_str(text: &str, default: Range<i64>) -> Result<i64, DuckError> {
    let value = DuckValue::from_text::<i64>(text)?;
    Ok(value.resolve(&mut rand::thread_rng(), default))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn text(s: &str) -> RawDuck {
        RawDuck::Text(s.to_string())
    }

    #[test]
    fn literal_number_passes_through() {
        let raw: RawDuck = serde_json::from_str("5").unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert_eq!(raw.resolve_with::<i64, _>(&mut rng, 100..200).unwrap(), 5);
        }
    }

    #[test]
    fn numeric_string_is_parsed() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(text(" 42 ").resolve_with::<i64, _>(&mut rng, 0..1).unwrap(), 42);
        assert_eq!(text("0.25").resolve_with::<f64, _>(&mut rng, 0.0..1.0).unwrap(), 0.25);
    }

    #[test]
    fn bare_random_uses_field_default() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let v = text("RANDOM").resolve_with::<i64, _>(&mut rng, 1024..65535).unwrap();
            assert!((1024..65535).contains(&v));
        }
    }

    #[test]
    fn random_token_is_case_sensitive() {
        assert_eq!(
            DuckValue::from_text::<i64>("random"),
            Err(DuckError::NotANumber("random".into()))
        );
    }

    #[test]
    fn random_range_requires_three_tokens() {
        let err = DuckValue::from_text::<i64>("RANDOM:1:2:3").unwrap_err();
        assert!(matches!(err, DuckError::InvalidSyntax(_)));
        let err = DuckValue::from_text::<i64>("RANDOM:1").unwrap_err();
        assert!(matches!(err, DuckError::InvalidSyntax(_)));
    }

    #[test]
    fn integer_range_rejects_float_bounds() {
        let err = DuckValue::from_text::<i64>("RANDOM:1.5:3").unwrap_err();
        assert!(matches!(err, DuckError::NotANumber(_)));
        assert!(DuckValue::from_text::<f64>("RANDOM:1.5:3").is_ok());
    }

    #[test]
    fn float_literal_rejected_for_integer_field() {
        let raw: RawDuck = serde_json::from_str("2.5").unwrap();
        assert!(matches!(raw.parse::<i64>(), Err(DuckError::NotAnInteger(_))));
        assert_eq!(raw.parse::<f64>(), Ok(DuckValue::Float(2.5)));
    }

    #[test]
    fn duck_int_defaults_to_zero_when_missing() {
        #[derive(Deserialize)]
        struct Payload {
            #[serde(default)]
            maintain_second: DuckInt<1, 60>,
        }
        let p: Payload = serde_json::from_str("{}").unwrap();
        assert_eq!(p.maintain_second.resolve().unwrap(), 0);
    }

    #[test]
    fn duck_float_random_range() {
        let f: DuckFloat = serde_json::from_str("\"RANDOM:0.05:0.15\"").unwrap();
        for _ in 0..100 {
            let v = f.resolve().unwrap();
            assert!((0.05..0.15).contains(&v));
        }
    }

    #[test]
    fn redecoding_draws_independently() {
        let f: DuckInt<0, 1_000_000> = serde_json::from_str("\"RANDOM\"").unwrap();
        let draws: std::collections::HashSet<i64> =
            (0..20).map(|_| f.resolve().unwrap()).collect();
        assert!(draws.len() > 1);
    }

    proptest! {
        #[test]
        fn random_int_range_law(a in -10_000i64..10_000, span in 1i64..10_000, seed in any::<u64>()) {
            let b = a + span;
            let mut rng = StdRng::seed_from_u64(seed);
            let raw = text(&format!("RANDOM:{a}:{b}"));
            for _ in 0..20 {
                let v = raw.resolve_with::<i64, _>(&mut rng, 0..1).unwrap();
                prop_assert!(a <= v && v < b);
            }
        }

        #[test]
        fn random_int_rejection_law(a in -10_000i64..10_000, back in 0i64..10_000) {
            let b = a - back;
            let err = DuckValue::from_text::<i64>(&format!("RANDOM:{a}:{b}")).unwrap_err();
            prop_assert!(err.is_range_error());
        }

        #[test]
        fn non_numeric_strings_fail(s in "[a-zA-Z_]{1,12}") {
            prop_assume!(s != "RANDOM");
            prop_assume!(!["inf", "infinity", "nan"].contains(&s.to_lowercase().as_str()));
            prop_assert!(DuckValue::from_text::<i64>(&s).is_err());
            prop_assert!(DuckValue::from_text::<f64>(&s).is_err());
        }
    }
}
