//! Duration strings in Go `time.ParseDuration` syntax (`5m`, `1h30m`, `1.5h`).

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

const NANOS_PER_MICRO: f64 = 1e3;
const NANOS_PER_MILLI: f64 = 1e6;
const NANOS_PER_SEC: f64 = 1e9;

fn unit_nanos(unit: &str) -> Option<f64> {
    match unit {
        "ns" => Some(1.0),
        "us" | "µs" | "μs" => Some(NANOS_PER_MICRO),
        "ms" => Some(NANOS_PER_MILLI),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60.0 * NANOS_PER_SEC),
        "h" => Some(3600.0 * NANOS_PER_SEC),
        _ => None,
    }
}

/// Parses a duration string such as `300ms`, `5m` or `2h45m`.
///
/// Negative durations are rejected since they cannot be represented.
/// A bare `0` is accepted.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    let s = match s.strip_prefix('-') {
        Some(_) => return Err("negative durations are not supported".to_string()),
        None => s.strip_prefix('+').unwrap_or(s),
    };

    let mut total_nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let number = &rest[..number_len];
        if number.is_empty() || number == "." || number.matches('.').count() > 1 {
            return Err(format!("invalid number in '{}'", input));
        }
        let value: f64 = number
            .parse()
            .map_err(|_| format!("invalid number '{}'", number))?;
        rest = &rest[number_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        if unit.is_empty() {
            return Err(format!("missing unit in '{}'", input));
        }
        let scale = unit_nanos(unit).ok_or_else(|| format!("unknown unit '{}'", unit))?;
        total_nanos += value * scale;
        rest = &rest[unit_len..];
    }

    if !total_nanos.is_finite() || total_nanos > u64::MAX as f64 {
        return Err(format!("duration '{}' out of range", input));
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// Parses the poll frequency of a sync resource. Must be strictly positive.
pub fn parse_frequency(value: &str) -> Result<Duration, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidFrequency {
        value: value.to_string(),
        reason,
    };
    let duration = parse_duration(value).map_err(invalid)?;
    if duration.is_zero() {
        return Err(invalid("frequency must be greater than zero".to_string()));
    }
    Ok(duration)
}

/// Serde adapter for duration strings in configuration files.
pub fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_duration(&raw).map_err(serde::de::Error::custom)
}

/// Writes a duration back in a form [`parse_duration`] accepts.
pub fn serialize_duration<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{}ms", d.as_millis()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse_duration("5m"), Ok(Duration::from_secs(300)));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("300ms"), Ok(Duration::from_millis(300)));
        assert_eq!(parse_duration("2h"), Ok(Duration::from_secs(7200)));
        assert_eq!(parse_duration("10us"), Ok(Duration::from_micros(10)));
        assert_eq!(parse_duration("7ns"), Ok(Duration::from_nanos(7)));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("2h45m10s"), Ok(Duration::from_secs(9910)));
        assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration(".5s"), Ok(Duration::from_millis(500)));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("5").is_err());
        assert!(parse_duration("m").is_err());
        assert!(parse_duration("5 minutes").is_err());
        assert!(parse_duration("1.2.3s").is_err());
        assert!(parse_duration("-5m").is_err());
    }

    #[test]
    fn test_zero() {
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("0s"), Ok(Duration::ZERO));
    }

    #[test]
    fn test_frequency_must_be_positive() {
        assert!(matches!(
            parse_frequency("0s"),
            Err(ConfigError::InvalidFrequency { .. })
        ));
        assert!(matches!(
            parse_frequency("often"),
            Err(ConfigError::InvalidFrequency { .. })
        ));
        assert_eq!(parse_frequency("5m"), Ok(Duration::from_secs(300)));
    }
}
