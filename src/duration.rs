//! Human-readable durations such as `30d`, `1h30m` or `1.5s`.
//!
//! A duration is a sequence of `<number><unit>` tokens, summed. Numbers may
//! be fractional. Units are case-insensitive:
//!
//! | unit        | meaning      |
//! |-------------|--------------|
//! | `d`         | days         |
//! | `h`         | hours        |
//! | `m`         | minutes      |
//! | `s`         | seconds      |
//! | `ms`        | milliseconds |
//! | `us`, `µs`  | microseconds |
//! | `ns`        | nanoseconds  |
//!
//! The empty string is a zero duration.

use std::time::Duration;

use crate::error::{RenewError, Result};

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Fraction digits beyond this are ignored.
const MAX_FRACTION_DIGITS: usize = 18;

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit.to_lowercase().as_str() {
        "d" => 86_400 * NANOS_PER_SEC,
        "h" => 3_600 * NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "s" => NANOS_PER_SEC,
        "ms" => 1_000_000,
        "us" | "µs" | "μs" => 1_000,
        "ns" => 1,
        _ => return None,
    };
    Some(nanos)
}

/// Parse a duration string.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use certrenewer::duration::parse_duration;
///
/// assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
/// assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
/// assert!(parse_duration("10x").is_err());
/// ```
pub fn parse_duration(input: &str) -> Result<Duration> {
    let input = input.trim();
    let mut rest = input;
    let mut total: u128 = 0;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        if number.is_empty() {
            return Err(RenewError::duration(format!(
                "expected a number at {rest:?} in {input:?}"
            )));
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        if unit.is_empty() {
            return Err(RenewError::duration(format!(
                "missing unit after {number} in {input:?}"
            )));
        }
        let scale = unit_nanos(unit).ok_or_else(|| {
            RenewError::duration(format!("unknown unit {unit:?} in {input:?}"))
        })?;

        let nanos = scaled(number, scale)
            .ok_or_else(|| RenewError::duration(format!("invalid number {number:?} in {input:?}")))?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| RenewError::duration(format!("{input:?} is out of range")))?;

        rest = tail;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| RenewError::duration(format!("{input:?} is out of range")))?;
    Ok(Duration::new(secs, (total % NANOS_PER_SEC) as u32))
}

/// `number * scale` in nanoseconds, for a decimal `number`.
fn scaled(number: &str, scale: u128) -> Option<u128> {
    let (whole, fraction) = match number.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (number, ""),
    };
    if (whole.is_empty() && fraction.is_empty()) || fraction.contains('.') {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;

    let fraction = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
    if !fraction.is_empty() {
        let digits: u128 = fraction.parse().ok()?;
        let divisor = 10u128.pow(fraction.len() as u32);
        nanos = nanos.checked_add(digits.checked_mul(scale)? / divisor)?;
    }
    Some(nanos)
}

/// Format a duration using the largest units first, e.g. `1d2h`.
pub fn format_duration(duration: Duration) -> String {
    const UNITS: [(&str, u128); 7] = [
        ("d", 86_400 * NANOS_PER_SEC),
        ("h", 3_600 * NANOS_PER_SEC),
        ("m", 60 * NANOS_PER_SEC),
        ("s", NANOS_PER_SEC),
        ("ms", 1_000_000),
        ("us", 1_000),
        ("ns", 1),
    ];

    let mut remaining = duration.as_nanos();
    if remaining == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (unit, nanos) in UNITS {
        let count = remaining / nanos;
        if count > 0 {
            out.push_str(&format!("{count}{unit}"));
            remaining %= nanos;
        }
    }
    out
}

/// Serde adapter for duration strings.
///
/// ```
/// use std::time::Duration;
///
/// #[derive(serde::Deserialize)]
/// struct Settings {
///     #[serde(with = "certrenewer::duration::serde")]
///     period: Duration,
/// }
///
/// let s: Settings = toml::from_str(r#"period = "2h""#).unwrap();
/// assert_eq!(s.period, Duration::from_secs(7200));
/// ```
pub mod serde {
    use ::serde::{Deserialize, Deserializer, Serializer, de::Error};
    use std::time::Duration;

    /// Serialize as a duration string.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*value))
    }

    /// Deserialize from a duration string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_duration(&text).map_err(D::Error::custom)
    }

    /// Adapter for optional durations.
    pub mod option {
        use ::serde::{Deserialize, Deserializer, Serializer, de::Error};
        use std::time::Duration;

        /// Serialize as an optional duration string.
        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&super::super::format_duration(*d)),
                None => serializer.serialize_none(),
            }
        }

        /// Deserialize from an optional duration string.
        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|text| super::super::parse_duration(&text).map_err(D::Error::custom))
                .transpose()
        }
    }
}
