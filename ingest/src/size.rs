//! Human readable size strings such as `10M`, `2.5Mi` or `4KiB`.
//!
//! A size string is a decimal number, optionally followed by an SI prefix
//! (`K`, `M`, `G`, `T`, `P`, case-insensitive), an optional binary marker `i`
//! that switches the base from 1000 to 1024, and an optional trailing `B`.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

const SI_PREFIXES: [char; 5] = ['K', 'M', 'G', 'T', 'P'];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SizeParseError {
    #[error("Unable to parse size str \"{0}\"")]
    Malformed(String),
    #[error("Size str \"{0}\" does not fit into 64 bits")]
    Overflow(String),
}

/// A size as found in config and stat documents: either already an integer
/// or a string that still has to be parsed
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum SizeValue {
    Int(u64),
    Str(String),
}

impl SizeValue {
    /// resolve into a byte count, integers are returned unchanged
    pub fn resolve(&self) -> Result<u64, SizeParseError> {
        match self {
            Self::Int(value) => Ok(*value),
            Self::Str(value) => parse_size_str(value),
        }
    }
}

impl From<u64> for SizeValue {
    fn from(value: u64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for SizeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl fmt::Display for SizeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => f.write_str(value),
        }
    }
}

/// Parse either an integer or a size string into a byte count
pub fn parse_size(value: impl Into<SizeValue>) -> Result<u64, SizeParseError> {
    value.into().resolve()
}

fn prefix_order(prefix: char) -> Option<u32> {
    SI_PREFIXES
        .iter()
        .position(|candidate| candidate.eq_ignore_ascii_case(&prefix))
        .map(|index| index as u32 + 1)
}

fn split_digits(input: &str) -> (&str, &str) {
    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());

    input.split_at(end)
}

/// Parse a size string, e.g. `"4KiB"` -> 4096
pub fn parse_size_str(input: &str) -> Result<u64, SizeParseError> {
    let malformed = || SizeParseError::Malformed(input.to_owned());
    let overflow = || SizeParseError::Overflow(input.to_owned());

    let (integer, rest) = split_digits(input.trim());
    if integer.is_empty() {
        return Err(malformed());
    }

    let (fraction, rest) = match rest.strip_prefix('.') {
        Some(after_dot) => {
            let (fraction, rest) = split_digits(after_dot);
            (Some(fraction), rest)
        }
        None => (None, rest),
    };

    let mut suffix = rest.trim_start().chars().peekable();
    let mut multiplier = 1u64;

    if let Some(order) = suffix.peek().copied().and_then(prefix_order) {
        suffix.next();

        let base: u64 = if suffix.next_if_eq(&'i').is_some() {
            1024
        } else {
            1000
        };

        multiplier = base.pow(order);
    }

    suffix.next_if(|c| c.eq_ignore_ascii_case(&'B'));

    if suffix.next().is_some() {
        return Err(malformed());
    }

    match fraction {
        None => integer
            .parse::<u64>()
            .ok()
            .and_then(|value| value.checked_mul(multiplier))
            .ok_or_else(overflow),
        Some(fraction) => {
            let value: f64 = format!("{integer}.{fraction}0")
                .parse()
                .map_err(|_| malformed())?;
            let scaled = value * multiplier as f64;

            if !scaled.is_finite() || scaled >= u64::MAX as f64 {
                return Err(overflow());
            }

            // `as` truncates toward zero
            Ok(scaled as u64)
        }
    }
}

fn max_power(mut size: u64, base: u64) -> (usize, u64) {
    let mut order = 0;

    while order < SI_PREFIXES.len() && size % base == 0 {
        size /= base;
        order += 1;
    }

    (order, size)
}

/// Render the shortest exact size string for `size`, preferring base 1024
/// when it reaches at least the same order as base 1000
pub fn format_size(size: u64) -> String {
    if size == 0 {
        return "0".to_owned();
    }

    let (binary_order, binary_rest) = max_power(size, 1024);
    let (decimal_order, decimal_rest) = max_power(size, 1000);

    let (order, rest, marker) = if binary_order >= decimal_order {
        (binary_order, binary_rest, "i")
    } else {
        (decimal_order, decimal_rest, "")
    };

    if order == 0 {
        size.to_string()
    } else {
        format!("{rest}{}{marker}", SI_PREFIXES[order - 1])
    }
}

/// serde helper for fields holding a size string or integer
pub fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    SizeValue::deserialize(deserializer)?
        .resolve()
        .map_err(serde::de::Error::custom)
}

/// serde helper for optional size fields, use together with `#[serde(default)]`
pub fn deserialize_optional_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<SizeValue>::deserialize(deserializer)?
        .map(|value| value.resolve())
        .transpose()
        .map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_strings() {
        assert_eq!(parse_size_str("0"), Ok(0));
        assert_eq!(parse_size_str("10M"), Ok(10_000_000));
        assert_eq!(
            parse_size_str("2.5Mi"),
            Ok((2.5 * 1024.0 * 1024.0) as u64)
        );
        assert_eq!(parse_size_str("4KiB"), Ok(4096));
    }

    #[test]
    fn integers_are_returned_unchanged() {
        assert_eq!(parse_size(4096u64), Ok(4096));
        assert_eq!(parse_size(u64::MAX), Ok(u64::MAX));
    }

    #[test]
    fn accepts_lowercase_prefixes_and_whitespace() {
        assert_eq!(parse_size_str("16ki"), Ok(16 * 1024));
        assert_eq!(parse_size_str("3 G"), Ok(3_000_000_000));
        assert_eq!(parse_size_str(" 64B "), Ok(64));
        assert_eq!(parse_size_str("1Pi"), Ok(1 << 50));
    }

    #[test]
    fn fractions_truncate_toward_zero() {
        assert_eq!(parse_size_str("1.9"), Ok(1));
        assert_eq!(parse_size_str("0.0015K"), Ok(1));
        assert_eq!(parse_size_str("2."), Ok(2));
    }

    #[test]
    fn rejects_malformed_strings() {
        for input in ["", "M", "abc", "10Q", "10Mx", "1.2.3", "-5", "4KiBB"] {
            assert_eq!(
                parse_size_str(input),
                Err(SizeParseError::Malformed(input.to_owned())),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn reports_overflow() {
        assert!(matches!(
            parse_size_str("100000P"),
            Err(SizeParseError::Overflow(_))
        ));
        assert!(matches!(
            parse_size_str("99999999999999999999"),
            Err(SizeParseError::Overflow(_))
        ));
    }

    #[test]
    fn formats_names_used_by_artifacts() {
        assert_eq!(format_size(10_000_000), "10M");
        assert_eq!(format_size(250_000_000), "250M");
        assert_eq!(format_size(4096), "4Ki");
        assert_eq!(format_size(64), "64");
        assert_eq!(format_size(0), "0");
        assert_eq!(format_size(1_024_000), "1000Ki");
    }

    #[test]
    fn formatted_sizes_parse_back() {
        for size in [1, 999, 1000, 1024, 4096, 10_000_000, 3 << 40, 7_000_000_000_000] {
            assert_eq!(parse_size_str(&format_size(size)), Ok(size));
        }
    }

    #[test]
    fn deserializes_from_integer_or_string() {
        #[derive(Deserialize)]
        struct Doc {
            #[serde(deserialize_with = "deserialize_size")]
            a: u64,
            #[serde(deserialize_with = "deserialize_size")]
            b: u64,
            #[serde(default, deserialize_with = "deserialize_optional_size")]
            c: Option<u64>,
        }

        let doc: Doc = toml::from_str("a = 24\nb = \"4KiB\"").unwrap();
        assert_eq!((doc.a, doc.b, doc.c), (24, 4096, None));

        assert!(toml::from_str::<Doc>("a = 1\nb = \"four\"").is_err());
    }
}
