//! Durations in the Gateway API format, e.g. `1h30m`, `10s`, `500ms`.
//!
//! A duration is one to four components, each an integer of at most five
//! digits followed by one of the units `h`, `m`, `s`, or `ms`. Units may not
//! repeat and must appear in descending order.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(time::Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("empty duration")]
    Empty,

    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("expected at most 5 digits per component")]
    TooManyDigits,

    #[error("units must appear once each, from largest to smallest")]
    UnitOrder,

    #[error("invalid integer: {0}")]
    NotANumber(#[from] std::num::ParseIntError),
}

const EXPECTED_UNITS: &str = "expected one of 'h', 'm', 's', or 'ms'";

// === impl Duration ===

impl Duration {
    pub const fn from_millis(ms: u64) -> Self {
        Self(time::Duration::from_millis(ms))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(time::Duration::from_secs(secs))
    }
}

impl From<Duration> for time::Duration {
    fn from(Duration(d): Duration) -> Self {
        d
    }
}

impl From<time::Duration> for Duration {
    fn from(d: time::Duration) -> Self {
        Self(d)
    }
}

impl FromStr for Duration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseError::Empty);
        }

        let mut total = time::Duration::ZERO;
        // The rank of the last unit seen; units must strictly decrease.
        let mut last_rank = u8::MAX;
        let mut rest = s;
        while !rest.is_empty() {
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if digits == 0 {
                return Err(ParseError::InvalidUnit);
            }
            if digits > 5 {
                return Err(ParseError::TooManyDigits);
            }
            let (val, tail) = rest.split_at(digits);
            let val = val.parse::<u64>()?;

            let unit_len = tail
                .find(|c: char| c.is_ascii_digit())
                .unwrap_or(tail.len());
            if unit_len == 0 {
                return Err(ParseError::NoUnit);
            }
            let (unit, tail) = tail.split_at(unit_len);
            let (rank, base) = match unit {
                "h" => (3, time::Duration::from_secs(60 * 60)),
                "m" => (2, time::Duration::from_secs(60)),
                "s" => (1, time::Duration::from_secs(1)),
                "ms" => (0, time::Duration::from_millis(1)),
                _ => return Err(ParseError::InvalidUnit),
            };
            if rank >= last_rank {
                return Err(ParseError::UnitOrder);
            }
            last_rank = rank;

            // At most 99999h, which cannot overflow.
            total += base * val as u32;
            rest = tail;
        }

        Ok(Self(total))
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ms = self.0.as_millis();
        if ms == 0 {
            return f.write_str("0s");
        }
        for (unit, size) in [("h", 3_600_000), ("m", 60_000), ("s", 1_000), ("ms", 1)] {
            let n = ms / size;
            if n > 0 {
                write!(f, "{n}{unit}")?;
                ms %= size;
            }
        }
        Ok(())
    }
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a Gateway API duration string")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<Duration>().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}

impl schemars::JsonSchema for Duration {
    fn schema_name() -> String {
        "Duration".to_owned()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            string: Some(Box::new(schemars::schema::StringValidation {
                pattern: Some(r"^([0-9]{1,5}(h|m|s|ms)){1,4}$".to_string()),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_durations() {
        let cases = [
            ("0s", time::Duration::ZERO),
            ("0h0m0s", time::Duration::ZERO),
            ("1h", time::Duration::from_secs(3600)),
            ("500ms", time::Duration::from_millis(500)),
            ("1h30m", time::Duration::from_secs(5400)),
            ("1m1s1ms", time::Duration::from_millis(61_001)),
            ("1h2m3s4ms", time::Duration::from_millis(3_723_004)),
            ("99999s", time::Duration::from_secs(99_999)),
        ];
        for (input, expected) in cases {
            assert_eq!(
                input.parse::<Duration>(),
                Ok(Duration(expected)),
                "parsing {input}"
            );
        }
    }

    #[test]
    fn rejects_invalid_durations() {
        let cases = [
            ("", ParseError::Empty),
            ("1", ParseError::NoUnit),
            ("1d", ParseError::InvalidUnit),
            ("1.5s", ParseError::InvalidUnit),
            ("-1s", ParseError::InvalidUnit),
            ("100000s", ParseError::TooManyDigits),
            ("1s1h", ParseError::UnitOrder),
            ("1s1s", ParseError::UnitOrder),
        ];
        for (input, expected) in cases {
            assert_eq!(input.parse::<Duration>(), Err(expected), "parsing {input}");
        }
    }

    #[test]
    fn displays_canonical_form() {
        assert_eq!(Duration::from_millis(0).to_string(), "0s");
        assert_eq!(Duration::from_millis(5_400_000).to_string(), "1h30m");
        assert_eq!(Duration::from_millis(1_500).to_string(), "1s500ms");
        assert_eq!(
            "90m".parse::<Duration>().unwrap().to_string(),
            "1h30m",
            "non-canonical inputs are normalized"
        );
    }
}
