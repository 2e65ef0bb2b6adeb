//! Serializes durations in the protobuf JSON form (`"1.500s"`).

use serde::Serializer;
use std::time::Duration;

pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&Display(*d))
}

pub(crate) fn serialize_opt<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => serialize(d, s),
        None => s.serialize_none(),
    }
}

struct Display(Duration);

impl std::fmt::Display for Display {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secs = self.0.as_secs();
        let nanos = self.0.subsec_nanos();
        if nanos == 0 {
            return write!(f, "{secs}s");
        }
        let frac = format!("{nanos:09}");
        write!(f, "{secs}.{}s", frac.trim_end_matches('0'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_protobuf_durations() {
        assert_eq!(Display(Duration::from_secs(5)).to_string(), "5s");
        assert_eq!(Display(Duration::from_millis(1500)).to_string(), "1.5s");
        assert_eq!(Display(Duration::from_millis(50)).to_string(), "0.05s");
        assert_eq!(Display(Duration::from_nanos(1)).to_string(), "0.000000001s");
    }
}
