//! Serialization helpers for configuration types.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize a [`Duration`] as whole milliseconds.
///
/// ```rust
/// use std::time::Duration;
///
/// use routelink_common::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Example {
///     #[serde(with = "duration_millis")]
///     timeout: Duration,
/// }
/// ```
pub mod duration_millis {
    use super::*;

    type SerializeResult<S> = Result<<S as Serializer>::Ok, <S as Serializer>::Error>;

    /// Serialize a Duration as milliseconds (u64)
    pub fn serialize<S>(duration: &Duration, serializer: S) -> SerializeResult<S>
    where
        S: Serializer,
    {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    /// Deserialize milliseconds (u64) into a Duration
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Timeouts {
        #[serde(with = "duration_millis")]
        timeout: Duration,
    }

    #[test]
    fn serializes_as_millis() {
        let json = serde_json::to_string(&Timeouts { timeout: Duration::from_millis(1500) })
            .expect("serialize");
        assert_eq!(json, r#"{"timeout":1500}"#);
    }

    #[test]
    fn deserializes_from_millis() {
        let parsed: Timeouts = serde_json::from_str(r#"{"timeout":250}"#).expect("deserialize");
        assert_eq!(parsed.timeout, Duration::from_millis(250));
    }

    #[test]
    fn rejects_negative_values() {
        let parsed: Result<Timeouts, _> = serde_json::from_str(r#"{"timeout":-1}"#);
        assert!(parsed.is_err());
    }
}
