//! Duration serialization/deserialization helpers.
//!
//! Provides custom Serde support for `std::time::Duration`:
//! - Serialization: `Duration` -> fractional milliseconds (`12.5`)
//! - Deserialization: fractional or integer milliseconds -> `Duration`
//!
//! Nanosecond precision survives the round trip: the value is rebuilt by
//! rounding `ms * 1e6` to the nearest nanosecond.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// Serializes `Duration` as fractional milliseconds.
pub fn serialize<S>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_f64(to_millis(*d))
}

/// Deserializes `Duration` from fractional milliseconds.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let ms = f64::deserialize(deserializer)?;
    from_millis(ms).ok_or_else(|| Error::custom(format!("Invalid duration: {ms}ms")))
}

/// `Option<Duration>` serializer/deserializer helpers.
pub mod option {
    use super::{Deserialize, Deserializer, Duration, Serializer, from_millis, to_millis};

    /// Serializes `Option<Duration>` as fractional milliseconds or `null`.
    #[allow(clippy::ref_option)]
    pub fn serialize<S>(d: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match d {
            Some(d) => serializer.serialize_some(&to_millis(*d)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes `Option<Duration>` from fractional milliseconds or `null`.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        match Option::<f64>::deserialize(deserializer)? {
            Some(ms) => from_millis(ms)
                .map(Some)
                .ok_or_else(|| Error::custom(format!("Invalid duration: {ms}ms"))),
            None => Ok(None),
        }
    }
}

/// `Vec<Option<Duration>>` helpers, used for per-hop RTT slots.
pub mod option_vec {
    use serde::ser::SerializeSeq;

    use super::{Deserialize, Deserializer, Duration, Serializer, from_millis, to_millis};

    pub fn serialize<S>(v: &[Option<Duration>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(v.len()))?;
        for d in v {
            seq.serialize_element(&d.map(to_millis))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Option<Duration>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;

        Vec::<Option<f64>>::deserialize(deserializer)?
            .into_iter()
            .map(|slot| match slot {
                Some(ms) => from_millis(ms)
                    .map(Some)
                    .ok_or_else(|| Error::custom(format!("Invalid duration: {ms}ms"))),
                None => Ok(None),
            })
            .collect()
    }
}

/// Converts a duration to fractional milliseconds.
pub fn to_millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Converts fractional milliseconds back to a duration, rejecting negative / non-finite input.
pub fn from_millis(ms: f64) -> Option<Duration> {
    if !ms.is_finite() || ms < 0.0 {
        return None;
    }
    let nanos = (ms * 1_000_000.0).round();
    // f64 -> u64: checked above for sign; durations here are far below u64::MAX ns
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(Duration::from_nanos(nanos as u64))
}
