//! Serde helper for Duration (as whole milliseconds)
//!
//! Values are written as integer milliseconds; anything finer is dropped.
//! Types that must round-trip exactly store [`truncate`]d durations.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;

fn millis(duration: &Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Drop the sub-millisecond part so the value survives serialization unchanged
pub(crate) fn truncate(duration: Duration) -> Duration {
    Duration::from_millis(millis(&duration))
}

pub(crate) fn serialize<S: Serializer>(duration: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    millis(duration).serialize(s)
}

pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
    Ok(Duration::from_millis(u64::deserialize(d)?))
}

pub(crate) mod option {
    use super::*;

    pub(crate) fn serialize<S: Serializer>(duration: &Option<Duration>, s: S) -> std::result::Result<S::Ok, S::Error> {
        duration.as_ref().map(millis).serialize(s)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }
}
