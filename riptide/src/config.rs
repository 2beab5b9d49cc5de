use crate::sync::SyncMode;

use std::{str::FromStr, time::Duration};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

fn deserialize_fromstr<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let string = String::deserialize(deserializer)?;
    T::from_str(&string)
        .map_err(|e| de::Error::custom(format!("Error parsing '{}': {}", string, e)))
}

pub fn serialize_to_string<T: std::fmt::Display, S: Serializer>(
    field: T,
    s: S,
) -> Result<S::Ok, S::Error> {
    s.serialize_str(&field.to_string())
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = u64::deserialize(deserializer)?;
    Ok(Duration::from_secs(secs))
}

pub fn serialize_duration<S: Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(duration.as_secs())
}

/// Default number of seconds between two ticks of the sync manager.
pub const DEFAULT_TICK_INTERVAL_SECS: u64 = 30;

fn default_tick_interval() -> Duration {
    Duration::from_secs(DEFAULT_TICK_INTERVAL_SECS)
}

/// Static information the host gives us at startup.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Which backend to sync through.
    #[serde(
        deserialize_with = "deserialize_fromstr",
        serialize_with = "serialize_to_string"
    )]
    pub mode: SyncMode,
    /// How often to drive time-based progress.
    #[serde(
        deserialize_with = "deserialize_duration",
        serialize_with = "serialize_duration",
        rename = "tick_interval_secs",
        default = "default_tick_interval"
    )]
    pub tick_interval: Duration,
}
