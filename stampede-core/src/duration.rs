use serde::{de, Deserialize, Deserializer, Serializer};
use serde_with::{DeserializeAs, SerializeAs};
use std::time::Duration;

/// `serde_with` adapter reading and writing durations as humantime strings (`"5m"`, `"500ms"`).
///
/// Bare numbers are accepted on input and read as seconds.
pub struct HumanDuration;

impl SerializeAs<Duration> for HumanDuration {
    fn serialize_as<S>(source: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&humantime::format_duration(*source))
    }
}

impl<'de> DeserializeAs<'de, Duration> for HumanDuration {
    fn deserialize_as<D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Seconds(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => humantime::parse_duration(text.trim()).map_err(de::Error::custom),
            Raw::Seconds(secs) => Duration::try_from_secs_f64(secs).map_err(|err| {
                de::Error::custom(format!("invalid duration of {secs} seconds: {err}"))
            }),
        }
    }
}
