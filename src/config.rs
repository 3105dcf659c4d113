use std::{collections::HashMap, time::Duration};

use serde::{Deserialize, Deserializer};

pub const DEFAULT_FREQUENCY: Duration = Duration::from_secs(60);
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_millis(1);
pub const DEFAULT_COLLECTOR_ADDRESS: &str = "127.0.0.1:3457";

/// Exporter settings as written by the host application. Any field may be
/// missing; [`Options::build`] fills in the defaults.
///
/// Durations deserialize from human readable strings such as `"30s"`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Options {
    #[serde(deserialize_with = "deserialize_duration")]
    pub frequency: Option<Duration>,
    #[serde(deserialize_with = "deserialize_duration")]
    pub time_unit: Option<Duration>,
    #[serde(alias = "metron_address")]
    pub collector_address: Option<String>,
    pub origin: Option<String>,
    pub tags: HashMap<String, String>,
}
impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_frequency(mut self, frequency: Duration) -> Self {
        self.frequency = Some(frequency);
        self
    }
    #[must_use]
    pub fn with_time_unit(mut self, time_unit: Duration) -> Self {
        self.time_unit = Some(time_unit);
        self
    }
    #[must_use]
    pub fn with_collector_address(mut self, address: impl Into<String>) -> Self {
        self.collector_address = Some(address.into());
        self
    }
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Applies defaults for unset or zero fields.
    ///
    /// A missing origin becomes the empty string.
    pub fn build(self) -> Config {
        let frequency = self
            .frequency
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_FREQUENCY);
        let time_unit = self
            .time_unit
            .filter(|d| !d.is_zero())
            .unwrap_or(DEFAULT_TIME_UNIT);
        let collector_address = self
            .collector_address
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| DEFAULT_COLLECTOR_ADDRESS.to_owned());
        let origin = self.origin.unwrap_or_default();
        if origin.is_empty() {
            tracing::warn!("No origin configured, envelopes will carry an empty origin");
        }
        Config {
            frequency,
            time_unit,
            collector_address,
            origin,
            tags: self.tags,
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(text) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    humantime::parse_duration(&text)
        .map(Some)
        .map_err(serde::de::Error::custom)
}

/// Defaulted, immutable exporter settings.
#[derive(Debug, Clone)]
pub struct Config {
    frequency: Duration,
    time_unit: Duration,
    collector_address: String,
    origin: String,
    tags: HashMap<String, String>,
}
impl Config {
    pub fn frequency(&self) -> Duration {
        self.frequency
    }
    pub fn time_unit(&self) -> Duration {
        self.time_unit
    }
    pub fn collector_address(&self) -> &str {
        &self.collector_address
    }
    pub fn origin(&self) -> &str {
        &self.origin
    }
    pub fn tags(&self) -> &HashMap<String, String> {
        &self.tags
    }
}
impl Default for Config {
    fn default() -> Self {
        Options::default().build()
    }
}
