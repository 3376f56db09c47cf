/// Service configuration.
///
/// Loaded from an optional TOML file; every key has a default so an empty
/// (or absent) file is a valid configuration. Unknown keys are rejected to
/// catch typos early. Secrets never live in the file: the Hydrocron API key
/// is read from the environment variable named by `hydrocron.api_key_env`,
/// after a `.env` file (if any) has been loaded.
///
/// ```toml
/// [hydrocron]
/// base_url = "https://soto.podaac.earthdatacloud.nasa.gov/hydrocron/v1/timeseries"
/// timeout_secs = 60
///
/// [retry]
/// max_attempts = 10
///
/// [extract]
/// policy = "lenient"
/// start = "2023-07-28T00:00:00Z"
/// ```

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::align::MismatchPolicy;
use crate::gage::nwis::NWIS_DV_URL;
use crate::ingest::TimeRange;
use crate::ingest::hydrocron::HYDROCRON_BASE_URL;
use crate::ingest::retry::RetryPolicy;
use crate::model::InputError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub hydrocron: HydrocronConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub nwis: NwisConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HydrocronConfig {
    #[serde(default = "default_hydrocron_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for HydrocronConfig {
    fn default() -> Self {
        Self {
            base_url: default_hydrocron_url(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_hydrocron_url() -> String {
    HYDROCRON_BASE_URL.to_string()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_api_key_env() -> String {
    "HYDROCRON_API_KEY".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractConfig {
    #[serde(default)]
    pub policy: MismatchPolicy,
    /// RFC 3339 strings, e.g. `"2023-07-28T00:00:00Z"`.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl ExtractConfig {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NwisConfig {
    #[serde(default = "default_nwis_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NwisConfig {
    fn default() -> Self {
        Self {
            base_url: default_nwis_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_nwis_url() -> String {
    NWIS_DV_URL.to_string()
}

impl HydrocronConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The API key from the environment, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        dotenv::dotenv().ok();
        env::var(&self.api_key_env).ok().filter(|k| !k.trim().is_empty())
    }
}

impl NwisConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Config, InputError> {
        toml::from_str(text).map_err(|e| InputError::Config(e.to_string()))
    }

    /// Reads `path`, or returns the defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Config, InputError> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let text = fs::read_to_string(path).map_err(|e| InputError::io(path, e))?;
        let config = Config::from_toml(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }
}
