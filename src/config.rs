//! Import configuration.
//!
//! Values are layered: built-in defaults, then an optional JSON config file,
//! then environment variables and command line flags (see [`crate::cli`]).

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::{
    batch::BatchLimits,
    error::ConfigError,
    retry::RetryPolicy,
    schema::Category,
};

pub const ENV_CONFIG: &str = "BELOW_IMPORT_CONFIG";
pub const ENV_SINK_URL: &str = "BELOW_IMPORT_SINK_URL";
pub const ENV_OUTPUT: &str = "BELOW_IMPORT_OUTPUT";
pub const ENV_BELOW: &str = "BELOW";
pub const ENV_LOG: &str = "BELOW_IMPORT_LOG";

pub const DEFAULT_BELOW_BIN: &str = "below";
pub const DEFAULT_CHUNK: Duration = Duration::from_secs(3600);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CATEGORIES: [Category; 2] = [Category::Network, Category::System];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub source: SourceConfig,
    pub sink: SinkConfig,
}
impl ImportConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sink.target()?;
        self.sink.batch.validate()?;
        if self.sink.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroLimit("retry.max_attempts"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub below_bin: PathBuf,
    #[serde(deserialize_with = "deserialize_categories")]
    pub categories: Vec<Category>,
    /// Width of the window dumped per `below` invocation.
    #[serde(with = "duration_str")]
    pub chunk: Duration,
}
impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            below_bin: PathBuf::from(DEFAULT_BELOW_BIN),
            categories: DEFAULT_CATEGORIES.to_vec(),
            chunk: DEFAULT_CHUNK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    pub url: Option<String>,
    pub output: Option<PathBuf>,
    /// Per request.
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    pub batch: BatchLimits,
    pub retry: RetryPolicy,
}
impl SinkConfig {
    pub fn target(&self) -> Result<SinkTarget, ConfigError> {
        match (&self.url, &self.output) {
            (Some(url), None) => Ok(SinkTarget::Http(url.clone())),
            (None, Some(path)) => Ok(SinkTarget::File(path.clone())),
            (Some(_), Some(_)) => Err(ConfigError::ConflictingSinks),
            (None, None) => Err(ConfigError::NoSink),
        }
    }
}
impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            url: None,
            output: None,
            timeout: DEFAULT_TIMEOUT,
            batch: BatchLimits::default(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Http(String),
    File(PathBuf),
}

fn deserialize_categories<'de, D>(deserializer: D) -> Result<Vec<Category>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let names = Vec::<String>::deserialize(deserializer)?;
    names
        .iter()
        .map(|name| name.parse().map_err(serde::de::Error::custom))
        .collect()
}

pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(value).map_err(|source| ConfigError::InvalidDuration {
        value: value.to_owned(),
        source,
    })
}

/// Durations written as humantime strings, e.g. `"500ms"` or `"1h"`.
pub mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        humantime::parse_duration(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = ImportConfig::default();
        assert_eq!(config.source.below_bin, PathBuf::from("below"));
        assert_eq!(config.source.chunk, DEFAULT_CHUNK);
        assert_eq!(config.sink.batch, BatchLimits::default());
        assert!(matches!(config.validate(), Err(ConfigError::NoSink)));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "source": {{ "categories": ["cgroup", "network"], "chunk": "15min" }},
                "sink": {{
                    "url": "http://vm:8428/api/v1/import/prometheus",
                    "timeout": "5s",
                    "batch": {{ "max_records": 100 }},
                    "retry": {{ "max_attempts": 3, "initial_backoff": "1s" }}
                }}
            }}"#
        )
        .unwrap();
        let config = ImportConfig::load(file.path()).unwrap();
        assert_eq!(
            config.source.categories,
            vec![Category::Cgroup, Category::Network]
        );
        assert_eq!(config.source.chunk, Duration::from_secs(900));
        assert_eq!(config.source.below_bin, PathBuf::from("below"));
        assert_eq!(config.sink.timeout, Duration::from_secs(5));
        assert_eq!(config.sink.batch.max_records, 100);
        assert_eq!(config.sink.batch.max_bytes, crate::batch::DEFAULT_MAX_BYTES);
        assert_eq!(config.sink.retry.max_attempts, 3);
        assert_eq!(config.sink.retry.initial_backoff, Duration::from_secs(1));
        assert_eq!(
            config.sink.retry.max_backoff,
            crate::retry::DEFAULT_MAX_BACKOFF
        );
        assert_eq!(
            config.sink.target().unwrap(),
            SinkTarget::Http("http://vm:8428/api/v1/import/prometheus".into())
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_load_rejects_unknown_category() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "source": {{ "categories": ["gpu"] }} }}"#).unwrap();
        assert!(matches!(
            ImportConfig::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_conflicting_sinks() {
        let sink = SinkConfig {
            url: Some("http://x".into()),
            output: Some("/tmp/x".into()),
            ..Default::default()
        };
        assert!(matches!(sink.target(), Err(ConfigError::ConflictingSinks)));
    }
}
