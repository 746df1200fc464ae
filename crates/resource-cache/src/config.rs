use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use sentry::types::Dsn;
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;

use crate::caching::RequestOptions;

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
    /// When set to true, backtraces are forced on.
    pub enable_backtraces: bool,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
            enable_backtraces: true,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "resource_cache".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Defaults and limits of an [`AsyncResourceCache`](crate::AsyncResourceCache).
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// The name used to tag logs and metrics of this cache.
    pub name: String,

    /// Maximum number of entries kept in memory.
    pub in_memory_capacity: u64,

    /// How long a successfully produced value stays fresh.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// How many times a failed producer is retried before giving up.
    pub max_retries: u32,

    /// Base of the linear retry backoff, multiplied by the attempt number.
    #[serde(with = "humantime_serde")]
    pub retry_backoff_base: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        let options = RequestOptions::default();
        Self {
            name: "resources".into(),
            in_memory_capacity: 10_000,
            default_ttl: options.ttl,
            max_retries: options.max_retries,
            retry_backoff_base: options.retry_backoff_base,
        }
    }
}

impl CacheConfig {
    /// The [`RequestOptions`] used for requests that do not override anything.
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions {
            ttl: self.default_ttl,
            max_retries: self.max_retries,
            retry_backoff_base: self.retry_backoff_base,
            force_refresh: false,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,

    /// DSN to report internal errors to
    pub sentry_dsn: Option<Dsn>,

    /// Defaults of the resource cache.
    pub cache: CacheConfig,
}

impl Config {
    /// Loads the configuration from the given YAML file, or returns the defaults.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            ),
            None => Ok(Config::default()),
        }
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_defaults() {
        let cfg = Config::get(None).unwrap();
        assert_eq!(cfg.cache.default_ttl, Duration::from_secs(5 * 60));
        assert_eq!(cfg.cache.max_retries, 2);
        assert_eq!(cfg.cache.retry_backoff_base, Duration::from_secs(1));
        assert_eq!(cfg.cache.request_options(), RequestOptions::default());
    }

    #[test]
    fn test_cache_config() {
        // Setting individual values must not affect the other defaults.
        let yaml = r#"
            cache:
              name: users
              default_ttl: 5s
              retry_backoff_base: 250ms
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();

        assert_eq!(cfg.cache.name, "users");
        assert_eq!(cfg.cache.default_ttl, Duration::from_secs(5));
        assert_eq!(cfg.cache.retry_backoff_base, Duration::from_millis(250));
        assert_eq!(cfg.cache.max_retries, 2);
        assert_eq!(cfg.cache.in_memory_capacity, 10_000);
    }

    #[test]
    fn test_negative_retries_rejected() {
        let yaml = r#"
            cache:
              max_retries: -1
        "#;
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }

    #[test]
    fn test_logging_config() {
        let yaml = r#"
            logging:
              level: debug
              format: json
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();

        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(cfg.logging.enable_backtraces);

        let yaml = r#"
            logging:
              level: loud
        "#;
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }

    #[test]
    fn test_empty_config_rejected() {
        let err = Config::from_reader("   \n".as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "config file empty");
    }
}
