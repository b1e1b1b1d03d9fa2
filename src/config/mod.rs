// src/config/mod.rs
mod models;

pub use models::*;

use crate::duck::{resolve_int_str, DuckError};
use anyhow::{Context, Result};
use std::ops::Range;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

const DEFAULT_PORT: u16 = 8080;
const RANDOM_PORTS: Range<i64> = 1024..65535;
const RANDOM_STARTUP_DELAY: Range<i64> = 1..5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} configuration not found")]
    NotConfigured(&'static str),

    #[error("{0} not provided")]
    Missing(&'static str),

    #[error("invalid value for {key}: {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: DuckError,
    },

    #[error("{key} is out of range: {value}")]
    OutOfRange { key: String, value: i64 },

    #[error("{key} is not a valid json document: {source}")]
    InvalidDbInfo {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Layered key/value settings: an optional config file under environment
/// variables. Lookups are case-insensitive and blank values count as absent.
#[derive(Debug, Clone)]
pub struct Settings {
    source: config::Config,
}

impl Settings {
    /// Load `config.{yaml,json,toml}` from the working directory (or the given
    /// file) and overlay the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("config").required(false),
        };
        let source = config::Config::builder()
            .set_default("log_format", "apache")?
            .add_source(file)
            .add_source(config::Environment::default())
            .build()
            .context("Failed to build configuration")?;
        Ok(Self { source })
    }

    /// Settings from explicit pairs, with no file or environment involved.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut builder = config::Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(key.to_ascii_lowercase(), value)?;
        }
        Ok(Self {
            source: builder.build()?,
        })
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.source
            .get_string(&key.to_ascii_lowercase())
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).map(|value| value.eq_ignore_ascii_case("true"))
    }

    pub fn log_format(&self) -> String {
        self.get("LOG_FORMAT").unwrap_or_else(|| "apache".to_string())
    }

    pub fn port(&self) -> Result<u16, ConfigError> {
        self.port_or("PORT", DEFAULT_PORT)
    }

    pub fn startup_delay(&self) -> Result<Duration, ConfigError> {
        let seconds = match self.get("STARTUP_DELAY_SECOND") {
            Some(text) => duck_int("STARTUP_DELAY_SECOND", &text, RANDOM_STARTUP_DELAY)?,
            None => 0,
        };
        Ok(Duration::from_secs(seconds.max(0) as u64))
    }

    /// Startup delay, falling back to none when the value cannot be parsed.
    pub fn startup_delay_or_zero(&self) -> Duration {
        self.startup_delay().unwrap_or_else(|err| {
            warn!("Ignoring startup delay: {}", err);
            Duration::ZERO
        })
    }

    pub fn html_color(&self) -> Option<String> {
        self.get("RANDOM_HTML_API_COLOR")
    }

    pub fn metrics(&self) -> Result<MetricsSettings, ConfigError> {
        let defaults = MetricsSettings::default();
        Ok(MetricsSettings {
            enabled: self.get_bool("METRICS_ENABLED").unwrap_or(defaults.enabled),
            port: self.port_or("METRICS_PORT", defaults.port)?,
            path: self.get("METRICS_PATH").unwrap_or(defaults.path),
        })
    }

    /// Resolve an engine from `<ENGINE>_DBINFO`, else from the individual
    /// `<ENGINE>_HOST/_PORT/_USERNAME/_PASSWORD/_DBNAME` keys.
    pub fn sql(&self, engine: SqlEngine) -> Result<SqlSettings, ConfigError> {
        let prefix = engine.env_prefix();
        let key = |suffix: &str| format!("{prefix}_{suffix}");

        if let Some(document) = self.get(&key("DBINFO")) {
            let info: DbInfo =
                serde_json::from_str(&document).map_err(|source| ConfigError::InvalidDbInfo {
                    key: key("DBINFO"),
                    source,
                })?;
            if info.host.is_empty() {
                return Err(ConfigError::NotConfigured(engine.name()));
            }
            return Ok(SqlSettings {
                engine,
                host: info.host,
                port: info.port.unwrap_or(engine.default_port()),
                username: info.username,
                password: info.password,
                dbname: info.dbname,
            });
        }

        let host = self
            .get(&key("HOST"))
            .ok_or(ConfigError::NotConfigured(engine.name()))?;
        Ok(SqlSettings {
            engine,
            host,
            port: self.port_or(&key("PORT"), engine.default_port())?,
            username: self.get(&key("USERNAME")).unwrap_or_default(),
            password: self.get(&key("PASSWORD")).unwrap_or_default(),
            dbname: self.get(&key("DBNAME")).unwrap_or_default(),
        })
    }

    pub fn redis(&self) -> Result<RedisSettings, ConfigError> {
        let host = self
            .get("REDIS_HOST")
            .ok_or(ConfigError::NotConfigured("redis"))?;
        Ok(RedisSettings {
            host,
            port: self.port_or("REDIS_PORT", 6379)?,
            tls: self.get_bool("REDIS_TLS_ENABLED").unwrap_or(false),
        })
    }

    pub fn kafka(&self) -> Result<KafkaSettings, ConfigError> {
        let servers: Vec<String> = self
            .get("KAFKA_SERVERS")
            .ok_or(ConfigError::NotConfigured("kafka"))?
            .split(',')
            .map(|server| server.trim().to_string())
            .filter(|server| !server.is_empty())
            .collect();
        if servers.is_empty() {
            return Err(ConfigError::NotConfigured("kafka"));
        }
        let topic = self.get("KAFKA_TOPIC").ok_or(ConfigError::Missing("KAFKA_TOPIC"))?;
        Ok(KafkaSettings {
            servers,
            topic,
            tls: self.get_bool("KAFKA_TLS_ENABLED").unwrap_or(false),
        })
    }

    fn port_or(&self, key: &str, default: u16) -> Result<u16, ConfigError> {
        let Some(text) = self.get(key) else {
            return Ok(default);
        };
        let value = duck_int(key, &text, RANDOM_PORTS)?;
        u16::try_from(value).map_err(|_| ConfigError::OutOfRange {
            key: key.to_string(),
            value,
        })
    }
}

fn duck_int(key: &str, text: &str, default: Range<i64>) -> Result<i64, ConfigError> {
    resolve_int_str(text, default).map_err(|source| ConfigError::InvalidValue {
        key: key.to_string(),
        source,
    })
}
