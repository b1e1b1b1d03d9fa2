// src/backends/mod.rs
//! External collaborators driven by the stress jobs and probed by
//! `/healthcheck/external`.

mod broker;
mod cache;
mod sql;
mod statements;

pub use broker::{lorem_ipsum, KafkaWorkload, Producer};
pub use cache::RedisWorkload;
pub use sql::{SqlConnection, SqlWorkload};
pub use statements::{QueryMix, StressStatements};

use crate::config::{SqlEngine, Settings};

/// The collaborator named by the first path segment of a back-end route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sql(SqlEngine),
    Redis,
    Kafka,
}

impl BackendKind {
    pub const ALL: [BackendKind; 5] = [
        BackendKind::Sql(SqlEngine::MySql),
        BackendKind::Sql(SqlEngine::Postgres),
        BackendKind::Sql(SqlEngine::Redshift),
        BackendKind::Redis,
        BackendKind::Kafka,
    ];

    pub fn parse(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == segment)
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Sql(engine) => engine.name(),
            BackendKind::Redis => "redis",
            BackendKind::Kafka => "kafka",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            BackendKind::Sql(SqlEngine::MySql) => "MySQL",
            BackendKind::Sql(SqlEngine::Postgres) => "PostgreSQL",
            BackendKind::Sql(SqlEngine::Redshift) => "Redshift",
            BackendKind::Redis => "Redis",
            BackendKind::Kafka => "Kafka",
        }
    }

    /// Error code reported when a single-connection job cannot connect.
    pub fn error_code(&self) -> &'static str {
        match self {
            BackendKind::Sql(_) => "DB_ERROR",
            BackendKind::Redis => "REDIS_ERROR",
            BackendKind::Kafka => "KAFKA_ERROR",
        }
    }

    /// Whether the settings carry enough to reach this collaborator.
    pub fn is_configured(&self, settings: &Settings) -> bool {
        match self {
            BackendKind::Sql(engine) => settings.sql(*engine).is_ok(),
            BackendKind::Redis => settings.redis().is_ok(),
            BackendKind::Kafka => settings.kafka().is_ok(),
        }
    }

    /// Open and release one connection.
    pub async fn probe(&self, settings: &Settings) -> anyhow::Result<()> {
        match self {
            BackendKind::Sql(engine) => {
                let mut conn = SqlConnection::connect(&settings.sql(*engine)?).await?;
                conn.ping().await?;
                conn.close().await
            }
            BackendKind::Redis => cache::ping(&settings.redis()?).await,
            BackendKind::Kafka => broker::probe(&settings.kafka()?).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_segments_map_to_kinds() {
        assert_eq!(BackendKind::parse("redshift"), Some(BackendKind::Sql(SqlEngine::Redshift)));
        assert_eq!(BackendKind::parse("kafka"), Some(BackendKind::Kafka));
        assert_eq!(BackendKind::parse("mongo"), None);
        assert_eq!(BackendKind::Redis.error_code(), "REDIS_ERROR");
    }

    #[tokio::test]
    async fn unconfigured_probe_fails_without_network() {
        let settings = Settings::from_pairs(Vec::<(&str, &str)>::new()).unwrap();
        for kind in BackendKind::ALL {
            assert!(!kind.is_configured(&settings));
            assert!(kind.probe(&settings).await.is_err());
        }
    }
}
