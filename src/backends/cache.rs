// src/backends/cache.rs
use super::{QueryMix, StressStatements};
use crate::config::RedisSettings;
use crate::driver::Workload;
use anyhow::Result;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

const STRESS_KEY: &str = "stress_key";
const STRESS_VALUE: &str = "stress";

async fn connect(settings: &RedisSettings) -> Result<MultiplexedConnection> {
    let client = redis::Client::open(settings.url())?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await?;
    Ok(conn)
}

pub(super) async fn ping(settings: &RedisSettings) -> Result<()> {
    connect(settings).await.map(drop)
}

#[async_trait]
impl StressStatements for MultiplexedConnection {
    async fn read(&mut self) -> Result<()> {
        self.get::<_, Option<String>>(STRESS_KEY).await?;
        Ok(())
    }

    async fn write(&mut self) -> Result<()> {
        self.set::<_, _, ()>(STRESS_KEY, STRESS_VALUE).await?;
        Ok(())
    }
}

pub struct RedisWorkload {
    settings: RedisSettings,
    mix: QueryMix,
}

impl RedisWorkload {
    pub fn new(settings: RedisSettings, reads: bool, writes: bool, queries: u64) -> Self {
        Self {
            settings,
            mix: QueryMix {
                reads,
                writes,
                queries,
            },
        }
    }
}

#[async_trait]
impl Workload for RedisWorkload {
    type Resource = MultiplexedConnection;

    fn name(&self) -> &'static str {
        "redis"
    }

    async fn open(&self, _worker: usize) -> Result<MultiplexedConnection> {
        connect(&self.settings).await
    }

    async fn unit_of_work(&self, conn: &mut MultiplexedConnection, _worker: usize) -> Result<()> {
        self.mix.run(self.name(), conn).await
    }

    async fn close(&self, conn: MultiplexedConnection) {
        drop(conn);
    }
}
