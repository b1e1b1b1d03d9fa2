// src/backends/sql.rs
use super::{QueryMix, StressStatements};
use crate::config::{SqlEngine, SqlSettings};
use crate::driver::Workload;
use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Connection, Executor, MySqlConnection, PgConnection};
use tracing::debug;

const READ_QUERY: &str = "SELECT 1";
const WRITE_QUERY: &str = "INSERT INTO biggie_test_table(value) VALUES('stress')";
const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS biggie_test_table (value VARCHAR(255))";

/// One live connection. Redshift is reached over the Postgres protocol.
pub enum SqlConnection {
    MySql(MySqlConnection),
    Postgres(PgConnection),
}

impl SqlConnection {
    pub async fn connect(settings: &SqlSettings) -> Result<Self> {
        let url = settings.url()?;
        let conn = match settings.engine {
            SqlEngine::MySql => SqlConnection::MySql(MySqlConnection::connect(url.as_str()).await?),
            SqlEngine::Postgres | SqlEngine::Redshift => {
                SqlConnection::Postgres(PgConnection::connect(url.as_str()).await?)
            }
        };
        Ok(conn)
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self {
            SqlConnection::MySql(conn) => conn.ping().await?,
            SqlConnection::Postgres(conn) => conn.ping().await?,
        }
        Ok(())
    }

    /// Run a statement as a simple (unprepared) query.
    pub async fn execute(&mut self, statement: &str) -> Result<()> {
        match self {
            SqlConnection::MySql(conn) => {
                conn.execute(statement).await?;
            }
            SqlConnection::Postgres(conn) => {
                conn.execute(statement).await?;
            }
        }
        Ok(())
    }

    pub async fn close(self) -> Result<()> {
        match self {
            SqlConnection::MySql(conn) => conn.close().await?,
            SqlConnection::Postgres(conn) => conn.close().await?,
        }
        Ok(())
    }
}

#[async_trait]
impl StressStatements for SqlConnection {
    async fn read(&mut self) -> Result<()> {
        self.execute(READ_QUERY).await
    }

    async fn write(&mut self) -> Result<()> {
        self.execute(WRITE_QUERY).await
    }
}

pub struct SqlWorkload {
    settings: SqlSettings,
    mix: QueryMix,
}

impl SqlWorkload {
    pub fn new(settings: SqlSettings, reads: bool, writes: bool, queries: u64) -> Self {
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
impl Workload for SqlWorkload {
    type Resource = SqlConnection;

    fn name(&self) -> &'static str {
        self.settings.engine.name()
    }

    async fn open(&self, _worker: usize) -> Result<SqlConnection> {
        let mut conn = SqlConnection::connect(&self.settings).await?;
        conn.ping().await?;
        if self.mix.writes {
            conn.execute(CREATE_TABLE).await?;
        }
        Ok(conn)
    }

    async fn unit_of_work(&self, conn: &mut SqlConnection, _worker: usize) -> Result<()> {
        self.mix.run(self.name(), conn).await
    }

    async fn close(&self, conn: SqlConnection) {
        if let Err(err) = conn.close().await {
            debug!(engine = self.name(), %err, "closing connection failed");
        }
    }
}
