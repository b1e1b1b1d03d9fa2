// src/config/models.rs
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 9090,
            path: "/metrics".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlEngine {
    MySql,
    Postgres,
    Redshift,
}

impl SqlEngine {
    pub const ALL: [SqlEngine; 3] = [SqlEngine::MySql, SqlEngine::Postgres, SqlEngine::Redshift];

    pub fn name(&self) -> &'static str {
        match self {
            SqlEngine::MySql => "mysql",
            SqlEngine::Postgres => "postgres",
            SqlEngine::Redshift => "redshift",
        }
    }

    /// Prefix of this engine's configuration keys, e.g. `MYSQL` in `MYSQL_HOST`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            SqlEngine::MySql => "MYSQL",
            SqlEngine::Postgres => "POSTGRES",
            SqlEngine::Redshift => "REDSHIFT",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            SqlEngine::MySql => 3306,
            SqlEngine::Postgres => 5432,
            SqlEngine::Redshift => 5439,
        }
    }

    fn scheme(&self) -> &'static str {
        match self {
            SqlEngine::MySql => "mysql",
            // Redshift speaks the Postgres wire protocol.
            SqlEngine::Postgres | SqlEngine::Redshift => "postgres",
        }
    }
}

/// Connection details as found in a `<ENGINE>_DBINFO` JSON document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DbInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub dbname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlSettings {
    pub engine: SqlEngine,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub dbname: String,
}

impl SqlSettings {
    pub fn url(&self) -> anyhow::Result<Url> {
        let mut url = Url::parse(&format!("{}://{}", self.engine.scheme(), self.host))?;
        url.set_port(Some(self.port))
            .map_err(|_| anyhow::anyhow!("cannot set port on {}", self.host))?;
        if !self.username.is_empty() {
            url.set_username(&self.username)
                .map_err(|_| anyhow::anyhow!("cannot set username on {}", self.host))?;
        }
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| anyhow::anyhow!("cannot set password on {}", self.host))?;
        }
        url.set_path(&format!("/{}", self.dbname));
        if self.engine != SqlEngine::MySql {
            url.set_query(Some("sslmode=disable"));
        }
        Ok(url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl RedisSettings {
    pub fn url(&self) -> String {
        if self.tls {
            format!("rediss://{}:{}/#insecure", self.host, self.port)
        } else {
            format!("redis://{}:{}/", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaSettings {
    pub servers: Vec<String>,
    pub topic: String,
    pub tls: bool,
}
