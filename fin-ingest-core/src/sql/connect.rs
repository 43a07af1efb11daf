//! Database connection parameters and connection setup.

use super::error::SqlError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use tracing::{debug, info};

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString<T> {
    Number(T),
    String(String),
}

/// Accepts `5432` as well as `"5432"`. Environment overrides arrive as strings.
pub fn number_or_string<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + FromStr,
    T::Err: Display,
{
    match NumberOrString::<T>::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn default_dbname() -> String {
    "postgres".to_string()
}

/// Resolved connection parameters. Never read from ambient state by the engine.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct DbParams {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port", deserialize_with = "number_or_string")]
    pub port: u16,
    #[serde(default = "default_dbname")]
    pub dbname: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for DbParams {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dbname: default_dbname(),
            user: None,
            password: None,
        }
    }
}

// Keeps the password out of logs and panics.
impl std::fmt::Debug for DbParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbParams")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl DbParams {
    /// `postgresql://host:port/dbname`, safe to log.
    pub fn display_url(&self) -> String {
        format!("postgresql://{}:{}/{}", self.host, self.port, self.dbname)
    }

    /// Driver configuration, password included.
    pub fn to_config(&self) -> postgres::Config {
        let mut config = postgres::Config::new();
        config.host(&self.host).port(self.port).dbname(&self.dbname);
        if let Some(user) = &self.user {
            config.user(user);
        }
        if let Some(password) = &self.password {
            config.password(password);
        }
        config
    }
}

/// Open a client and log the server version.
pub fn connect(params: &DbParams) -> Result<postgres::Client, SqlError> {
    info!("Connecting to: {}", params.display_url());
    let mut client = params.to_config().connect(postgres::NoTls)?;

    let row = client.query_one("SELECT version()", &[])?;
    let version: String = row.try_get(0)?;
    debug!("Connected to: {version}");

    Ok(client)
}
