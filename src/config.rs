use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use snafu::ResultExt;
use url::Url;

use crate::error::{ApplicationError, ConfigLoadSnafu};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
}

impl Config {
    /// Read `HOST_ADDRESS`, `LOG_DIR`, `CORS_ORIGINS` and the `SURREAL_*` variables.
    pub fn from_env() -> Result<Config, ApplicationError> {
        let server = envy::from_env::<ServerConfig>().context(ConfigLoadSnafu)?;
        let database = envy::prefixed("SURREAL_")
            .from_env::<DatabaseConfig>()
            .context(ConfigLoadSnafu)?;

        Ok(Config { server, database })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(rename = "host_address", default = "default_host")]
    pub host: SocketAddr,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Origins allowed to call the tracking endpoints. Empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(default = "default_url")]
    pub url: Url,
    #[serde(rename = "ns", default = "default_namespace")]
    pub namespace: String,
    #[serde(rename = "db", default = "default_database")]
    pub database: String,
    #[serde(rename = "user")]
    pub username: Option<String>,
    #[serde(rename = "pass")]
    pub password: Option<String>,
    #[serde(default = "default_timeout", deserialize_with = "humantime_duration")]
    pub timeout: Duration,
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: usize,
}

impl DatabaseConfig {
    /// In-memory store with default names.
    pub fn memory() -> Self {
        DatabaseConfig {
            url: default_url(),
            namespace: default_namespace(),
            database: default_database(),
            username: None,
            password: None,
            timeout: default_timeout(),
            connect_attempts: 1,
        }
    }

    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Some((username, password)),
            _ => None,
        }
    }
}

fn default_host() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_url() -> Url {
    Url::parse("mem://").expect("static url is valid")
}

fn default_namespace() -> String {
    "tally".to_string()
}

fn default_database() -> String {
    "analytics".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_connect_attempts() -> usize {
    5
}

fn humantime_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}
