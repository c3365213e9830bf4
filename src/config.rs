use std::net::{Ipv4Addr, SocketAddr};

use thiserror::Error;

const DEFAULT_HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;
const DEFAULT_PORT: u16 = 5000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("HOST is not in the correct format: {0:?}")]
    InvalidHost(String),
    #[error("PORT is not in the correct format: {0:?}")]
    InvalidPort(String),
}

/// Server settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub host: Ipv4Addr,
    pub port: u16,
    /// SQLite URL; the seeded in-memory store is used when unset
    pub database_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = match lookup("HOST") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidHost(raw))?,
            None => DEFAULT_HOST,
        };

        let port = match lookup("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());

        Ok(Self {
            host,
            port,
            database_url,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}
