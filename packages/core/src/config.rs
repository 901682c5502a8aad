use std::env;
use std::net::SocketAddr;

use clap::ValueEnum;

use crate::cli::Cli;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub storage: StorageBackend,
}

/// Where timetable entries live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// SQLite database at DATABASE_URL
    Sqlite,
    /// Process-local; entries vanish on restart
    Memory,
}

impl StorageBackend {
    /// Parse the `STORAGE_BACKEND` env value with the same names the
    /// `--storage` flag accepts.
    fn from_env_value(raw: &str) -> Result<Self, String> {
        <Self as ValueEnum>::from_str(raw.trim(), true)
            .map_err(|_| format!("Invalid STORAGE_BACKEND: {}", raw))
    }
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests need not touch the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = match lookup("STORAGE_BACKEND") {
            Some(raw) => StorageBackend::from_env_value(&raw)?,
            None => StorageBackend::Sqlite,
        };

        // The memory backend never opens the database.
        let database_url = match (lookup("DATABASE_URL"), storage) {
            (Some(url), _) => url,
            (None, StorageBackend::Memory) => String::new(),
            (None, StorageBackend::Sqlite) => return Err("DATABASE_URL is required".into()),
        };

        let bind_addr = parse_bind_addr(
            &lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        )?;

        Ok(Self {
            database_url,
            bind_addr,
            storage,
        })
    }

    /// Command-line flags win over environment values.
    pub fn apply_cli(mut self, cli: &Cli) -> Result<Self, String> {
        if let Some(url) = &cli.database_url {
            self.database_url = url.clone();
        }
        if let Some(bind) = &cli.bind {
            self.bind_addr = parse_bind_addr(bind)?;
        }
        if let Some(storage) = cli.storage {
            self.storage = storage;
        }
        if self.storage == StorageBackend::Sqlite && self.database_url.is_empty() {
            return Err("DATABASE_URL is required".into());
        }
        Ok(self)
    }
}

fn parse_bind_addr(raw: &str) -> Result<SocketAddr, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("Invalid BIND_ADDR: {}", raw))
}
