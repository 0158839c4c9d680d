use std::path::PathBuf;

use thiserror::Error;

use crate::seed::DEFAULT_BATCH_SIZE;

const DEFAULT_DATABASE: &str = "todos.db";
const DEFAULT_WEATHER: &str = "Unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub database: PathBuf,
    pub base_path: String,
    pub weather_url: Option<String>,
    pub weather: String,
    pub seed_users: Option<usize>,
    pub seed_batch_size: usize,
}

#[derive(Debug, PartialEq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads settings through `lookup`, so tests need not touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let port = lookup("TODOS_PORT").ok_or(ConfigError::Missing("TODOS_PORT"))?;
        let port = parse("TODOS_PORT", port)?;

        let seed_users = lookup("TODOS_SEED_USERS")
            .map(|v| parse("TODOS_SEED_USERS", v))
            .transpose()?;
        let seed_batch_size = lookup("TODOS_SEED_BATCH_SIZE")
            .map(|v| parse::<usize>("TODOS_SEED_BATCH_SIZE", v))
            .transpose()?
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if seed_batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "TODOS_SEED_BATCH_SIZE",
                value: "0".to_string(),
            });
        }

        Ok(Config {
            port,
            database: lookup("TODOS_DATABASE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            base_path: lookup("TODOS_BASE_PATH")
                .map(|p| normalize_base_path(&p))
                .unwrap_or_default(),
            weather_url: lookup("TODOS_WEATHER_URL").filter(|u| !u.trim().is_empty()),
            weather: lookup("TODOS_WEATHER").unwrap_or_else(|| DEFAULT_WEATHER.to_string()),
            seed_users,
            seed_batch_size,
        })
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}

fn normalize_base_path(path: &str) -> String {
    let path = path.trim().trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
