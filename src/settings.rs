use std::path::PathBuf;

use crate::credentials;

pub const MIN_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("{0} must be at least {MIN_SECRET_LEN} characters long")]
    SecretTooShort(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Process configuration, read once at start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub port: u16,
    /// Directory for in-memory store snapshots; `None` keeps state ephemeral.
    pub data_dir: Option<PathBuf>,
    /// Empty means any origin is accepted.
    pub cors_allowed_origins: Vec<String>,
    pub bcrypt_cost: u32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::SecretTooShort("JWT_SECRET"));
        }

        let port = match get("PORT") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { name: "PORT", value: v })?,
            None => 8080,
        };
        let bcrypt_cost = match get("BCRYPT_COST") {
            Some(v) => match v.trim().parse::<u32>() {
                Ok(c) if (4..=31).contains(&c) => c,
                _ => return Err(ConfigError::Invalid { name: "BCRYPT_COST", value: v }),
            },
            None => credentials::DEFAULT_COST,
        };
        let cors_allowed_origins = get("CORS_ALLOWED_ORIGINS")
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();

        Ok(Self {
            jwt_secret,
            database_url: get("DATABASE_URL"),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0".to_string()),
            port,
            data_dir: get("DATA_DIR").map(PathBuf::from),
            cors_allowed_origins,
            bcrypt_cost,
        })
    }
}
