use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEFAULT_FIRST_PASSWORD: &str = "helloworld";

/// Server configuration, read from `PARLEY_*` environment variables (a
/// `.env` file is loaded first if present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub first_user: String,
    pub first_password: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("PARLEY_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("PARLEY_PORT is not a valid port number")?;
        let db_path = std::env::var("PARLEY_DB_PATH")
            .unwrap_or_else(|_| "parley.db".into())
            .into();
        let first_user = std::env::var("PARLEY_FIRST_USER").unwrap_or_else(|_| "admin".into());
        let first_password = std::env::var("PARLEY_FIRST_PASSWORD")
            .unwrap_or_else(|_| DEFAULT_FIRST_PASSWORD.into());

        if first_password == DEFAULT_FIRST_PASSWORD {
            warn!(
                "PARLEY_FIRST_PASSWORD is the default '{}', changing it is recommended",
                DEFAULT_FIRST_PASSWORD
            );
        }

        Ok(Self {
            host,
            port,
            db_path,
            first_user,
            first_password,
        })
    }
}
