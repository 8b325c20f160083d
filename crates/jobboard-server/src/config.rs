use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

/// Server configuration, loaded from environment variables (and `.env`).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Shared HS256 secret for issuing and verifying tokens.
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl: chrono::Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = std::env::var("JOBBOARD_JWT_SECRET").unwrap_or_else(|_| {
            warn!("JOBBOARD_JWT_SECRET not set, using the development secret");
            DEV_SECRET.into()
        });
        let db_path = std::env::var("JOBBOARD_DB_PATH").unwrap_or_else(|_| "jobboard.db".into());
        let host = std::env::var("JOBBOARD_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = std::env::var("JOBBOARD_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("JOBBOARD_PORT must be a port number")?;
        let ttl_hours: i64 = std::env::var("JOBBOARD_TOKEN_TTL_HOURS")
            .unwrap_or_else(|_| "24".into())
            .parse()
            .context("JOBBOARD_TOKEN_TTL_HOURS must be an integer")?;

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(db_path),
            addr,
            token_ttl: chrono::Duration::hours(ttl_hours),
        })
    }
}
