//! Runtime configuration, read from the process environment (and `.env`).

use crate::{DB_PATH, PUBLIC_DIR, TEMPLATES_DIR};
use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Days a login session stays valid.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub templates_dir: PathBuf,
    pub public_dir: PathBuf,
    /// Secret appended to every password before hashing.
    pub pepper: String,
    pub session_ttl: chrono::Duration,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let host = std::env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".into());
        let port = std::env::var("APP_PORT").unwrap_or_else(|_| "3000".into());
        let bind_addr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        let pepper = std::env::var("PEPPER")
            .or_else(|_| std::env::var("pepper"))
            .unwrap_or_default();
        if pepper.is_empty() {
            bail!("PEPPER must be set to a non-empty secret");
        }

        let ttl_days = std::env::var("SESSION_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|d| *d > 0)
            .unwrap_or(DEFAULT_SESSION_TTL_DAYS);

        Ok(Self {
            bind_addr,
            db_path: env_path("DREALISM_DB", DB_PATH),
            templates_dir: env_path("DREALISM_TEMPLATES", TEMPLATES_DIR),
            public_dir: env_path("DREALISM_PUBLIC", PUBLIC_DIR),
            pepper,
            session_ttl: chrono::Duration::days(ttl_days),
        })
    }

    /// Configuration rooted at `root`, for tests and tooling.
    pub fn rooted_at(root: &std::path::Path, pepper: &str) -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            db_path: root.join(DB_PATH),
            templates_dir: root.join(TEMPLATES_DIR),
            public_dir: root.join(PUBLIC_DIR),
            pepper: pepper.to_string(),
            session_ttl: chrono::Duration::days(DEFAULT_SESSION_TTL_DAYS),
        }
    }
}

fn env_path(var: &str, default: &str) -> PathBuf {
    std::env::var(var)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(default))
}
