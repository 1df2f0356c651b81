//! Drealism - notes, categories and tasks behind a session login.
//!
//! This is the main entry point for the web server.
//! The application is organized into the following modules:
//!
//! - `router`: Path decomposition and dispatch to exactly one handler
//! - `auth`: Session cookies, the auth gate and password hashing
//! - `templates`: `%name%` substitution, sanitisation and HTML components
//! - `documents`: CRUD for notes, categories and tasks
//! - `handlers`: Home, login/register, account page and search
//! - `static_files`: Allow-listed assets under `/static`
//! - `store`: Lazily connected sled document store

use std::sync::Arc;

use anyhow::Context;
use drealism::{app, auth, config::AppConfig, AppState};

// ============================================================================
// Main
// ============================================================================

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "drealism=debug,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "cannot listen for shutdown signal");
    }
    tracing::info!("shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(config));

    let purged = auth::purge_expired_sessions(&state.store, chrono::Utc::now())
        .await
        .context("opening document store")?;
    if purged > 0 {
        tracing::info!(purged, "removed expired sessions");
    }

    tracing::info!(
        templates = %state.config.templates_dir.display(),
        public = %state.config.public_dir.display(),
        db = %state.store.path().display(),
        "listening on {}",
        addr
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;

    axum::serve(listener, app(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.store.close().await?;
    tracing::info!("document store closed");
    Ok(())
}
