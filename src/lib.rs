//! Drealism - personal notes, categories and tasks over a small web UI.
//!
//! This module wires the application's modules together and holds the state
//! shared by every request.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub mod auth;
pub mod config;
pub mod documents;
pub mod error;
pub mod forms;
pub mod handlers;
pub mod models;
pub mod router;
pub mod static_files;
pub mod store;
pub mod templates;

use config::AppConfig;
use store::Store;

// ============================================================================
// Configuration
// ============================================================================

pub const DB_PATH: &str = ".drealism_db";
pub const TEMPLATES_DIR: &str = "templates";
pub const PUBLIC_DIR: &str = "public";

// ============================================================================
// Login Throttling
// ============================================================================

/// How long a failure is remembered once any lockout has run out.
pub const FAILURE_WINDOW_SECS: i64 = 15 * 60;

#[derive(Debug)]
struct FailureRecord {
    failures: u32,
    last_failure: DateTime<Utc>,
    locked_until: Option<DateTime<Utc>>,
}

impl FailureRecord {
    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        let unlocked = self.locked_until.map_or(true, |until| now >= until);
        unlocked && now - self.last_failure >= chrono::Duration::seconds(FAILURE_WINDOW_SECS)
    }
}

/// Tracks login failures per username for rate limiting with exponential backoff.
#[derive(Debug, Default)]
pub struct LoginThrottle {
    records: HashMap<String, FailureRecord>,
}

impl LoginThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if login attempts for `username` are currently locked out.
    pub fn is_locked(&self, username: &str, now: DateTime<Utc>) -> bool {
        self.records
            .get(username)
            .and_then(|r| r.locked_until)
            .is_some_and(|until| now < until)
    }

    /// Record a failed login attempt. After 5 failures, apply exponential backoff capped at 64s.
    /// Stale records for every username are dropped first.
    pub fn record_failure(&mut self, username: &str, now: DateTime<Utc>) {
        self.prune(now);
        let record = self
            .records
            .entry(username.to_string())
            .or_insert(FailureRecord {
                failures: 0,
                last_failure: now,
                locked_until: None,
            });
        record.failures += 1;
        record.last_failure = now;
        if record.failures >= 5 {
            let delay_secs = std::cmp::min(1i64 << (record.failures - 5).min(6), 64);
            record.locked_until = Some(now + chrono::Duration::seconds(delay_secs));
        }
    }

    /// Forget usernames whose lockout has expired and whose last failure is
    /// older than [`FAILURE_WINDOW_SECS`].
    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.records.retain(|_, record| !record.is_stale(now));
    }

    /// Reset on successful login.
    pub fn reset(&mut self, username: &str) {
        self.records.remove(username);
    }
}

// ============================================================================
// Application State
// ============================================================================

pub struct AppState {
    pub config: AppConfig,
    pub store: Store,
    pub login_throttle: Mutex<LoginThrottle>,
}

impl AppState {
    /// Build state around a store that connects on first use.
    pub fn new(config: AppConfig) -> Self {
        let store = Store::new(config.db_path.clone());
        Self {
            config,
            store,
            login_throttle: Mutex::new(LoginThrottle::new()),
        }
    }
}

/// Canonicalise `target` and check it stays within `base` once symlinks and
/// `..` are resolved. `Ok(None)` means it escapes; a missing path is an
/// `ErrorKind::NotFound` error.
pub fn validate_path_within(base: &Path, target: &Path) -> std::io::Result<Option<PathBuf>> {
    let canonical_base = fs::canonicalize(base)?;
    let canonical = fs::canonicalize(target)?;
    Ok(canonical.starts_with(&canonical_base).then_some(canonical))
}

// Re-export commonly used types
pub use error::AppError;
pub use models::{Account, AccountId, Document, EntityKind, RouteLink, Session, ROUTES};
pub use router::{app, resolve, Route, Verb};
pub use templates::{sanitize, substitute, unescape, Sanitized, Template, View};
