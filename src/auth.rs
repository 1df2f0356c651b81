//! Authentication and session management.
//!
//! Sessions live server-side in the `sessions` collection. The browser holds
//! the session id in the `session` cookie; the `account` cookie is written for
//! the client's convenience but never trusted: the account is always the one
//! stored on the session row.

use crate::error::AppError;
use crate::models::{AccountId, Session};
use crate::store::{Collection, Store, StoreError};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::http::{
    header::{COOKIE, SET_COOKIE},
    HeaderMap, HeaderName,
};
use axum::response::AppendHeaders;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

/// Session cookie name
pub const SESSION_COOKIE: &str = "session";

/// Advisory account cookie name
pub const ACCOUNT_COOKIE: &str = "account";

// ============================================================================
// Cookie Parsing
// ============================================================================

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CookieValues<'a> {
    pub session: Option<&'a str>,
    pub account: Option<&'a str>,
}

/// Split a `Cookie` header on `;`, trim each pair and split it on the first
/// `=`. Later duplicates win.
pub fn parse_cookie_header(header: &str) -> CookieValues<'_> {
    let mut values = CookieValues::default();
    for pair in header.split(';') {
        let Some((key, value)) = pair.trim().split_once('=') else {
            continue;
        };
        match key {
            SESSION_COOKIE => values.session = Some(value),
            ACCOUNT_COOKIE => values.account = Some(value),
            _ => {}
        }
    }
    values
}

/// Session id from any `Cookie` header on the request. `None` when there are
/// no cookies at all, `Some(None)` when there are cookies but no session.
fn session_id_from(headers: &HeaderMap) -> Option<Option<&str>> {
    let mut saw_cookie = false;
    let mut session = None;
    for value in headers.get_all(COOKIE) {
        let Ok(raw) = value.to_str() else {
            continue;
        };
        saw_cookie = true;
        if let Some(id) = parse_cookie_header(raw).session.filter(|id| !id.is_empty()) {
            session = Some(id);
        }
    }
    saw_cookie.then_some(session)
}

// ============================================================================
// Auth Gate
// ============================================================================

/// Resolve the request's session cookie into the account it belongs to.
pub async fn authenticate(store: &Store, headers: &HeaderMap) -> Result<AccountId, AppError> {
    authenticate_at(store, headers, Utc::now()).await
}

pub async fn authenticate_at(
    store: &Store,
    headers: &HeaderMap,
    now: DateTime<Utc>,
) -> Result<AccountId, AppError> {
    let session_id = match session_id_from(headers) {
        None => {
            warn!("request without cookies");
            return Err(AppError::Unauthorized("Cookies are required for login"));
        }
        Some(None) => return Err(AppError::Unauthorized("Session not found")),
        Some(Some(id)) => id,
    };

    let session: Session = match store.get(Collection::Sessions, session_id).await? {
        Some(s) => s,
        None => {
            warn!("unknown session id");
            return Err(AppError::Unauthorized("Session not found"));
        }
    };

    if session.is_expired(now) {
        store.remove(Collection::Sessions, &session.id).await?;
        info!(account = %session.account_id, "expired session removed");
        return Err(AppError::SessionExpired);
    }

    Ok(session.account_id)
}

/// The live session named by the request's cookie, if any. Unlike
/// [`authenticate`] this never fails on a missing or stale cookie; a stale
/// one has its row removed.
pub async fn current_session(store: &Store, headers: &HeaderMap) -> Result<Option<Session>, AppError> {
    let Some(Some(session_id)) = session_id_from(headers) else {
        return Ok(None);
    };
    let Some(session) = store.get::<Session>(Collection::Sessions, session_id).await? else {
        return Ok(None);
    };
    if session.is_expired(Utc::now()) {
        store.remove(Collection::Sessions, &session.id).await?;
        info!(account = %session.account_id, "expired session removed");
        return Ok(None);
    }
    Ok(Some(session))
}

// ============================================================================
// Sessions
// ============================================================================

pub async fn create_session(
    store: &Store,
    account_id: &str,
    ttl: chrono::Duration,
) -> Result<Session, AppError> {
    let session = Session {
        id: uuid::Uuid::new_v4().to_string(),
        account_id: account_id.to_string(),
        expires_at: Utc::now() + ttl,
    };
    store.insert(Collection::Sessions, &session.id, &session).await?;
    debug!(account = %account_id, "session created");
    Ok(session)
}

pub async fn delete_session(store: &Store, session_id: &str) -> Result<bool, AppError> {
    Ok(store.remove(Collection::Sessions, session_id).await?)
}

/// Drop every session whose expiry has passed. Returns how many went.
pub async fn purge_expired_sessions(store: &Store, now: DateTime<Utc>) -> Result<usize, StoreError> {
    let expired: Vec<Session> = store
        .find(Collection::Sessions, |s: &Session| s.is_expired(now))
        .await?;
    for session in &expired {
        store.remove(Collection::Sessions, &session.id).await?;
    }
    Ok(expired.len())
}

// ============================================================================
// Cookies
// ============================================================================

fn base_cookie(name: &'static str, value: String) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .same_site(SameSite::Strict)
        .http_only(true)
        .build()
}

pub fn session_cookies(session: &Session) -> AppendHeaders<[(HeaderName, String); 2]> {
    AppendHeaders([
        (
            SET_COOKIE,
            base_cookie(SESSION_COOKIE, session.id.clone()).to_string(),
        ),
        (
            SET_COOKIE,
            base_cookie(ACCOUNT_COOKIE, session.account_id.clone()).to_string(),
        ),
    ])
}

pub fn clear_session_cookies() -> AppendHeaders<[(HeaderName, String); 2]> {
    let clear = |name| {
        let mut cookie = base_cookie(name, String::new());
        cookie.make_removal();
        cookie.to_string()
    };
    AppendHeaders([
        (SET_COOKIE, clear(SESSION_COOKIE)),
        (SET_COOKIE, clear(ACCOUNT_COOKIE)),
    ])
}

// ============================================================================
// Passwords
// ============================================================================

fn peppered(password: &str, pepper: &str) -> String {
    format!("{}{}", password, pepper)
}

/// Argon2id over `password + pepper` with a fresh random salt.
pub fn hash_password(password: &str, pepper: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(peppered(password, pepper).as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Hash(e.to_string()))
}

pub fn verify_password(password: &str, pepper: &str, hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "stored password hash is malformed");
        AppError::Hash(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(peppered(password, pepper).as_bytes(), &parsed)
        .is_ok())
}
