//! Page handlers outside the document collections: home, login, register,
//! logout, the account page and search.

use crate::auth::{
    authenticate, clear_session_cookies, create_session, current_session, delete_session,
    hash_password, session_cookies, verify_password,
};
use crate::documents::owned_by;
use crate::error::AppError;
use crate::forms::FieldMap;
use crate::models::{Account, Document, EntityKind};
use crate::store::Collection;
use crate::templates::{dynamic_form, message_banner, render, FormField, Sanitized, Template, View};
use crate::{AppState, LoginThrottle};
use axum::{
    http::{header::LOCATION, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{MutexGuard, PoisonError};
use tracing::{info, warn};

const LOGIN_FIELDS: [FormField; 2] = [
    FormField::text("username", "Username", "Enter your username"),
    FormField::password("password", "Password", "Enter your password"),
];

const REGISTER_FIELDS: [FormField; 3] = [
    FormField::text("name", "Name", "Enter your name"),
    FormField::text("username", "Username", "Enter your username"),
    FormField::password("password", "Password", "Enter your password"),
];

const SEARCH_FIELDS: [FormField; 1] = [FormField::text("query", "Search:", "Search your notes, categories and tasks")];

fn see_other(location: &str) -> [(axum::http::HeaderName, String); 1] {
    [(LOCATION, location.to_string())]
}

fn throttle(state: &AppState) -> MutexGuard<'_, LoginThrottle> {
    state.login_throttle.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Index Handler
// ============================================================================

pub async fn home(state: &AppState) -> Result<Response, AppError> {
    let view = View::new("Drealism: Home page").content(
        "<h1>Drealism</h1><p>Keep notes, file them under categories and track your tasks.</p>",
    );
    let html = render(&state.config.templates_dir, Template::Index, &view).await?;
    Ok(Html(html).into_response())
}

// ============================================================================
// Authentication Handlers
// ============================================================================

async fn login_view(state: &AppState, error: Option<&str>) -> Result<String, AppError> {
    let form = dynamic_form(&LOGIN_FIELDS, "/login", "POST", &HashMap::new(), "");
    let view = View::new("Drealism: Login page").content(format!("{}{}", message_banner(error), form));
    render(&state.config.templates_dir, Template::Default, &view).await
}

/// `GET /login`. With a live session this is a logout, which is what the
/// "Log in/out" navigation entry relies on.
pub async fn login_page(state: &AppState, headers: &HeaderMap, query: &FieldMap) -> Result<Response, AppError> {
    if current_session(&state.store, headers).await?.is_some() {
        return logout(state, headers).await;
    }
    let html = login_view(state, query.get("error")).await?;
    Ok(Html(html).into_response())
}

async fn login_rejected(state: &AppState, code: &str) -> Result<Response, AppError> {
    let html = login_view(state, Some(code)).await?;
    Ok((StatusCode::UNAUTHORIZED, Html(html)).into_response())
}

/// Look up the account for `username` and check `password` against it.
async fn check_credentials(state: &AppState, username: &str, password: &str) -> Result<Option<Account>, AppError> {
    let key = Sanitized::new(username);
    let Some(account_id) = state.store.lookup(Collection::Usernames, key.as_html()).await? else {
        return Ok(None);
    };
    let Some(account) = state.store.get::<Account>(Collection::Accounts, &account_id).await? else {
        warn!(account = %account_id, "username index points at a missing account");
        return Ok(None);
    };
    if verify_password(password, &state.config.pepper, &account.password_hash)? {
        Ok(Some(account))
    } else {
        Ok(None)
    }
}

/// `POST /login`
pub async fn login_submit(state: &AppState, fields: &FieldMap) -> Result<Response, AppError> {
    let (Some(username), Some(password)) = (fields.required("username"), fields.get("password")) else {
        return login_rejected(state, "invalid-login").await;
    };

    let now = Utc::now();
    let locked = throttle(state).is_locked(username, now);
    if locked {
        warn!(username, "login attempt while locked out");
        return login_rejected(state, "locked").await;
    }

    let Some(account) = check_credentials(state, username, password).await? else {
        throttle(state).record_failure(username, now);
        warn!(username, "failed login");
        return login_rejected(state, "invalid-login").await;
    };
    throttle(state).reset(username);

    let session = create_session(&state.store, &account.id, state.config.session_ttl).await?;
    info!(account = %account.id, "logged in");
    Ok((StatusCode::SEE_OTHER, session_cookies(&session), see_other("/user")).into_response())
}

/// `GET /logout`
pub async fn logout(state: &AppState, headers: &HeaderMap) -> Result<Response, AppError> {
    if let Some(session) = current_session(&state.store, headers).await? {
        delete_session(&state.store, &session.id).await?;
        info!(account = %session.account_id, "logged out");
    }
    Ok((StatusCode::SEE_OTHER, clear_session_cookies(), see_other("/")).into_response())
}

/// `GET /register`
pub async fn register_page(state: &AppState, query: &FieldMap) -> Result<Response, AppError> {
    let form = dynamic_form(&REGISTER_FIELDS, "/register", "POST", &HashMap::new(), "");
    let view = View::new("Drealism: Register page")
        .content(format!("{}{}", message_banner(query.get("error")), form));
    let html = render(&state.config.templates_dir, Template::Default, &view).await?;
    Ok(Html(html).into_response())
}

/// `POST /register`
pub async fn register_submit(state: &AppState, fields: &FieldMap) -> Result<Response, AppError> {
    let (Some(name), Some(username), Some(password)) = (
        fields.required("name"),
        fields.required("username"),
        fields.get("password").filter(|p| !p.is_empty()),
    ) else {
        warn!("registration rejected: missing fields");
        return Err(AppError::BadRequest("Missing required fields".into()));
    };

    let account = Account {
        id: uuid::Uuid::new_v4().to_string(),
        username: Sanitized::new(username),
        password_hash: hash_password(password, &state.config.pepper)?,
        display_name: Sanitized::new(name),
        created_at: Utc::now(),
    };

    let claimed = state
        .store
        .claim_unique(Collection::Usernames, account.username.as_html(), &account.id)
        .await?;
    if !claimed {
        warn!(username, "registration rejected: username taken");
        return Ok((StatusCode::SEE_OTHER, see_other("/register?error=username-taken")).into_response());
    }

    if let Err(e) = state.store.insert(Collection::Accounts, &account.id, &account).await {
        // Undo the username claim.
        state.store.remove(Collection::Usernames, account.username.as_html()).await?;
        return Err(e.into());
    }

    info!(account = %account.id, "account registered");
    Ok((StatusCode::SEE_OTHER, see_other("/login")).into_response())
}

// ============================================================================
// Account Handler
// ============================================================================

/// `GET /user`
pub async fn account(state: &AppState, headers: &HeaderMap) -> Result<Response, AppError> {
    let account_id = authenticate(&state.store, headers).await?;
    let account: Account = state
        .store
        .get(Collection::Accounts, &account_id)
        .await?
        .ok_or(AppError::NotFound)?;

    let view = View::new(format!("Drealism: {}", account.username))
        .content(format!("<p>Welcome {}</p>", account.display_name));
    let html = render(&state.config.templates_dir, Template::Default, &view).await?;
    Ok(Html(html).into_response())
}

// ============================================================================
// Search Handler
// ============================================================================

fn doc_matches(doc: &Document, needle: &str) -> bool {
    doc.title.contains_ignore_case(needle) || doc.body.contains_ignore_case(needle)
}

fn results_html(groups: &[(EntityKind, Vec<Document>)], needle: &Sanitized) -> String {
    let total: usize = groups.iter().map(|(_, docs)| docs.len()).sum();
    if total == 0 {
        return format!("<p>No results for \"{}\".</p>", needle);
    }

    let mut html = format!(
        "<h1>Search: \"{}\"</h1><p>{} results</p><div class=\"search-results\">",
        needle, total
    );
    for (kind, docs) in groups.iter().filter(|(_, docs)| !docs.is_empty()) {
        html.push_str(&format!("<h2>{}</h2><ul class=\"list\">", kind.plural()));
        for doc in docs {
            html.push_str(&format!(
                r#"<li class="small-box"><a class="box" href="{}">{}</a></li>"#,
                kind.item_url(&doc.id),
                doc.title
            ));
        }
        html.push_str("</ul>");
    }
    html.push_str("</div>");
    html
}

/// `GET /search?query=...`
pub async fn search(state: &AppState, headers: &HeaderMap, query: &FieldMap) -> Result<Response, AppError> {
    let account = authenticate(&state.store, headers).await?;
    let raw = query.required("query");
    let echoed = raw.map(Sanitized::new);

    let mut current = HashMap::new();
    if let Some(n) = &echoed {
        current.insert("query", n.as_html());
    }
    let form = dynamic_form(&SEARCH_FIELDS, "/search", "GET", &current, "");

    let content = match (raw, &echoed) {
        (Some(raw), Some(echoed)) => {
            let mut groups = Vec::new();
            for kind in EntityKind::ALL {
                let hits: Vec<Document> = owned_by(state, &account, kind)
                    .await?
                    .into_iter()
                    .filter(|doc| doc_matches(doc, raw))
                    .collect();
                groups.push((kind, hits));
            }
            results_html(&groups, echoed)
        }
        _ => "<p>Enter a search term.</p>".to_string(),
    };

    let view = View::new("Drealism: Search").form(form).content(content);
    let html = render(&state.config.templates_dir, Template::Default, &view).await?;
    Ok(Html(html).into_response())
}
