//! Request routing.
//!
//! All requests land in [`dispatch`]. The path is split into non-empty,
//! percent-decoded segments; the first segment is the resource key and
//! [`resolve`] maps it, the remaining segments and the verb to exactly one
//! [`Route`]. Anything it does not recognise is a 404.

use crate::error::AppError;
use crate::forms::{parse_query, read_fields};
use crate::models::EntityKind;
use crate::{documents, handlers, static_files, AppState};
use axum::{
    extract::{Request, State},
    response::{IntoResponse, Response},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[cfg(test)]
#[path = "router_test.rs"]
mod router_test;

// ============================================================================
// Routes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    pub fn from_method(method: &axum::http::Method) -> Option<Self> {
        match method.as_str() {
            "GET" => Some(Verb::Get),
            "POST" => Some(Verb::Post),
            "PUT" => Some(Verb::Put),
            "DELETE" => Some(Verb::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Static(Vec<String>),
    List(EntityKind),
    Show(EntityKind, String),
    Create(EntityKind),
    Update(EntityKind, String),
    Delete(EntityKind, String),
    Search,
    LoginPage,
    Login,
    RegisterPage,
    Register,
    Logout,
    Account,
}

/// Split a URL path into its non-empty segments, percent-decoding each one.
/// A segment that does not decode to UTF-8 makes the whole path invalid.
pub fn path_segments(path: &str) -> Option<Vec<String>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| urlencoding::decode(s).ok().map(|d| d.into_owned()))
        .collect()
}

fn entity_route(kind: EntityKind, verb: Verb, rest: &[String]) -> Option<Route> {
    match (verb, rest) {
        (Verb::Get, []) => Some(Route::List(kind)),
        (Verb::Post, []) => Some(Route::Create(kind)),
        (Verb::Get, [id]) => Some(Route::Show(kind, id.clone())),
        (Verb::Put, [id]) => Some(Route::Update(kind, id.clone())),
        (Verb::Delete, [id]) => Some(Route::Delete(kind, id.clone())),
        _ => None,
    }
}

/// Pick the single route for `verb` + `segments`, or `None` for a 404.
pub fn resolve(verb: Verb, segments: &[String]) -> Option<Route> {
    let Some((key, rest)) = segments.split_first() else {
        return (verb == Verb::Get).then_some(Route::Home);
    };

    if key == "static" {
        return (verb == Verb::Get && !rest.is_empty()).then(|| Route::Static(rest.to_vec()));
    }

    if let Some(kind) = EntityKind::from_resource_key(key) {
        return entity_route(kind, verb, rest);
    }

    if !rest.is_empty() {
        return None;
    }

    match (key.as_str(), verb) {
        ("search", Verb::Get) => Some(Route::Search),
        ("login", Verb::Get) => Some(Route::LoginPage),
        ("login", Verb::Post) => Some(Route::Login),
        ("register", Verb::Get) => Some(Route::RegisterPage),
        ("register", Verb::Post) => Some(Route::Register),
        ("logout", Verb::Get) => Some(Route::Logout),
        ("user", Verb::Get) => Some(Route::Account),
        _ => None,
    }
}

// ============================================================================
// Dispatch
// ============================================================================

async fn run(state: &AppState, route: Route, request: Request) -> Result<Response, AppError> {
    let (parts, body) = request.into_parts();
    let headers = &parts.headers;
    let query = parse_query(parts.uri.query());

    match route {
        Route::Home => handlers::home(state).await,
        Route::Static(segments) => static_files::serve(&state.config.public_dir, &segments).await,
        Route::List(kind) => documents::list(state, headers, kind, &query).await,
        Route::Show(kind, id) => documents::show(state, headers, kind, &id).await,
        Route::Create(kind) => {
            let fields = read_fields(headers, body).await?;
            documents::create(state, headers, kind, &fields).await
        }
        Route::Update(kind, id) => {
            let fields = read_fields(headers, body).await?;
            documents::update(state, headers, kind, &id, &fields).await
        }
        Route::Delete(kind, id) => documents::delete(state, headers, kind, &id).await,
        Route::Search => handlers::search(state, headers, &query).await,
        Route::LoginPage => handlers::login_page(state, headers, &query).await,
        Route::Login => {
            let fields = read_fields(headers, body).await?;
            handlers::login_submit(state, &fields).await
        }
        Route::RegisterPage => handlers::register_page(state, &query).await,
        Route::Register => {
            let fields = read_fields(headers, body).await?;
            handlers::register_submit(state, &fields).await
        }
        Route::Logout => handlers::logout(state, headers).await,
        Route::Account => handlers::account(state, headers).await,
    }
}

/// The one handler behind every path. Whatever happens, exactly one response
/// comes back.
pub async fn dispatch(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let Some(verb) = Verb::from_method(request.method()) else {
        return AppError::NotFound.into_response();
    };
    let Some(segments) = path_segments(request.uri().path()) else {
        return AppError::BadRequest("malformed path".into()).into_response();
    };
    let Some(route) = resolve(verb, &segments) else {
        return AppError::NotFound.into_response();
    };

    run(&state, route, request)
        .await
        .unwrap_or_else(IntoResponse::into_response)
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(dispatch)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!("http_request", %method, uri = %uri)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     _latency: std::time::Duration,
                     _span: &tracing::Span| {
                        let status = res.status();
                        if status.is_server_error() {
                            tracing::error!(%status, "response");
                        } else {
                            tracing::info!(%status, "response");
                        }
                    },
                ),
        )
}
