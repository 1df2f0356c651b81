//! Error taxonomy for request handling.
//!
//! Every handler returns `Result<Response, AppError>`. Internal failures are
//! logged with their detail and answered with a generic body; nothing about the
//! store, the filesystem or the hasher reaches the client.

use crate::auth::clear_session_cookies;
use crate::store::StoreError;
use axum::{
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    /// The session existed but is past its expiry; the row is already gone.
    #[error("session expired")]
    SessionExpired,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("cannot read template {name}: {source}")]
    Template {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::SessionExpired => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Template { .. }
            | AppError::Store(_)
            | AppError::Hash(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_body(&self) -> String {
        match self {
            AppError::NotFound => "404 Not Found".to_string(),
            AppError::Unauthorized(reason) => format!("401 Unauthorized: {}", reason),
            AppError::Forbidden(_) | AppError::SessionExpired => "403 Forbidden".to_string(),
            AppError::BadRequest(reason) => format!("400 Bad Request: {}", reason),
            _ => "Internal Server Error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = self.public_body();
        let headers = [(CONTENT_TYPE, "text/plain; charset=utf-8")];

        if matches!(self, AppError::SessionExpired) {
            return (status, clear_session_cookies(), headers, body).into_response();
        }

        (status, headers, body).into_response()
    }
}
