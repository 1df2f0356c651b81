//! Request body and query string normalisation.
//!
//! Create and update accept either URL-encoded form data or a JSON object;
//! both end up as the same flat field map so handlers never care which
//! encoding the client used.

use crate::error::AppError;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, HeaderMap};
use std::collections::HashMap;

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FieldMap(HashMap<String, String>);

impl FieldMap {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Trimmed, non-empty value of `name`.
    pub fn required(&self, name: &str) -> Option<&str> {
        self.get(name).map(str::trim).filter(|v| !v.is_empty())
    }

}

impl FromIterator<(String, String)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        FieldMap(iter.into_iter().collect())
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim_start().to_ascii_lowercase().starts_with("application/json"))
        .unwrap_or(false)
}

pub fn parse_urlencoded(raw: &[u8]) -> FieldMap {
    url::form_urlencoded::parse(raw).into_owned().collect()
}

/// Decode a JSON object body. Strings are taken as-is, numbers and booleans
/// by their JSON text; nulls, arrays and objects are dropped.
pub fn parse_json(raw: &[u8]) -> Result<FieldMap, AppError> {
    let value: serde_json::Value = serde_json::from_slice(raw)
        .map_err(|_| AppError::BadRequest("malformed JSON body".into()))?;
    let serde_json::Value::Object(map) = value else {
        return Err(AppError::BadRequest("JSON body must be an object".into()));
    };
    Ok(map
        .into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::String(s) => Some((k, s)),
            serde_json::Value::Number(n) => Some((k, n.to_string())),
            serde_json::Value::Bool(b) => Some((k, b.to_string())),
            _ => None,
        })
        .collect())
}

pub fn parse_body(headers: &HeaderMap, raw: &[u8]) -> Result<FieldMap, AppError> {
    if raw.is_empty() {
        return Ok(FieldMap::default());
    }
    if is_json(headers) {
        parse_json(raw)
    } else {
        Ok(parse_urlencoded(raw))
    }
}

/// Read the whole body and normalise it.
pub async fn read_fields(headers: &HeaderMap, body: Body) -> Result<FieldMap, AppError> {
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| AppError::BadRequest("request body unreadable or too large".into()))?;
    parse_body(headers, &bytes)
}

pub fn parse_query(query: Option<&str>) -> FieldMap {
    query
        .map(|q| parse_urlencoded(q.as_bytes()))
        .unwrap_or_default()
}
