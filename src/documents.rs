//! Notes, categories and tasks.
//!
//! The three collections share one contract: list, show, create, update and
//! delete, all scoped to the account behind the session cookie. The
//! differences (form fields, whether there is a body, the note's category)
//! come from [`EntityKind`].

use crate::auth::authenticate;
use crate::error::AppError;
use crate::forms::FieldMap;
use crate::models::{AccountId, Document, EntityKind};
use crate::store::Collection;
use crate::templates::{dynamic_form, message_banner, render, select_field, Sanitized, Template, View};
use crate::AppState;
use axum::{
    http::{
        header::{CONTENT_TYPE, LOCATION},
        HeaderMap, StatusCode,
    },
    response::{Html, IntoResponse, Response},
};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, warn};

/// Characters of body text shown per list entry.
pub const PREVIEW_CHARS: usize = 100;

const EDIT_SCRIPT: &str =
    r#"<script type="text/javascript" src="/static/js/put-or-delete.js" defer></script>"#;
const RESIZE_SCRIPT: &str =
    r#"<script type="text/javascript" src="/static/js/automatic-resize.js" defer></script>"#;

// ============================================================================
// Queries
// ============================================================================

/// Every document of `kind` owned by `account`, oldest first.
pub async fn owned_by(state: &AppState, account: &str, kind: EntityKind) -> Result<Vec<Document>, AppError> {
    let mut docs: Vec<Document> = state
        .store
        .find(kind.collection(), |doc: &Document| doc.is_owned_by(account))
        .await?;
    docs.sort_by(|a, b| a.created_key().cmp(&b.created_key()));
    Ok(docs)
}

/// Point lookup for a write: missing is 404, someone else's is 403.
async fn owned_document(
    state: &AppState,
    account: &str,
    kind: EntityKind,
    id: &str,
) -> Result<Document, AppError> {
    let doc: Document = state
        .store
        .get(kind.collection(), id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !doc.is_owned_by(account) {
        warn!(kind = kind.singular(), id, account, "write to a document owned by another account");
        return Err(AppError::Forbidden("not the owner"));
    }
    Ok(doc)
}

/// The `category` field of a note form, checked against the account's own
/// categories. Blank means "no category".
async fn resolve_category(
    state: &AppState,
    account: &str,
    kind: EntityKind,
    fields: &FieldMap,
) -> Result<Option<String>, AppError> {
    if kind != EntityKind::Note {
        return Ok(None);
    }
    let Some(id) = fields.required("category") else {
        return Ok(None);
    };
    let category: Option<Document> = state.store.get(Collection::Categories, id).await?;
    match category {
        Some(c) if c.is_owned_by(account) => Ok(Some(c.id)),
        _ => {
            warn!(category = id, account, "note filed under an unknown category");
            Err(AppError::BadRequest("unknown category".into()))
        }
    }
}

/// Title plus the kind's body field, both required. `None` when either is
/// missing or blank.
fn required_text<'a>(kind: EntityKind, fields: &'a FieldMap) -> Option<(&'a str, &'a str)> {
    let title = fields.required("title")?;
    let body = match kind.body_field() {
        Some(name) => fields.required(name)?,
        None => "",
    };
    Some((title, body))
}

// ============================================================================
// HTML
// ============================================================================

async fn category_select(state: &AppState, account: &str, selected: Option<&str>) -> Result<String, AppError> {
    let categories = owned_by(state, account, EntityKind::Category).await?;
    let options: Vec<(&str, &str)> = categories
        .iter()
        .map(|c| (c.id.as_str(), c.title.as_html()))
        .collect();
    Ok(select_field("category", "Category:", &options, selected))
}

fn list_html(kind: EntityKind, docs: &[Document]) -> String {
    if docs.is_empty() {
        return format!("<p>No {} yet.</p>", kind.plural().to_lowercase());
    }

    let mut html = String::from(r#"<ul class="list">"#);
    for doc in docs {
        let preview = if kind.body_field().is_some() {
            format!(
                r#"<p class="small-box">{}</p>"#,
                doc.body.preview(PREVIEW_CHARS)
            )
        } else {
            String::new()
        };
        html.push_str(&format!(
            r#"<li class="small-box"><a class="box" href="{url}">{title}</a>{preview}<span class="small-box">{date} {time}</span></li>"#,
            url = kind.item_url(&doc.id),
            title = doc.title,
            preview = preview,
            date = doc.created_date,
            time = doc.created_time,
        ));
    }
    html.push_str("</ul>");
    html
}

fn detail_html(kind: EntityKind, doc: &Document, category_extra: &str) -> String {
    let mut current = HashMap::new();
    current.insert("title", doc.title.as_html());
    if let Some(name) = kind.body_field() {
        current.insert(name, doc.body.as_html());
    }

    let url = kind.item_url(&doc.id);
    let update_form = dynamic_form(kind.fields(), &url, "PUT", &current, category_extra);
    let delete_form = dynamic_form(&[], &url, "DELETE", &HashMap::new(), "");

    format!(
        "<div><p>{} {}</p></div>{}{}",
        doc.created_date, doc.created_time, update_form, delete_form
    )
}

fn scripts_for(kind: EntityKind) -> String {
    match kind {
        EntityKind::Note => format!("{}{}", EDIT_SCRIPT, RESIZE_SCRIPT),
        _ => EDIT_SCRIPT.to_string(),
    }
}

fn redirect(status: StatusCode, location: String) -> Response {
    (status, [(LOCATION, location)]).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// `GET /<resource>`
pub async fn list(
    state: &AppState,
    headers: &HeaderMap,
    kind: EntityKind,
    query: &FieldMap,
) -> Result<Response, AppError> {
    let account = authenticate(&state.store, headers).await?;
    let docs = owned_by(state, &account, kind).await?;

    let extra = match kind {
        EntityKind::Note => category_select(state, &account, None).await?,
        _ => String::new(),
    };
    let form = format!(
        "{}{}",
        message_banner(query.get("error")),
        dynamic_form(kind.fields(), &kind.list_url(), "POST", &HashMap::new(), &extra)
    );

    let view = View::new(format!("Drealism: {}", kind.plural()))
        .form(form)
        .content(list_html(kind, &docs))
        .script(scripts_for(kind));
    let html = render(&state.config.templates_dir, Template::Main, &view).await?;
    Ok(Html(html).into_response())
}

/// `GET /<resource>/<id>`. An id the account does not own renders the same
/// page as one that does not exist.
pub async fn show(state: &AppState, headers: &HeaderMap, kind: EntityKind, id: &str) -> Result<Response, AppError> {
    let account = authenticate(&state.store, headers).await?;
    let docs = owned_by(state, &account, kind).await?;

    let view = match docs.iter().find(|doc| doc.id == id) {
        Some(doc) => {
            let extra = match kind {
                EntityKind::Note => category_select(state, &account, doc.category_id.as_deref()).await?,
                _ => String::new(),
            };
            View::new(format!("Drealism: {}", doc.title))
                .content(detail_html(kind, doc, &extra))
                .script(scripts_for(kind))
        }
        None => View::new(format!("Drealism: {}", kind.plural()))
            .content(format!("<p>{} not found</p>", kind.singular())),
    };

    let html = render(&state.config.templates_dir, Template::Index, &view).await?;
    Ok(Html(html).into_response())
}

/// `POST /<resource>`
pub async fn create(
    state: &AppState,
    headers: &HeaderMap,
    kind: EntityKind,
    fields: &FieldMap,
) -> Result<Response, AppError> {
    let account: AccountId = authenticate(&state.store, headers).await?;

    let Some((title, body)) = required_text(kind, fields) else {
        warn!(kind = kind.singular(), "create rejected: missing fields");
        return Ok(redirect(StatusCode::FOUND, format!("{}?error=missing-fields", kind.list_url())));
    };
    let category_id = resolve_category(state, &account, kind, fields).await?;

    let mut doc = Document::new(&account, Sanitized::new(title), Sanitized::new(body), Utc::now());
    doc.category_id = category_id;
    state.store.insert(kind.collection(), &doc.id, &doc).await?;
    info!(kind = kind.singular(), id = %doc.id, account = %account, "document created");

    Ok((
        StatusCode::CREATED,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        format!("{} created successfully", kind.singular()),
    )
        .into_response())
}

/// `PUT /<resource>/<id>`: whole-field replace, last write wins. Answers 303
/// so a client following the redirect fetches the item with GET.
pub async fn update(
    state: &AppState,
    headers: &HeaderMap,
    kind: EntityKind,
    id: &str,
    fields: &FieldMap,
) -> Result<Response, AppError> {
    let account = authenticate(&state.store, headers).await?;

    let Some((title, body)) = required_text(kind, fields) else {
        warn!(kind = kind.singular(), id, "update rejected: missing fields");
        return Err(AppError::BadRequest("Missing required fields".into()));
    };

    let mut doc = owned_document(state, &account, kind, id).await?;
    doc.title = Sanitized::new(title);
    doc.body = Sanitized::new(body);
    doc.category_id = resolve_category(state, &account, kind, fields).await?;

    if !state.store.replace(kind.collection(), id, &doc).await? {
        return Err(AppError::NotFound);
    }
    info!(kind = kind.singular(), id, account = %account, "document updated");
    Ok(redirect(StatusCode::SEE_OTHER, kind.item_url(id)))
}

/// `DELETE /<resource>/<id>`
pub async fn delete(state: &AppState, headers: &HeaderMap, kind: EntityKind, id: &str) -> Result<Response, AppError> {
    let account = authenticate(&state.store, headers).await?;
    owned_document(state, &account, kind, id).await?;

    state.store.remove(kind.collection(), id).await?;
    info!(kind = kind.singular(), id, account = %account, "document deleted");
    Ok(redirect(StatusCode::FOUND, kind.list_url()))
}
