//! Shared HTML components: navigation, generated forms, message banners.

use crate::models::RouteLink;
use std::collections::HashMap;

use super::escape::sanitize;

// ============================================================================
// Navigation Bar
// ============================================================================

pub fn nav_bar(routes: &[RouteLink]) -> String {
    let items: String = routes
        .iter()
        .map(|route| {
            format!(
                r#"<li class="header-box"><a href="{}">{}</a></li>"#,
                route.url, route.name
            )
        })
        .collect();

    format!(r#"<ul class="header-box">{}</ul>"#, items)
}

// ============================================================================
// Dynamic Forms
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Password,
    TextArea,
}

#[derive(Debug, Clone, Copy)]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub placeholder: &'static str,
}

impl FormField {
    pub const fn text(name: &'static str, label: &'static str, placeholder: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Text,
            placeholder,
        }
    }

    pub const fn password(name: &'static str, label: &'static str, placeholder: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::Password,
            placeholder,
        }
    }

    pub const fn textarea(name: &'static str, label: &'static str, placeholder: &'static str) -> Self {
        Self {
            name,
            label,
            kind: FieldKind::TextArea,
            placeholder,
        }
    }
}

/// Render a form for `fields`. `method` doubles as the form id so the
/// put-or-delete script can find PUT and DELETE forms and replay them with
/// the right verb; browsers only ever submit those forms as POST.
///
/// `current` values are inserted verbatim and must already be sanitized.
/// `extra` is appended inside the form before the submit button.
pub fn dynamic_form(
    fields: &[FormField],
    action: &str,
    method: &str,
    current: &HashMap<&str, &str>,
    extra: &str,
) -> String {
    let html_method = if method.eq_ignore_ascii_case("get") { "get" } else { "post" };
    let mut html = format!(
        r#"<form id="{method}" class="box" action="{action}" method="{html_method}">"#,
        method = method,
        action = action,
        html_method = html_method,
    );

    for field in fields {
        let value = current.get(field.name).copied().unwrap_or("");
        match field.kind {
            FieldKind::TextArea => html.push_str(&format!(
                r#"<div><label for="{name}">{label}</label><br><textarea id="{name}" name="{name}" placeholder="{placeholder}">{value}</textarea></div>"#,
                name = field.name,
                label = field.label,
                placeholder = field.placeholder,
                value = value,
            )),
            FieldKind::Text | FieldKind::Password => html.push_str(&format!(
                r#"<div><label for="{name}">{label}</label><br><input type="{kind}" id="{name}" name="{name}" placeholder="{placeholder}" value="{value}"></div>"#,
                kind = if field.kind == FieldKind::Password { "password" } else { "text" },
                name = field.name,
                label = field.label,
                placeholder = field.placeholder,
                value = value,
            )),
        }
    }

    html.push_str(extra);
    html.push_str(&format!(r#"<button type="submit">{}</button></form>"#, method));
    html
}

/// A `<select>` with an empty "none" option. Option labels must already be
/// sanitized; values are ids.
pub fn select_field(name: &str, label: &str, options: &[(&str, &str)], selected: Option<&str>) -> String {
    let mut html = format!(
        r#"<div><label for="{name}">{label}</label><br><select id="{name}" name="{name}"><option value="">(none)</option>"#,
        name = name,
        label = label,
    );
    for (value, text) in options {
        let marker = if Some(*value) == selected { " selected" } else { "" };
        html.push_str(&format!(
            r#"<option value="{}"{}>{}</option>"#,
            sanitize(value),
            marker,
            text
        ));
    }
    html.push_str("</select></div>");
    html
}

// ============================================================================
// Messages
// ============================================================================

/// Error banner for `?error=` codes passed back by redirects.
pub fn message_banner(code: Option<&str>) -> String {
    let text = match code {
        None | Some("") => return String::new(),
        Some("missing-fields") => "Required fields are missing.",
        Some("username-taken") => "That username is already taken.",
        Some("invalid-login") => "Invalid username or password.",
        Some("locked") => "Too many failed attempts. Try again shortly.",
        Some(_) => "Something went wrong.",
    };
    format!(r#"<div class="message error">{}</div>"#, text)
}
