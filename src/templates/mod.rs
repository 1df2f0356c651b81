//! Template engine.
//!
//! Templates are plain HTML files under the configured template directory
//! containing `%name%` placeholders. Substitution is a single pass: values
//! are inserted verbatim and never rescanned, and tokens with no value are
//! left exactly as written.
//!
//! ## Module Structure
//!
//! - `escape` - sanitisation of user-authored text
//! - `components` - navigation, dynamic forms and message banners

mod components;
mod escape;

pub use components::{dynamic_form, message_banner, nav_bar, select_field, FormField, FieldKind};
pub use escape::{sanitize, unescape, Sanitized};

use crate::error::AppError;
use crate::models::ROUTES;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;

pub const DEFAULT_TITLE: &str = "Drealism";

// ============================================================================
// Templates
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Template {
    /// Single-column page: login, register, account, search.
    Default,
    /// Collection page with a create form beside the list.
    Main,
    /// Home page and single-record views.
    Index,
}

impl Template {
    pub fn file_name(self) -> &'static str {
        match self {
            Template::Default => "default.maru",
            Template::Main => "main.maru",
            Template::Index => "index.maru",
        }
    }
}

// ============================================================================
// Placeholder Values
// ============================================================================

/// Anything that can answer "what goes in `%name%`?".
pub trait Placeholders {
    fn lookup(&self, name: &str) -> Option<&str>;
}

impl Placeholders for HashMap<&str, &str> {
    fn lookup(&self, name: &str) -> Option<&str> {
        self.get(name).copied()
    }
}

/// The five slots every page template uses. Unset slots fall back to a page
/// title of [`DEFAULT_TITLE`], the standard navigation, or empty markup.
#[derive(Debug, Clone)]
pub struct View {
    pub title: Option<String>,
    pub nav: Option<String>,
    pub form: Option<String>,
    pub content: Option<String>,
    pub script: Option<String>,
    default_nav: String,
}

impl Default for View {
    fn default() -> Self {
        Self {
            title: None,
            nav: None,
            form: None,
            content: None,
            script: None,
            default_nav: nav_bar(ROUTES),
        }
    }
}

impl View {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn form(mut self, form: impl Into<String>) -> Self {
        self.form = Some(form.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn script(mut self, script: impl Into<String>) -> Self {
        self.script = Some(script.into());
        self
    }
}

impl Placeholders for View {
    fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "title" => Some(self.title.as_deref().unwrap_or(DEFAULT_TITLE)),
            "nav" => Some(self.nav.as_deref().unwrap_or(&self.default_nav)),
            "form" => Some(self.form.as_deref().unwrap_or("")),
            "content" => Some(self.content.as_deref().unwrap_or("")),
            "script" => Some(self.script.as_deref().unwrap_or("")),
            _ => None,
        }
    }
}

// ============================================================================
// Substitution
// ============================================================================

lazy_static! {
    static ref PLACEHOLDER: Regex = Regex::new(r"%(\w+)%").unwrap();
}

/// Replace every `%name%` the values know about; leave the rest untouched.
pub fn substitute(template: &str, values: &impl Placeholders) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match values.lookup(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Load `template` from `dir` and fill it. The whole document is produced
/// before anything is returned, so a read failure never yields partial output.
pub async fn render(dir: &Path, template: Template, values: &impl Placeholders) -> Result<String, AppError> {
    let path = dir.join(template.file_name());
    let text = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| AppError::Template {
            name: template.file_name().to_string(),
            source,
        })?;
    Ok(substitute(&text, values))
}
