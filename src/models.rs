//! Data models for accounts, sessions and the per-account documents.

use crate::store::Collection;
use crate::templates::{FormField, Sanitized};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub type AccountId = String;

// ============================================================================
// Accounts & Sessions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Unique; stored sanitized, which is also how logins look it up.
    pub username: Sanitized,
    pub password_hash: String,
    pub display_name: Sanitized,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub account_id: AccountId,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

// ============================================================================
// Documents
// ============================================================================

/// Notes, categories and tasks share this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub owner_account_id: AccountId,
    pub title: Sanitized,
    #[serde(default)]
    pub body: Sanitized,
    /// `YYYY-MM-DD`, UTC.
    pub created_date: String,
    /// `HH:MM:SS`, UTC.
    pub created_time: String,
    /// Notes only: the owning account's category this note is filed under.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,
}

impl Document {
    pub fn new(owner: &str, title: Sanitized, body: Sanitized, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(now),
            owner_account_id: owner.to_string(),
            title,
            body,
            created_date: now.format("%Y-%m-%d").to_string(),
            created_time: now.format("%H:%M:%S").to_string(),
            category_id: None,
        }
    }

    pub fn is_owned_by(&self, account: &str) -> bool {
        self.owner_account_id == account
    }

    /// Ordering key: oldest first.
    pub fn created_key(&self) -> (&str, &str, &str) {
        (&self.created_date, &self.created_time, &self.id)
    }
}

/// The three document-backed resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Note,
    Category,
    Task,
}

const TITLE_FIELD: FormField = FormField::text("title", "Title:", "Enter title");
const NOTE_FIELDS: [FormField; 2] = [
    TITLE_FIELD,
    FormField::textarea("content", "Content:", "Enter content"),
];
const CATEGORY_FIELDS: [FormField; 1] = [TITLE_FIELD];
const TASK_FIELDS: [FormField; 2] = [
    TITLE_FIELD,
    FormField::textarea("description", "Description:", "Enter description"),
];

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [EntityKind::Note, EntityKind::Category, EntityKind::Task];

    pub fn from_resource_key(key: &str) -> Option<Self> {
        match key {
            "notes" => Some(EntityKind::Note),
            "categories" => Some(EntityKind::Category),
            "tasks" => Some(EntityKind::Task),
            _ => None,
        }
    }

    /// First path segment, also the collection list location.
    pub fn resource_key(self) -> &'static str {
        match self {
            EntityKind::Note => "notes",
            EntityKind::Category => "categories",
            EntityKind::Task => "tasks",
        }
    }

    pub fn collection(self) -> Collection {
        match self {
            EntityKind::Note => Collection::Notes,
            EntityKind::Category => Collection::Categories,
            EntityKind::Task => Collection::Tasks,
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            EntityKind::Note => "Note",
            EntityKind::Category => "Category",
            EntityKind::Task => "Task",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            EntityKind::Note => "Notes",
            EntityKind::Category => "Categories",
            EntityKind::Task => "Tasks",
        }
    }

    /// Form field carrying the body text, if this kind has one. Such a body
    /// is required on create and update.
    pub fn body_field(self) -> Option<&'static str> {
        match self {
            EntityKind::Note => Some("content"),
            EntityKind::Category => None,
            EntityKind::Task => Some("description"),
        }
    }

    pub fn fields(self) -> &'static [FormField] {
        match self {
            EntityKind::Note => &NOTE_FIELDS,
            EntityKind::Category => &CATEGORY_FIELDS,
            EntityKind::Task => &TASK_FIELDS,
        }
    }

    pub fn list_url(self) -> String {
        format!("/{}", self.resource_key())
    }

    pub fn item_url(self, id: &str) -> String {
        format!("/{}/{}", self.resource_key(), urlencoding::encode(id))
    }
}

// ============================================================================
// Ids
// ============================================================================

const BASE36: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn to_base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// Millisecond timestamp in base 36 followed by 11 random base-36 characters.
/// Ids created later sort after earlier ones (within the same prefix width)
/// and need no coordination to stay unique.
pub fn generate_id(now: DateTime<Utc>) -> String {
    let millis = now.timestamp_millis().max(0) as u64;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..11)
        .map(|_| BASE36[rng.gen_range(0..36)] as char)
        .collect();
    format!("{}{}", to_base36(millis), suffix)
}

// ============================================================================
// Navigation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteLink {
    pub name: &'static str,
    pub url: &'static str,
}

pub const ROUTES: &[RouteLink] = &[
    RouteLink { name: "Index", url: "/" },
    RouteLink { name: "Notes", url: "/notes" },
    RouteLink { name: "Tasks", url: "/tasks" },
    RouteLink { name: "Categories", url: "/categories" },
    RouteLink { name: "Search", url: "/search" },
    RouteLink { name: "User", url: "/user" },
    RouteLink { name: "Log in/out", url: "/login" },
    RouteLink { name: "Register", url: "/register" },
];
