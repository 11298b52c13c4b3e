use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::StoreError;

/// Fixed category set for stored entries.
///
/// `Review` is the holding area for low-confidence classifications; it is
/// addressable like any other collection but is never chosen by the
/// confidence router when the score clears the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    People,
    Projects,
    Ideas,
    Admin,
    Review,
}

impl Category {
    /// All collections, in stable lock-acquisition order.
    pub const ALL: [Category; 5] = [
        Category::People,
        Category::Projects,
        Category::Ideas,
        Category::Admin,
        Category::Review,
    ];

    /// Categories the model may classify into (excludes the review holding area).
    pub const CLASSIFIABLE: [Category; 4] = [
        Category::People,
        Category::Projects,
        Category::Ideas,
        Category::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::People => "people",
            Category::Projects => "projects",
            Category::Ideas => "ideas",
            Category::Admin => "admin",
            Category::Review => "review",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "people" => Ok(Category::People),
            "projects" => Ok(Category::Projects),
            "ideas" => Ok(Category::Ideas),
            "admin" => Ok(Category::Admin),
            "review" => Ok(Category::Review),
            other => Err(StoreError::InvalidCategory(other.to_string())),
        }
    }
}

/// One stored fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: Ulid,
    pub category: Category,
    /// Original user-supplied content. Never rewritten after creation.
    pub raw_text: String,
    /// Classification confidence in [0, 1], assigned at creation.
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub last_modified_at: DateTime<Utc>,
    /// Session key of the conversation turn that produced this entry.
    pub origin_session: Option<String>,
    /// Transport message id of the outbound confirmation, for reply correlation.
    pub origin_message_ref: Option<String>,
    /// Most recent prior category, set iff the entry has been moved.
    pub corrected_from: Option<Category>,
}

/// State-changing operation kinds recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOp {
    Create,
    Move,
    Delete,
}

impl fmt::Display for AuditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOp::Create => write!(f, "create"),
            AuditOp::Move => write!(f, "move"),
            AuditOp::Delete => write!(f, "delete"),
        }
    }
}

/// Append-only audit record, one per create/move/delete.
///
/// Delete records keep the entry's last category and text so deletions stay
/// reconstructible after the live entry is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub operation: AuditOp,
    pub entry_id: Ulid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_before: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_after: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub session_key: String,
}

/// Message author roles in a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}
