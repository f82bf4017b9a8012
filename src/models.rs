use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, fmt, str::FromStr};
use ts_rs::TS;
use uuid::Uuid;

// --- Roles ---

/// Role
///
/// The RBAC field carried by a session. The remote API is not consistent about casing
/// or separators (`HR_MANAGER`, `hr-manager`), so parsing folds case and ignores `-`,
/// `_` and spaces. Roles outside the known set are kept verbatim in `Other` so that
/// dispatch can reject them explicitly instead of failing to parse the identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Role {
    Admin,
    User,
    Lawyer,
    HrManager,
    Other(String),
}

impl Role {
    /// Canonical wire form of the role.
    pub fn as_str(&self) -> &str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Lawyer => "lawyer",
            Role::HrManager => "hr-manager",
            Role::Other(raw) => raw,
        }
    }
}

impl FromStr for Role {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let folded: String = raw
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .map(|c| c.to_ascii_lowercase())
            .collect();

        Ok(match folded.as_str() {
            "admin" => Role::Admin,
            "user" => Role::User,
            "lawyer" => Role::Lawyer,
            "hrmanager" => Role::HrManager,
            _ => Role::Other(raw.trim().to_string()),
        })
    }
}

impl From<String> for Role {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(role) => role,
            Err(never) => match never {},
        }
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Identity ---

/// Identity
///
/// The opaque identity record returned by the identity oracle. Only `role` is
/// interpreted by the core; the rest is handed to the presentation layer untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[ts(type = "string")]
    pub role: Role,
}

// --- Resource Items ---

/// Ticket
///
/// A support ticket as listed by `/tickets/*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Default)]
#[ts(export)]
pub struct Ticket {
    pub id: Uuid,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reporter_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | undefined")]
    pub created_at: Option<DateTime<Utc>>,
}

/// ServiceRequest
///
/// An employee or client request as listed by `/requests/*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Default)]
#[ts(export)]
pub struct ServiceRequest {
    pub id: Uuid,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: String,
    // Free-form category, e.g. "leave" or "equipment".
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub request_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_id: Option<Uuid>,
    // The HR manager handling the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | undefined")]
    pub created_at: Option<DateTime<Utc>>,
}

/// DocumentThread
///
/// A document discussion thread as listed by `/document-threads/*`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, Default)]
#[ts(export)]
pub struct DocumentThread {
    pub id: Uuid,
    #[serde(default)]
    pub document_title: String,
    #[serde(default)]
    pub message_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lawyer_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | undefined")]
    pub last_activity_at: Option<DateTime<Utc>>,
}
