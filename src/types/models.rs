use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Referrer recorded for visits that arrive without a `Referer` header.
pub const DIRECT_REFERRER: &str = "Direct";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// A session credential issued at login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub id: String,
    #[serde(skip)]
    pub token_hash: String,
    #[serde(skip)]
    pub token_lookup: String,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    pub id: i64,
    pub user_id: i64,
    pub original_url: String,
    /// Namespaced code, `username/code`.
    pub short_code: String,
    pub display_name: String,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<DateTime<Utc>>,
    pub clicks: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Link {
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// A link expires at its expiration instant, not one tick after.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|exp| exp <= now)
    }
}

#[derive(Debug, Clone)]
pub struct NewLink {
    pub user_id: i64,
    pub original_url: String,
    pub short_code: String,
    pub display_name: String,
    pub password_hash: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Click {
    pub id: i64,
    pub link_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub referrer: String,
    pub user_agent: String,
    pub clicked_at: DateTime<Utc>,
}

/// Request metadata captured for a single resolved visit.
#[derive(Debug, Clone, Default)]
pub struct ClickInfo {
    pub ip_address: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickHistoryEntry {
    #[serde(flatten)]
    pub click: Click,
    pub short_code: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkStats {
    pub total_links: i64,
    pub total_clicks: i64,
    pub active_links: i64,
    pub expired_links: i64,
}
