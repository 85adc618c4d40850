mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

/// Store defines the database interface.
///
/// Link operations that take an `owner_id` only ever touch rows owned by that
/// user; a link owned by someone else behaves exactly like a missing one.
pub trait Store: Send + Sync {
    fn initialize(&self) -> Result<()>;

    // User operations
    fn create_user(&self, user: &NewUser) -> Result<User>;
    fn get_user(&self, id: i64) -> Result<Option<User>>;
    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;
    /// Matches either the username or the email address.
    fn get_user_by_login(&self, username_or_email: &str) -> Result<Option<User>>;
    fn update_user_password(&self, id: i64, password_hash: &str) -> Result<()>;

    // Token operations
    fn create_token(&self, token: &Token) -> Result<()>;
    fn get_token_by_lookup(&self, lookup: &str) -> Result<Option<Token>>;
    fn delete_token(&self, id: &str) -> Result<bool>;
    fn update_token_last_used(&self, id: &str) -> Result<()>;

    // Link operations
    fn create_link(&self, link: &NewLink) -> Result<Link>;
    fn get_link_for_owner(&self, owner_id: i64, id: i64) -> Result<Option<Link>>;
    fn get_link_by_short_code(&self, short_code: &str) -> Result<Option<Link>>;
    fn short_code_exists(&self, short_code: &str) -> Result<bool>;
    fn list_links(&self, owner_id: i64, search: Option<&str>) -> Result<Vec<Link>>;
    fn count_links(&self, owner_id: i64) -> Result<i64>;
    /// Persists the mutable fields of `link`. The short code is never written.
    fn update_link(&self, owner_id: i64, link: &Link) -> Result<()>;
    /// Returns the number of links whose state actually changed.
    fn set_links_active(&self, owner_id: i64, ids: &[i64], is_active: bool) -> Result<usize>;
    fn delete_links(&self, owner_id: i64, ids: &[i64]) -> Result<usize>;

    // Click operations
    fn record_click(&self, link_id: i64, info: &ClickInfo, at: DateTime<Utc>) -> Result<()>;
    fn list_link_clicks(&self, link_id: i64) -> Result<Vec<Click>>;
    fn list_recent_clicks(&self, owner_id: i64, limit: i64) -> Result<Vec<ClickHistoryEntry>>;
}
