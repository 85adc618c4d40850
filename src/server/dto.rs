use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::links::{CreateLink, Expiration, LinkUpdate, PasswordChange};
use crate::types::{Link, User};

#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub name: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Username or email.
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

fn expiration_from(expires_at: Option<DateTime<Utc>>, expires_in_days: Option<u32>) -> Option<Expiration> {
    match (expires_at, expires_in_days) {
        (Some(at), _) => Some(Expiration::At(at)),
        (None, Some(days)) => Some(Expiration::InDays(days)),
        (None, None) => None,
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLinkRequest {
    #[serde(alias = "original_url")]
    pub url: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub custom_code: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_in_days: Option<u32>,
}

impl From<CreateLinkRequest> for CreateLink {
    fn from(req: CreateLinkRequest) -> Self {
        CreateLink {
            expiration: expiration_from(req.expires_at, req.expires_in_days).unwrap_or_default(),
            url: req.url,
            display_name: req.display_name,
            custom_code: req.custom_code,
            password: req.password,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateUrlRequest {
    pub link_id: i64,
    pub new_url: String,
}

/// Partial update. `expires_in_days: 0` clears the expiration and an empty
/// `password` removes protection.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateLinkRequest {
    #[serde(default, alias = "url")]
    pub original_url: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub expires_in_days: Option<u32>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl From<UpdateLinkRequest> for LinkUpdate {
    fn from(req: UpdateLinkRequest) -> Self {
        let password = req.password.map(|p| {
            if p.trim().is_empty() {
                PasswordChange::Clear
            } else {
                PasswordChange::Set(p)
            }
        });
        LinkUpdate {
            expiration: expiration_from(req.expires_at, req.expires_in_days),
            original_url: req.original_url,
            display_name: req.display_name,
            password,
            is_active: req.is_active,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BulkToggleRequest {
    pub link_ids: Vec<i64>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct BulkDeleteRequest {
    pub link_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct BulkQrRequest {
    pub link_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkToggleResponse {
    pub updated_count: usize,
}

#[derive(Debug, Serialize)]
pub struct BulkDeleteResponse {
    pub deleted_count: usize,
}

#[derive(Debug, Deserialize)]
pub struct ListLinksParams {
    #[serde(default)]
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LinkResponse {
    #[serde(flatten)]
    pub link: Link,
    pub has_password: bool,
    pub is_expired: bool,
    pub short_url: String,
    pub qr_url: String,
}

impl LinkResponse {
    #[must_use]
    pub fn new(link: Link, base_url: &str) -> Self {
        Self {
            has_password: link.has_password(),
            is_expired: link.is_expired_at(Utc::now()),
            short_url: format!("{base_url}/{}", link.short_code),
            qr_url: format!("{base_url}/qr_image/{}", link.id),
            link,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialParams {
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PasswordRequiredResponse {
    pub short_code: String,
    pub display_name: String,
    pub password_required: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_request_expiration() {
        let req: CreateLinkRequest =
            serde_json::from_str(r#"{"url":"a.com","expires_in_days":7}"#).unwrap();
        assert_eq!(CreateLink::from(req).expiration, Expiration::InDays(7));

        let req: CreateLinkRequest = serde_json::from_str(r#"{"original_url":"a.com"}"#).unwrap();
        assert_eq!(CreateLink::from(req).expiration, Expiration::Never);
    }

    #[test]
    fn test_update_request_password() {
        let req: UpdateLinkRequest = serde_json::from_str(r#"{"password":""}"#).unwrap();
        assert_eq!(LinkUpdate::from(req).password, Some(PasswordChange::Clear));

        let req: UpdateLinkRequest = serde_json::from_str(r#"{"password":"secret1"}"#).unwrap();
        assert_eq!(
            LinkUpdate::from(req).password,
            Some(PasswordChange::Set("secret1".to_string()))
        );

        let req: UpdateLinkRequest = serde_json::from_str("{}").unwrap();
        let update = LinkUpdate::from(req);
        assert!(update.password.is_none());
        assert!(update.expiration.is_none());
    }

    #[test]
    fn test_login_accepts_username_or_email() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"username":"alice","password":"pw"}"#).unwrap();
        assert_eq!(req.login, "alice");
        let req: LoginRequest =
            serde_json::from_str(r#"{"email":"a@b.c","password":"pw"}"#).unwrap();
        assert_eq!(req.login, "a@b.c");
    }
}
