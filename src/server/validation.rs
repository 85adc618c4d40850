use crate::server::response::ApiError;

const MAX_USERNAME_LEN: usize = 64;
const MAX_EMAIL_LEN: usize = 254;

/// Top-level route segments that cannot double as a username namespace.
const RESERVED_USERNAMES: &[&str] = &[
    "api",
    "health",
    "register",
    "login",
    "logout",
    "history",
    "create_link",
    "update_url",
    "toggle_status",
    "delete_link",
    "bulk_toggle_status",
    "bulk_delete",
    "download_qr",
    "qr_image",
    "bulk_qr_download",
    "password_check",
];

fn is_valid_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn validate_name(name: &str, entity: &str, max_len: usize) -> Result<(), String> {
    if name.is_empty() {
        return Err(format!("{entity} cannot be empty"));
    }
    if name.len() > max_len {
        return Err(format!("{entity} cannot exceed {max_len} characters"));
    }
    if !name.chars().all(is_valid_name_char) {
        return Err(format!(
            "{entity} can only contain alphanumeric characters, hyphens, and underscores"
        ));
    }
    if name.starts_with('-') || name.starts_with('_') {
        return Err(format!("{entity} cannot start with a hyphen or underscore"));
    }
    Ok(())
}

pub fn validate_username(name: &str) -> Result<(), ApiError> {
    validate_name(name, "Username", MAX_USERNAME_LEN).map_err(ApiError::bad_request)?;
    if RESERVED_USERNAMES
        .iter()
        .any(|r| r.eq_ignore_ascii_case(name))
    {
        return Err(ApiError::bad_request(format!(
            "Username '{name}' is reserved"
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::bad_request(format!(
            "Email cannot exceed {MAX_EMAIL_LEN} characters"
        )));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ApiError::bad_request("Please enter a valid email address")),
    }
}

pub fn validate_account_password(password: &str, min_len: usize) -> Result<(), ApiError> {
    if password.chars().count() < min_len {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {min_len} characters long"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_valid() {
        assert!(validate_username("alice").is_ok());
        assert!(validate_username("alice-2").is_ok());
        assert!(validate_username("a_b").is_ok());
    }

    #[test]
    fn test_username_invalid() {
        assert!(validate_username("").is_err());
        assert!(validate_username("-alice").is_err());
        assert!(validate_username("_alice").is_err());
        assert!(validate_username("al/ice").is_err());
        assert!(validate_username("al ice").is_err());
        assert!(validate_username(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_username_reserved() {
        assert!(validate_username("api").is_err());
        assert!(validate_username("Login").is_err());
        assert!(validate_username("password_check").is_err());
        assert!(validate_username("bulk_qr_download").is_err());
    }

    #[test]
    fn test_email() {
        assert!(validate_email("alice@example.com").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("alice").is_err());
        assert!(validate_email("@example.com").is_err());
    }

    #[test]
    fn test_account_password() {
        assert!(validate_account_password("secret", 6).is_ok());
        assert!(validate_account_password("short", 6).is_err());
    }
}
