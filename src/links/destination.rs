use url::Url;

use crate::error::{Error, Result};

const DEFAULT_DISPLAY_NAME: &str = "Link";

/// Trims a destination URL and prefixes `https://` when no scheme is given.
///
/// The returned string is what gets stored and later redirected to, so it is
/// not re-serialized through the parser.
pub fn normalize_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::BadRequest("URL cannot be empty".to_string()));
    }

    let lower = trimmed.to_ascii_lowercase();
    let candidate = if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else if lower.contains("://") {
        return Err(Error::BadRequest("Only http and https URLs are supported".to_string()));
    } else {
        format!("https://{trimmed}")
    };

    let parsed = Url::parse(&candidate)
        .map_err(|_| Error::BadRequest("Please enter a valid URL".to_string()))?;

    let has_host = parsed.host_str().is_some_and(|h| !h.is_empty());
    if !matches!(parsed.scheme(), "http" | "https") || !has_host {
        return Err(Error::BadRequest("Please enter a valid URL".to_string()));
    }

    Ok(candidate)
}

/// Derives a display name from the destination host, dropping `www.`.
#[must_use]
pub fn default_display_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string())
}
