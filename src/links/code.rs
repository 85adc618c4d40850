use rand::Rng;
use rand::distributions::Alphanumeric;

use crate::config::LinkPolicy;
use crate::error::{Error, Result};
use crate::store::Store;

const MAX_CUSTOM_CODE_LEN: usize = 64;

/// Joins a username and a code into the stored, globally unique form.
#[must_use]
pub fn namespaced(username: &str, code: &str) -> String {
    format!("{username}/{code}")
}

/// Trims and lowercases a user-supplied code, then checks its format.
pub fn normalize_custom_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_ascii_lowercase();

    if code.is_empty() {
        return Err(Error::InvalidCode("short code cannot be empty".to_string()));
    }
    if code.len() > MAX_CUSTOM_CODE_LEN {
        return Err(Error::InvalidCode(format!(
            "short code cannot exceed {MAX_CUSTOM_CODE_LEN} characters"
        )));
    }
    if !code
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::InvalidCode(
            "short code can only contain letters, digits, hyphens, and underscores".to_string(),
        ));
    }
    if code.starts_with('-') || code.starts_with('_') {
        return Err(Error::InvalidCode(
            "short code cannot start with a hyphen or underscore".to_string(),
        ));
    }

    Ok(code)
}

/// Picks short codes that are free in the store at the time of the check.
///
/// The check is advisory: two requests can still race for the same code, and
/// the unique constraint on insert settles it.
pub struct ShortCodeAllocator {
    length: usize,
    max_attempts: u32,
}

impl ShortCodeAllocator {
    #[must_use]
    pub fn new(policy: &LinkPolicy) -> Self {
        Self {
            length: policy.code_length,
            max_attempts: policy.max_code_attempts,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn random_code(&self) -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(self.length)
            .map(char::from)
            .collect()
    }

    /// Returns a namespaced code (`username/code`) not yet present in the store.
    pub fn allocate(
        &self,
        store: &dyn Store,
        username: &str,
        custom_code: Option<&str>,
    ) -> Result<String> {
        if let Some(raw) = custom_code {
            let short_code = namespaced(username, &normalize_custom_code(raw)?);
            if store.short_code_exists(&short_code)? {
                return Err(Error::ShortCodeTaken);
            }
            return Ok(short_code);
        }

        for attempt in 1..=self.max_attempts {
            let short_code = namespaced(username, &self.random_code());
            if !store.short_code_exists(&short_code)? {
                return Ok(short_code);
            }
            tracing::debug!("Short code collision on attempt {attempt}: {short_code}");
        }

        Err(Error::CollisionExhausted(self.max_attempts))
    }
}
