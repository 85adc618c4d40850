use chrono::{DateTime, Utc};

use super::code::namespaced;
use crate::auth::SecretHasher;
use crate::error::Result;
use crate::store::Store;

/// Outcome of resolving a namespaced short code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Redirect {
        link_id: i64,
        destination: String,
    },
    /// The link is live but protected; carries nothing about the destination.
    PasswordRequired {
        short_code: String,
        display_name: String,
    },
    /// Unknown, inactive or expired. Callers must not tell these apart.
    NotFound,
}

pub struct Resolver<'a> {
    store: &'a dyn Store,
    hasher: &'a SecretHasher,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn Store, hasher: &'a SecretHasher) -> Self {
        Self { store, hasher }
    }

    /// Checks run in a fixed order (active, expiration, password) so a dead
    /// link never reveals whether it was protected.
    pub fn resolve(
        &self,
        username: &str,
        code: &str,
        credential: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Resolution> {
        let short_code = namespaced(username, code);

        let Some(link) = self.store.get_link_by_short_code(&short_code)? else {
            return Ok(Resolution::NotFound);
        };

        if !link.is_active {
            tracing::debug!("Link {} is inactive", link.short_code);
            return Ok(Resolution::NotFound);
        }

        if link.is_expired_at(now) {
            tracing::debug!("Link {} has expired", link.short_code);
            return Ok(Resolution::NotFound);
        }

        if let Some(hash) = &link.password_hash {
            let verified = match credential.filter(|c| !c.is_empty()) {
                Some(candidate) => self.hasher.verify(candidate, hash)?,
                None => false,
            };
            if !verified {
                return Ok(Resolution::PasswordRequired {
                    short_code: link.short_code,
                    display_name: link.display_name,
                });
            }
        }

        Ok(Resolution::Redirect {
            link_id: link.id,
            destination: link.original_url,
        })
    }
}
