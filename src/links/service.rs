use chrono::{DateTime, Duration, Utc};

use super::code::ShortCodeAllocator;
use super::destination::{default_display_name, normalize_url};
use crate::auth::SecretHasher;
use crate::config::LinkPolicy;
use crate::error::{Error, Result};
use crate::store::Store;
use crate::types::{Link, LinkStats, NewLink, User};

/// Longest relative expiration accepted from a request.
pub const MAX_EXPIRATION_DAYS: u32 = 3650;

/// When a link stops resolving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expiration {
    #[default]
    Never,
    InDays(u32),
    At(DateTime<Utc>),
}

impl Expiration {
    pub fn resolve(self, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
        match self {
            Expiration::Never | Expiration::InDays(0) => Ok(None),
            Expiration::InDays(days) if days > MAX_EXPIRATION_DAYS => Err(Error::BadRequest(
                format!("Expiration cannot exceed {MAX_EXPIRATION_DAYS} days"),
            )),
            Expiration::InDays(days) => now
                .checked_add_signed(Duration::days(i64::from(days)))
                .map(Some)
                .ok_or_else(|| Error::BadRequest("Invalid expiration".to_string())),
            Expiration::At(at) => Ok(Some(at)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateLink {
    pub url: String,
    pub display_name: Option<String>,
    pub custom_code: Option<String>,
    pub password: Option<String>,
    pub expiration: Expiration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordChange {
    Set(String),
    Clear,
}

#[derive(Debug, Clone, Default)]
pub struct LinkUpdate {
    pub original_url: Option<String>,
    pub display_name: Option<String>,
    pub expiration: Option<Expiration>,
    pub password: Option<PasswordChange>,
    pub is_active: Option<bool>,
}

/// Owner-scoped link operations on top of the store.
pub struct LinkService<'a> {
    store: &'a dyn Store,
    policy: &'a LinkPolicy,
    hasher: &'a SecretHasher,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl<'a> LinkService<'a> {
    pub fn new(store: &'a dyn Store, policy: &'a LinkPolicy, hasher: &'a SecretHasher) -> Self {
        Self {
            store,
            policy,
            hasher,
        }
    }

    fn hash_link_password(&self, password: &str) -> Result<String> {
        let len = password.chars().count();
        if len < self.policy.min_link_password_len || len > self.policy.max_link_password_len {
            return Err(Error::BadRequest(format!(
                "Password must be {}-{} characters long",
                self.policy.min_link_password_len, self.policy.max_link_password_len
            )));
        }
        self.hasher.hash(password)
    }

    pub fn create(&self, owner: &User, req: CreateLink) -> Result<Link> {
        let original_url = normalize_url(&req.url)?;

        let display_name = non_empty(req.display_name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| default_display_name(&original_url));

        let password_hash = non_empty(req.password.as_deref())
            .map(|p| self.hash_link_password(p))
            .transpose()?;

        if self.store.count_links(owner.id)? >= self.policy.max_links_per_user {
            return Err(Error::Conflict(format!(
                "Link limit of {} reached",
                self.policy.max_links_per_user
            )));
        }

        let expiration_date = req.expiration.resolve(Utc::now())?;
        let custom_code = non_empty(req.custom_code.as_deref());
        let allocator = ShortCodeAllocator::new(self.policy);

        // A custom code gets one shot; generated codes retry when another
        // writer claims the same code between the check and the insert.
        let attempts = if custom_code.is_some() {
            1
        } else {
            allocator.max_attempts()
        };

        for _ in 0..attempts {
            let short_code = allocator.allocate(self.store, &owner.username, custom_code)?;
            let new_link = NewLink {
                user_id: owner.id,
                original_url: original_url.clone(),
                short_code,
                display_name: display_name.clone(),
                password_hash: password_hash.clone(),
                expiration_date,
            };

            match self.store.create_link(&new_link) {
                Ok(link) => {
                    tracing::info!("User {} created link {}", owner.username, link.short_code);
                    return Ok(link);
                }
                Err(Error::ShortCodeTaken) if custom_code.is_none() => {
                    tracing::debug!("Insert lost race for {}", new_link.short_code);
                }
                Err(e) => return Err(e),
            }
        }

        if custom_code.is_some() {
            Err(Error::ShortCodeTaken)
        } else {
            Err(Error::CollisionExhausted(allocator.max_attempts()))
        }
    }

    pub fn get(&self, owner: &User, link_id: i64) -> Result<Link> {
        self.store
            .get_link_for_owner(owner.id, link_id)?
            .ok_or(Error::NotFound)
    }

    /// Applies `update` to one of the owner's links. The short code is never changed.
    pub fn update(&self, owner: &User, link_id: i64, update: LinkUpdate) -> Result<Link> {
        let mut link = self.get(owner, link_id)?;

        if let Some(url) = update.original_url {
            link.original_url = normalize_url(&url)?;
        }
        if let Some(name) = update.display_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(Error::BadRequest("Display name cannot be empty".to_string()));
            }
            link.display_name = name.to_string();
        }
        if let Some(expiration) = update.expiration {
            link.expiration_date = expiration.resolve(Utc::now())?;
        }
        match update.password {
            Some(PasswordChange::Set(password)) => {
                link.password_hash = Some(self.hash_link_password(password.trim())?);
            }
            Some(PasswordChange::Clear) => link.password_hash = None,
            None => {}
        }
        if let Some(is_active) = update.is_active {
            link.is_active = is_active;
        }

        link.updated_at = Utc::now();
        self.store.update_link(owner.id, &link)?;
        Ok(link)
    }

    pub fn toggle(&self, owner: &User, link_id: i64) -> Result<Link> {
        let mut link = self.get(owner, link_id)?;
        link.is_active = !link.is_active;
        self.store
            .set_links_active(owner.id, &[link.id], link.is_active)?;
        Ok(link)
    }

    /// Sets every listed link to `is_active`, or flips each one when `None`.
    /// Ids the owner does not own are skipped. Returns the number changed.
    pub fn bulk_set_active(
        &self,
        owner: &User,
        link_ids: &[i64],
        is_active: Option<bool>,
    ) -> Result<usize> {
        if let Some(target) = is_active {
            return self.store.set_links_active(owner.id, link_ids, target);
        }

        let (active, inactive): (Vec<Link>, Vec<Link>) = self
            .store
            .list_links(owner.id, None)?
            .into_iter()
            .filter(|l| link_ids.contains(&l.id))
            .partition(|l| l.is_active);

        let active_ids: Vec<i64> = active.iter().map(|l| l.id).collect();
        let inactive_ids: Vec<i64> = inactive.iter().map(|l| l.id).collect();

        let mut changed = self.store.set_links_active(owner.id, &active_ids, false)?;
        changed += self.store.set_links_active(owner.id, &inactive_ids, true)?;
        Ok(changed)
    }

    pub fn delete(&self, owner: &User, link_id: i64) -> Result<()> {
        if self.store.delete_links(owner.id, &[link_id])? == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    pub fn bulk_delete(&self, owner: &User, link_ids: &[i64]) -> Result<usize> {
        let deleted = self.store.delete_links(owner.id, link_ids)?;
        tracing::info!("User {} deleted {deleted} links", owner.username);
        Ok(deleted)
    }

    pub fn stats(&self, owner: &User) -> Result<LinkStats> {
        let now = Utc::now();
        let links = self.store.list_links(owner.id, None)?;

        Ok(LinkStats {
            total_links: links.len() as i64,
            total_clicks: links.iter().map(|l| l.clicks).sum(),
            active_links: links.iter().filter(|l| l.is_active).count() as i64,
            expired_links: links.iter().filter(|l| l.is_expired_at(now)).count() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::links::{Resolution, Resolver};
    use crate::store::SqliteStore;
    use crate::types::{ClickInfo, NewUser};
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        store: SqliteStore,
        policy: LinkPolicy,
        hasher: SecretHasher,
        alice: User,
        bob: User,
    }

    impl Fixture {
        fn new() -> Self {
            Self::with_policy(LinkPolicy::default())
        }

        fn with_policy(policy: LinkPolicy) -> Self {
            let temp = TempDir::new().unwrap();
            let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
            store.initialize().unwrap();
            let create_user = |name: &str| {
                store
                    .create_user(&NewUser {
                        username: name.to_string(),
                        email: format!("{name}@example.com"),
                        password_hash: "hash".to_string(),
                    })
                    .unwrap()
            };
            let alice = create_user("alice");
            let bob = create_user("bob");
            Self {
                _temp: temp,
                store,
                policy,
                hasher: SecretHasher::new(),
                alice,
                bob,
            }
        }

        fn service(&self) -> LinkService<'_> {
            LinkService::new(&self.store, &self.policy, &self.hasher)
        }

        fn resolve(&self, code: &str, credential: Option<&str>) -> Resolution {
            Resolver::new(&self.store, &self.hasher)
                .resolve("alice", code, credential, Utc::now())
                .unwrap()
        }
    }

    fn create(url: &str, code: Option<&str>) -> CreateLink {
        CreateLink {
            url: url.to_string(),
            custom_code: code.map(str::to_string),
            ..CreateLink::default()
        }
    }

    fn destination(resolution: Resolution) -> String {
        match resolution {
            Resolution::Redirect { destination, .. } => destination,
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_dynamic_link_scenario() {
        let fx = Fixture::new();
        let svc = fx.service();

        let link = svc
            .create(&fx.alice, create("https://a.com/v1", Some("resume")))
            .unwrap();
        assert_eq!(link.short_code, "alice/resume");
        assert_eq!(destination(fx.resolve("resume", None)), "https://a.com/v1");

        let updated = svc
            .update(
                &fx.alice,
                link.id,
                LinkUpdate {
                    original_url: Some("https://a.com/v2".to_string()),
                    ..LinkUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.short_code, "alice/resume");
        assert_eq!(destination(fx.resolve("resume", None)), "https://a.com/v2");
    }

    #[test]
    fn test_create_defaults() {
        let fx = Fixture::new();
        let link = fx
            .service()
            .create(&fx.alice, create("www.example.com/page", None))
            .unwrap();

        assert_eq!(link.original_url, "https://www.example.com/page");
        assert_eq!(link.display_name, "example.com");
        assert!(link.short_code.starts_with("alice/"));
        assert!(link.password_hash.is_none());
        assert!(link.expiration_date.is_none());
    }

    #[test]
    fn test_create_rejects_invalid_input() {
        let fx = Fixture::new();
        let svc = fx.service();

        assert!(matches!(
            svc.create(&fx.alice, create("", None)),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            svc.create(&fx.alice, create("https://a.com", Some("no/slashes"))),
            Err(Error::InvalidCode(_))
        ));

        let short_password = CreateLink {
            password: Some("abc".to_string()),
            ..create("https://a.com", None)
        };
        assert!(matches!(
            svc.create(&fx.alice, short_password),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_custom_code_collision_is_reported() {
        let fx = Fixture::new();
        let svc = fx.service();

        svc.create(&fx.alice, create("https://a.com", Some("docs")))
            .unwrap();
        assert!(matches!(
            svc.create(&fx.alice, create("https://b.com", Some("DOCS"))),
            Err(Error::ShortCodeTaken)
        ));
    }

    #[test]
    fn test_same_code_in_different_namespaces() {
        let fx = Fixture::new();
        let svc = fx.service();

        let a = svc
            .create(&fx.alice, create("https://a.com", Some("resume")))
            .unwrap();
        let b = svc
            .create(&fx.bob, create("https://b.com", Some("resume")))
            .unwrap();
        assert_eq!(a.short_code, "alice/resume");
        assert_eq!(b.short_code, "bob/resume");
    }

    #[test]
    fn test_generated_codes_are_unique() {
        let fx = Fixture::with_policy(LinkPolicy {
            code_length: 2,
            ..LinkPolicy::default()
        });
        let svc = fx.service();

        let codes: HashSet<String> = (0..50)
            .map(|_| {
                svc.create(&fx.alice, create("https://a.com", None))
                    .unwrap()
                    .short_code
            })
            .collect();
        assert_eq!(codes.len(), 50);
    }

    #[test]
    fn test_link_limit() {
        let fx = Fixture::with_policy(LinkPolicy {
            max_links_per_user: 1,
            ..LinkPolicy::default()
        });
        let svc = fx.service();

        svc.create(&fx.alice, create("https://a.com", None)).unwrap();
        assert!(matches!(
            svc.create(&fx.alice, create("https://a.com", None)),
            Err(Error::Conflict(_))
        ));
    }

    #[test]
    fn test_expired_scenario() {
        let fx = Fixture::new();
        let req = CreateLink {
            expiration: Expiration::At(Utc::now() - Duration::seconds(1)),
            ..create("https://a.com", Some("gone"))
        };
        fx.service().create(&fx.alice, req).unwrap();

        assert_eq!(fx.resolve("gone", None), Resolution::NotFound);
    }

    #[test]
    fn test_password_scenario() {
        let fx = Fixture::new();
        let req = CreateLink {
            password: Some("secret1".to_string()),
            ..create("https://a.com/private", Some("vault"))
        };
        fx.service().create(&fx.alice, req).unwrap();

        assert!(matches!(
            fx.resolve("vault", None),
            Resolution::PasswordRequired { .. }
        ));
        assert_eq!(
            destination(fx.resolve("vault", Some("secret1"))),
            "https://a.com/private"
        );
        assert!(matches!(
            fx.resolve("vault", Some("wrong")),
            Resolution::PasswordRequired { .. }
        ));
    }

    #[test]
    fn test_update_password_and_expiration() {
        let fx = Fixture::new();
        let svc = fx.service();
        let link = svc
            .create(&fx.alice, create("https://a.com", Some("x")))
            .unwrap();

        svc.update(
            &fx.alice,
            link.id,
            LinkUpdate {
                password: Some(PasswordChange::Set("secret1".to_string())),
                expiration: Some(Expiration::InDays(7)),
                ..LinkUpdate::default()
            },
        )
        .unwrap();
        assert!(matches!(
            fx.resolve("x", None),
            Resolution::PasswordRequired { .. }
        ));

        let cleared = svc
            .update(
                &fx.alice,
                link.id,
                LinkUpdate {
                    password: Some(PasswordChange::Clear),
                    expiration: Some(Expiration::Never),
                    ..LinkUpdate::default()
                },
            )
            .unwrap();
        assert!(cleared.expiration_date.is_none());
        assert!(matches!(fx.resolve("x", None), Resolution::Redirect { .. }));
    }

    #[test]
    fn test_non_owner_cannot_touch_link() {
        let fx = Fixture::new();
        let svc = fx.service();
        let link = svc
            .create(&fx.alice, create("https://a.com", Some("mine")))
            .unwrap();

        assert!(matches!(svc.get(&fx.bob, link.id), Err(Error::NotFound)));
        assert!(matches!(
            svc.update(
                &fx.bob,
                link.id,
                LinkUpdate {
                    original_url: Some("https://evil.example".to_string()),
                    ..LinkUpdate::default()
                }
            ),
            Err(Error::NotFound)
        ));
        assert!(matches!(svc.toggle(&fx.bob, link.id), Err(Error::NotFound)));
        assert!(matches!(svc.delete(&fx.bob, link.id), Err(Error::NotFound)));
        assert_eq!(svc.bulk_delete(&fx.bob, &[link.id]).unwrap(), 0);

        assert_eq!(destination(fx.resolve("mine", None)), "https://a.com");
    }

    #[test]
    fn test_toggle_and_bulk_active() {
        let fx = Fixture::new();
        let svc = fx.service();
        let a = svc
            .create(&fx.alice, create("https://a.com", Some("a")))
            .unwrap();
        let b = svc
            .create(&fx.alice, create("https://b.com", Some("b")))
            .unwrap();

        assert!(!svc.toggle(&fx.alice, a.id).unwrap().is_active);
        assert_eq!(fx.resolve("a", None), Resolution::NotFound);

        // a is inactive, b is active: flipping both swaps them
        assert_eq!(svc.bulk_set_active(&fx.alice, &[a.id, b.id], None).unwrap(), 2);
        assert!(svc.get(&fx.alice, a.id).unwrap().is_active);
        assert!(!svc.get(&fx.alice, b.id).unwrap().is_active);

        assert_eq!(
            svc.bulk_set_active(&fx.alice, &[a.id, b.id], Some(true)).unwrap(),
            1
        );
        assert!(svc.get(&fx.alice, b.id).unwrap().is_active);
    }

    #[test]
    fn test_stats() {
        let fx = Fixture::new();
        let svc = fx.service();
        let a = svc
            .create(&fx.alice, create("https://a.com", Some("a")))
            .unwrap();
        let b = svc
            .create(&fx.alice, create("https://b.com", Some("b")))
            .unwrap();
        svc.create(
            &fx.alice,
            CreateLink {
                expiration: Expiration::At(Utc::now() - Duration::hours(1)),
                ..create("https://c.com", Some("c"))
            },
        )
        .unwrap();

        fx.store
            .record_click(a.id, &ClickInfo::default(), Utc::now())
            .unwrap();
        fx.store
            .record_click(a.id, &ClickInfo::default(), Utc::now())
            .unwrap();
        svc.toggle(&fx.alice, b.id).unwrap();

        assert_eq!(
            svc.stats(&fx.alice).unwrap(),
            LinkStats {
                total_links: 3,
                total_clicks: 2,
                active_links: 2,
                expired_links: 1,
            }
        );
    }

    #[test]
    fn test_expiration_resolve() {
        let now = Utc::now();
        assert_eq!(Expiration::Never.resolve(now).unwrap(), None);
        assert_eq!(Expiration::InDays(0).resolve(now).unwrap(), None);
        assert_eq!(
            Expiration::InDays(7).resolve(now).unwrap(),
            Some(now + Duration::days(7))
        );
        assert_eq!(Expiration::At(now).resolve(now).unwrap(), Some(now));
    }

    #[test]
    fn test_expiration_rejects_oversized_days() {
        let now = Utc::now();
        assert!(
            Expiration::InDays(MAX_EXPIRATION_DAYS)
                .resolve(now)
                .unwrap()
                .is_some()
        );
        assert!(matches!(
            Expiration::InDays(MAX_EXPIRATION_DAYS + 1).resolve(now),
            Err(Error::BadRequest(_))
        ));
        assert!(matches!(
            Expiration::InDays(u32::MAX).resolve(now),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_create_and_update_reject_oversized_expiration() {
        let fx = Fixture::new();
        let svc = fx.service();

        let req = CreateLink {
            expiration: Expiration::InDays(u32::MAX),
            ..create("https://a.com", Some("far"))
        };
        assert!(matches!(
            svc.create(&fx.alice, req),
            Err(Error::BadRequest(_))
        ));

        let link = svc
            .create(&fx.alice, create("https://a.com", Some("near")))
            .unwrap();
        assert!(matches!(
            svc.update(
                &fx.alice,
                link.id,
                LinkUpdate {
                    expiration: Some(Expiration::InDays(4_000_000_000)),
                    ..LinkUpdate::default()
                }
            ),
            Err(Error::BadRequest(_))
        ));
        assert!(svc.get(&fx.alice, link.id).unwrap().expiration_date.is_none());
    }

    #[test]
    fn test_bulk_set_active_counts_only_changed_links() {
        let fx = Fixture::new();
        let svc = fx.service();
        let a = svc
            .create(&fx.alice, create("https://a.com", Some("a")))
            .unwrap();
        let b = svc
            .create(&fx.alice, create("https://b.com", Some("b")))
            .unwrap();
        svc.toggle(&fx.alice, b.id).unwrap();

        assert_eq!(
            svc.bulk_set_active(&fx.alice, &[a.id, b.id], Some(true)).unwrap(),
            1
        );
        assert_eq!(
            svc.bulk_set_active(&fx.alice, &[a.id, b.id], Some(true)).unwrap(),
            0
        );
    }
}
