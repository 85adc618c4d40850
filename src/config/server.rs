use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Upper bound for `session_ttl_hours` (one year).
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

/// Limits applied when links are created or updated.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkPolicy {
    /// Length of auto-generated short codes.
    pub code_length: usize,
    /// Attempts before auto-generation gives up with a collision error.
    pub max_code_attempts: u32,
    pub max_links_per_user: i64,
    pub min_link_password_len: usize,
    pub max_link_password_len: usize,
    pub min_account_password_len: usize,
}

impl Default for LinkPolicy {
    fn default() -> Self {
        Self {
            code_length: 6,
            max_code_attempts: 10,
            max_links_per_user: 1000,
            min_link_password_len: 6,
            max_link_password_len: 15,
            min_account_password_len: 6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Public base URL for external access (e.g., "https://sho.rt").
    /// Used for short URLs and QR codes. If not set, URLs are derived from request headers.
    pub public_base_url: Option<String>,
    pub session_ttl_hours: i64,
    pub links: LinkPolicy,
}

impl ServerConfig {
    /// Reads a TOML config file. Missing keys fall back to defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.links.code_length == 0 {
            return Err(Error::Config("links.code_length must be positive".to_string()));
        }
        if self.links.max_code_attempts == 0 {
            return Err(Error::Config(
                "links.max_code_attempts must be positive".to_string(),
            ));
        }
        if self.links.min_link_password_len > self.links.max_link_password_len {
            return Err(Error::Config(
                "links.min_link_password_len exceeds links.max_link_password_len".to_string(),
            ));
        }
        if self.session_ttl_hours <= 0 {
            return Err(Error::Config("session_ttl_hours must be positive".to_string()));
        }
        if self.session_ttl_hours > MAX_SESSION_TTL_HOURS {
            return Err(Error::Config(format!(
                "session_ttl_hours cannot exceed {MAX_SESSION_TTL_HOURS}"
            )));
        }
        if let Some(url) = &self.public_base_url {
            url::Url::parse(url)
                .map_err(|e| Error::Config(format!("public_base_url '{url}': {e}")))?;
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("linkforge.db")
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            public_base_url: None,
            session_ttl_hours: 24,
            links: LinkPolicy::default(),
        }
    }
}
