//! # LinkForge
//!
//! A self-hostable URL shortener with per-user namespaces (`/{username}/{code}`),
//! dynamic links, password protection, expiration, click analytics and QR codes.
//! Usable both as a standalone binary and as a library.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! linkforge = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use linkforge::config::ServerConfig;
//! use linkforge::links::ClickRecorder;
//! use linkforge::server::{AppState, create_router};
//! use linkforge::store::{SqliteStore, Store};
//!
//! let config = ServerConfig::default();
//! let store = Arc::new(SqliteStore::new(config.db_path()).unwrap());
//! store.initialize().unwrap();
//!
//! let clicks = ClickRecorder::new(store.clone());
//! let state = Arc::new(AppState::new(store, clicks, config));
//! let router = create_router(state);
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `linkforge` binary. Disable with `default-features = false`.

pub mod auth;
pub mod config;
pub mod error;
pub mod links;
pub mod qr;
pub mod server;
pub mod store;
pub mod types;
