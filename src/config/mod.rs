mod server;

pub use server::{LinkPolicy, MAX_SESSION_TTL_HOURS, ServerConfig};
