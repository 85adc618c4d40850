mod helpers;
mod middleware;
mod password;
mod token;

pub use helpers::issue_session;
pub use middleware::{AuthError, RequireUser};
pub use password::SecretHasher;
pub use token::{TokenGenerator, parse_token};
