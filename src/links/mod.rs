//! Short-link domain logic: code allocation, destination validation,
//! redirect resolution and click recording.

mod code;
mod destination;
mod recorder;
mod resolver;
mod service;

pub use code::{ShortCodeAllocator, namespaced, normalize_custom_code};
pub use destination::{default_display_name, normalize_url};
pub use recorder::{ClickRecorder, ClickSink};
pub use resolver::{Resolution, Resolver};
pub use service::{
    CreateLink, Expiration, LinkService, LinkUpdate, MAX_EXPIRATION_DAYS, PasswordChange,
};
