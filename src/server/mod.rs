mod auth;
pub mod dto;
mod links;
mod qr;
mod redirect;
pub mod response;
mod router;
pub mod validation;

pub use redirect::ClientInfo;
pub use router::{AppState, create_router};
