pub mod models;
pub mod service;
pub mod transport;

pub use models::*;
pub use service::AvatarService;
pub use transport::{AvatarTransport, PendingReply, TransportError};
