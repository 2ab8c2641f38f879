pub mod auth;
pub mod transport;

pub use auth::{session_guard, CurrentSession, Requirement, SessionAuth, SessionGuard};
pub use transport::{PresentedToken, SessionTransport, TokenChannel};
