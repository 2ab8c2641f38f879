//! Persistence for sessions and the user accounts they belong to.

pub mod memory_session_store;
pub mod pg_session_store;
pub mod session_store;
pub mod user;

pub use memory_session_store::InMemorySessionStore;
pub use pg_session_store::PgSessionStore;
pub use session_store::{SessionStore, StoreError};
pub use user::{PgUserDirectory, UserDirectory};
