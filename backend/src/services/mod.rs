pub mod session_cache;
pub mod session_manager;
pub mod session_reaper;

pub use session_cache::{RedisSessionCache, SessionCacheTrait};
pub use session_manager::{SessionError, SessionManager, SweepOutcome};
pub use session_reaper::spawn_session_reaper;
