use std::{sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::services::SessionManager;

/// Periodically deletes expired session records. Returns `None` when
/// `interval_seconds` is zero.
pub fn spawn_session_reaper(
    sessions: Arc<SessionManager>,
    interval_seconds: u64,
) -> Option<JoinHandle<()>> {
    if interval_seconds == 0 {
        tracing::info!("Session reaper disabled");
        return None;
    }

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = sessions.purge_expired().await {
                tracing::warn!(error = %err, "Session reaper run failed");
            }
        }
    });
    tracing::info!(interval_seconds, "Session reaper started");
    Some(handle)
}
