use std::time::Duration;

use tracing::{info, warn};

use crate::state::{AppState, run_blocking};

/// Sessions untouched for this long are forgotten.
pub const SESSION_MAX_AGE_HOURS: u64 = 24 * 30;

/// Background task that prunes stale login sessions.
pub async fn run_session_cleanup(state: AppState, interval_secs: u64, max_age_hours: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match run_blocking(&state, move |db| db.delete_stale_sessions(max_age_hours)).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: pruned {} stale sessions", count);
                }
            }
            Err(e) => {
                warn!("Session cleanup error: {}", e);
            }
        }
    }
}
