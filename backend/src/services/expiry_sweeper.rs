use chrono::Duration;
use std::sync::Arc;
use tokio::{
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};

use crate::{
    config::Config,
    error::StoreError,
    repositories::SessionStore,
    utils::time::Clock,
};

/// Runs one expiry pass and logs the outcome.
pub async fn sweep_once(
    store: &dyn SessionStore,
    clock: &dyn Clock,
    lifetime: Duration,
) -> Result<u64, StoreError> {
    let now = clock.now();
    let deleted = store.expire_sessions(now, lifetime).await?;
    if deleted > 0 {
        tracing::info!(
            deleted,
            lifetime_hours = lifetime.num_hours(),
            "Expired sessions cleaned up"
        );
    } else {
        tracing::debug!(lifetime_hours = lifetime.num_hours(), "No expired sessions");
    }
    Ok(deleted)
}

/// Spawns a task that sweeps expired sessions every `every`. The first pass
/// runs one interval after start. Failed passes are logged and the task
/// keeps going.
pub fn spawn_expiry_sweeper(
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    lifetime: Duration,
    every: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = sweep_once(store.as_ref(), clock.as_ref(), lifetime).await {
                tracing::error!(error = ?err, "Session expiry sweep failed");
            }
        }
    })
}

/// Starts the sweeper when both a lifetime and a sweep interval are configured.
pub fn spawn_from_config(
    config: &Config,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
) -> Option<JoinHandle<()>> {
    let Some(lifetime) = config.session_lifetime() else {
        tracing::info!("Session lifetime is unbounded, expiry sweeper disabled");
        return None;
    };
    let Some(every) = config.sweep_interval() else {
        tracing::info!("SESSION_SWEEP_INTERVAL_MINUTES=0, expiry sweeper disabled");
        return None;
    };
    tracing::info!(
        lifetime_hours = lifetime.num_hours(),
        interval_minutes = config.sweep_interval_minutes,
        "Starting session expiry sweeper"
    );
    Some(spawn_expiry_sweeper(store, clock, lifetime, every))
}
