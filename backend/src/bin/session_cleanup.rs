//! One-shot expiry sweep for deployments that schedule cleanup externally
//! (cron, Kubernetes CronJob) instead of running the in-process sweeper.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use geoshare_backend::{
    config::{Config, StoreBackend},
    repositories::build_store,
    services::sweep_once,
    utils::time::{Clock, SystemClock},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "geoshare_backend=info,session_cleanup=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    if config.store_backend != StoreBackend::Postgres {
        anyhow::bail!("session_cleanup needs STORE_BACKEND=postgres; the in-memory store lives inside the server process");
    }
    let Some(lifetime) = config.session_lifetime() else {
        tracing::info!("Session lifetime is unbounded, nothing to clean up");
        return Ok(());
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = build_store(&config, clock.clone()).await?;
    let deleted = sweep_once(store.as_ref(), clock.as_ref(), lifetime).await?;
    tracing::info!("Deleted {} expired sessions", deleted);

    Ok(())
}
