//! Session storage backends.

pub mod memory;
pub mod postgres;
pub mod session_store;

use std::sync::Arc;

pub use memory::InMemorySessionStore;
pub use postgres::PgSessionStore;
pub use session_store::{SessionStore, StoreSettings};

use crate::{
    config::{Config, StoreBackend},
    db::connection::{create_pool, run_migrations},
    utils::time::Clock,
};

/// Builds the store selected by `STORE_BACKEND`.
pub async fn build_store(
    config: &Config,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<Arc<dyn SessionStore>> {
    let settings = StoreSettings::from_config(config);
    let store: Arc<dyn SessionStore> = match config.store_backend {
        StoreBackend::Memory => {
            tracing::info!(max_history = settings.max_history, "Using in-memory session store");
            Arc::new(InMemorySessionStore::new(settings).with_clock(clock))
        }
        StoreBackend::Postgres => {
            let pool = create_pool(config).await?;
            run_migrations(&pool).await?;
            tracing::info!(max_history = settings.max_history, "Using PostgreSQL session store");
            Arc::new(PgSessionStore::new(pool, settings).with_clock(clock))
        }
    };
    Ok(store)
}
