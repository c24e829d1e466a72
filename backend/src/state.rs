use std::sync::Arc;

use crate::{config::Config, repositories::SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub config: Config,
}

impl AppState {
    pub fn new(store: Arc<dyn SessionStore>, config: Config) -> Self {
        Self { store, config }
    }

    /// Shorthand for handlers that only need the store.
    pub fn store(&self) -> &dyn SessionStore {
        self.store.as_ref()
    }
}
