//! Session store contract shared by every storage backend.
//!
//! A store owns sharing sessions and their bounded location histories. All
//! mutations of one session are serialized; sessions never block each other
//! beyond a short map-level critical section.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::{
    config::Config,
    error::StoreError,
    models::{
        location::{LocationInput, LocationSample},
        share_session::{is_expired, SessionSummary, ShareSession},
    },
    types::SessionToken,
};

/// Upper bound on token regeneration when a candidate collides with a live
/// session. Reaching it means the generator is broken, not unlucky.
pub const MAX_TOKEN_ATTEMPTS: usize = 16;

/// Capacity and expiry policy applied by a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoreSettings {
    pub max_history: usize,
    /// `None` disables expiry entirely.
    pub lifetime: Option<Duration>,
    /// Check (and delete) expired sessions when they are accessed.
    pub lazy_expiry: bool,
}

impl StoreSettings {
    pub fn new(max_history: usize) -> Self {
        Self {
            max_history: max_history.max(1),
            lifetime: None,
            lazy_expiry: false,
        }
    }

    pub fn with_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_lazy_expiry(mut self, lazy_expiry: bool) -> Self {
        self.lazy_expiry = lazy_expiry;
        self
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_history)
            .with_lifetime(config.session_lifetime())
            .with_lazy_expiry(config.lazy_expiry)
    }

    /// True when an access at `now` must treat the session as gone.
    pub fn expires_on_access(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.lazy_expiry && is_expired(created_at, now, self.lifetime)
    }

    pub fn history_limit(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.max_history)
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Capacity and expiry policy of this store.
    fn settings(&self) -> StoreSettings;

    /// Creates an empty session under a fresh token.
    async fn create_session(&self) -> Result<SessionToken, StoreError>;

    async fn get_session(&self, token: &SessionToken) -> Result<ShareSession, StoreError>;

    /// Validates `input`, stamps it with the current time and appends it,
    /// evicting the oldest sample once the history is over capacity.
    async fn append_location(
        &self,
        token: &SessionToken,
        input: &LocationInput,
    ) -> Result<LocationSample, StoreError>;

    /// `Ok(None)` when the session has not received any location yet.
    async fn get_latest(&self, token: &SessionToken) -> Result<Option<LocationSample>, StoreError>;

    /// Up to `limit` most recent samples, newest first. `None` means
    /// `max_history`.
    async fn get_history(
        &self,
        token: &SessionToken,
        limit: Option<usize>,
    ) -> Result<Vec<LocationSample>, StoreError>;

    /// Live sessions, newest first.
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError>;

    /// Deletes sessions created before `now - lifetime`. Returns how many
    /// were removed.
    async fn expire_sessions(&self, now: DateTime<Utc>, lifetime: Duration)
        -> Result<u64, StoreError>;

    /// Administrative deletion of one session and its samples.
    async fn delete_session(&self, token: &SessionToken) -> Result<(), StoreError>;
}
