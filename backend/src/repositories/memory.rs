//! In-process session store.
//!
//! Sessions live in a token-keyed map of individually locked records. The map
//! lock is only held to look up, insert or remove an entry; all work on a
//! session happens under that session's own lock. Lock order is always
//! record first, then map.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::RwLock;

use crate::{
    error::StoreError,
    models::{
        location::{LocationInput, LocationSample},
        share_session::{is_expired, SessionSummary, ShareSession},
    },
    repositories::session_store::{SessionStore, StoreSettings, MAX_TOKEN_ATTEMPTS},
    types::SessionToken,
    utils::{
        time::{Clock, SystemClock},
        token::{RandomTokenGenerator, TokenGenerator},
    },
};

const INITIAL_HISTORY_CAPACITY: usize = 64;

#[derive(Debug)]
struct SessionRecord {
    created_at: DateTime<Utc>,
    latest: Option<LocationSample>,
    history: VecDeque<LocationSample>,
    /// Set once the record has been unlinked from the map. Writers that
    /// looked the record up before the removal observe this and fail.
    removed: bool,
}

impl SessionRecord {
    fn new(created_at: DateTime<Utc>, max_history: usize) -> Self {
        Self {
            created_at,
            latest: None,
            history: VecDeque::with_capacity(max_history.min(INITIAL_HISTORY_CAPACITY)),
            removed: false,
        }
    }

    fn push(&mut self, sample: LocationSample, max_history: usize) {
        self.history.push_back(sample.clone());
        if self.history.len() > max_history {
            self.history.pop_front();
        }
        self.latest = Some(sample);
    }

    fn snapshot(&self, token: &SessionToken) -> ShareSession {
        ShareSession {
            token: token.clone(),
            created_at: self.created_at,
            latest: self.latest.clone(),
            history: self.history.iter().cloned().collect(),
        }
    }
}

type Slot = Arc<RwLock<SessionRecord>>;

pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionToken, Slot>>,
    settings: StoreSettings,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenGenerator>,
}

impl InMemorySessionStore {
    pub fn new(settings: StoreSettings) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            settings,
            clock: Arc::new(SystemClock),
            tokens: Arc::new(RandomTokenGenerator),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = tokens;
        self
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    async fn slot(&self, token: &SessionToken) -> Result<Slot, StoreError> {
        self.sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// Unlinks `slot` if `should_remove` holds under the record's write lock.
    async fn remove_slot<F>(&self, token: &SessionToken, slot: &Slot, should_remove: F) -> bool
    where
        F: FnOnce(&SessionRecord) -> bool,
    {
        let mut record = slot.write().await;
        if record.removed || !should_remove(&record) {
            return false;
        }
        record.removed = true;
        record.latest = None;
        record.history.clear();

        let mut sessions = self.sessions.write().await;
        if sessions
            .get(token)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            sessions.remove(token);
        }
        true
    }

    /// Deletes the session if it is expired at `now`, as seen by an access.
    async fn expire_on_access(&self, token: &SessionToken, slot: &Slot, now: DateTime<Utc>) {
        let lifetime = self.settings.lifetime;
        if self
            .remove_slot(token, slot, |record| {
                is_expired(record.created_at, now, lifetime)
            })
            .await
        {
            tracing::info!(token = %token, "Expired session removed on access");
        }
    }

    /// Runs `read` against a live session, applying the on-access expiry rule.
    async fn read_live<R, F>(&self, token: &SessionToken, read: F) -> Result<R, StoreError>
    where
        F: FnOnce(&SessionRecord) -> R,
    {
        let slot = self.slot(token).await?;
        let now = self.clock.now();
        {
            let record = slot.read().await;
            if record.removed {
                return Err(StoreError::NotFound);
            }
            if !self.settings.expires_on_access(record.created_at, now) {
                return Ok(read(&record));
            }
        }
        self.expire_on_access(token, &slot, now).await;
        Err(StoreError::NotFound)
    }

    async fn snapshot_slots(&self) -> Vec<(SessionToken, Slot)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(token, slot)| (token.clone(), Arc::clone(slot)))
            .collect()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn settings(&self) -> StoreSettings {
        self.settings
    }

    async fn create_session(&self) -> Result<SessionToken, StoreError> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = self.tokens.generate();
            let mut sessions = self.sessions.write().await;
            if sessions.contains_key(&token) {
                tracing::warn!("Generated session token collided with a live session, retrying");
                continue;
            }
            let record = SessionRecord::new(self.clock.now(), self.settings.max_history);
            sessions.insert(token.clone(), Arc::new(RwLock::new(record)));
            tracing::debug!(token = %token, "Session created");
            return Ok(token);
        }
        Err(StoreError::Backend(anyhow::anyhow!(
            "could not generate a unique session token after {} attempts",
            MAX_TOKEN_ATTEMPTS
        )))
    }

    async fn get_session(&self, token: &SessionToken) -> Result<ShareSession, StoreError> {
        self.read_live(token, |record| record.snapshot(token)).await
    }

    async fn append_location(
        &self,
        token: &SessionToken,
        input: &LocationInput,
    ) -> Result<LocationSample, StoreError> {
        let slot = self.slot(token).await?;
        let now = self.clock.now();
        {
            let mut record = slot.write().await;
            if record.removed {
                return Err(StoreError::NotFound);
            }
            if !self.settings.expires_on_access(record.created_at, now) {
                let sample = input.validate()?.captured_at(now);
                record.push(sample.clone(), self.settings.max_history);
                return Ok(sample);
            }
        }
        self.expire_on_access(token, &slot, now).await;
        Err(StoreError::NotFound)
    }

    async fn get_latest(&self, token: &SessionToken) -> Result<Option<LocationSample>, StoreError> {
        self.read_live(token, |record| record.latest.clone()).await
    }

    async fn get_history(
        &self,
        token: &SessionToken,
        limit: Option<usize>,
    ) -> Result<Vec<LocationSample>, StoreError> {
        let limit = self.settings.history_limit(limit);
        self.read_live(token, |record| {
            record.history.iter().rev().take(limit).cloned().collect()
        })
        .await
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let now = self.clock.now();
        let mut summaries = Vec::new();
        for (token, slot) in self.snapshot_slots().await {
            let record = slot.read().await;
            if record.removed || self.settings.expires_on_access(record.created_at, now) {
                continue;
            }
            summaries.push(SessionSummary {
                token,
                created_at: record.created_at,
                sample_count: record.history.len(),
                has_location: record.latest.is_some(),
            });
        }
        summaries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.token.cmp(&b.token))
        });
        Ok(summaries)
    }

    async fn expire_sessions(
        &self,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<u64, StoreError> {
        let mut deleted = 0u64;
        for (token, slot) in self.snapshot_slots().await {
            let removed = self
                .remove_slot(&token, &slot, |record| {
                    is_expired(record.created_at, now, Some(lifetime))
                })
                .await;
            if removed {
                tracing::debug!(token = %token, "Expired session removed by sweep");
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn delete_session(&self, token: &SessionToken) -> Result<(), StoreError> {
        let slot = self.slot(token).await?;
        if self.remove_slot(token, &slot, |_| true).await {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::location::LocationFix,
        utils::{time::ManualClock, token::ScriptedTokenGenerator},
    };
    use chrono::TimeZone;
    use std::collections::HashSet;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap()
    }

    fn store_with(settings: StoreSettings) -> (InMemorySessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let store = InMemorySessionStore::new(settings).with_clock(clock.clone());
        (store, clock)
    }

    fn fix(lat: f64, lng: f64) -> LocationInput {
        LocationFix::new(lat, lng).into()
    }

    #[tokio::test]
    async fn history_is_bounded_and_evicts_oldest_first() {
        let (store, clock) = store_with(StoreSettings::new(3));
        let token = store.create_session().await.unwrap();

        for i in 0..10 {
            clock.advance(Duration::seconds(1));
            store
                .append_location(&token, &fix(i as f64, 0.0))
                .await
                .unwrap();
            let session = store.get_session(&token).await.unwrap();
            assert!(session.history.len() <= 3);
            let expected_oldest = (i as i64 - 2).max(0) as f64;
            assert_eq!(session.history[0].lat, expected_oldest);
        }

        let history = store.get_history(&token, None).await.unwrap();
        let lats: Vec<f64> = history.iter().map(|s| s.lat).collect();
        assert_eq!(lats, vec![9.0, 8.0, 7.0]);
    }

    #[tokio::test]
    async fn latest_matches_last_append_with_store_timestamp() {
        let (store, clock) = store_with(StoreSettings::new(10));
        let token = store.create_session().await.unwrap();
        assert_eq!(store.get_latest(&token).await.unwrap(), None);

        clock.advance(Duration::minutes(5));
        let mut input = LocationFix::new(37.56, 126.97);
        input.accuracy = Some(12.0);
        input.speed = Some(0.4);
        store.append_location(&token, &input.into()).await.unwrap();

        let latest = store.get_latest(&token).await.unwrap().expect("latest");
        assert_eq!(latest.lat, 37.56);
        assert_eq!(latest.lng, 126.97);
        assert_eq!(latest.accuracy, Some(12.0));
        assert_eq!(latest.heading, None);
        assert_eq!(latest.speed, Some(0.4));
        assert_eq!(latest.captured_at, start() + Duration::minutes(5));
    }

    #[tokio::test]
    async fn invalid_input_leaves_history_untouched() {
        let (store, _) = store_with(StoreSettings::new(10));
        let token = store.create_session().await.unwrap();
        store.append_location(&token, &fix(1.0, 1.0)).await.unwrap();

        let missing_lng = LocationInput {
            lat: Some(serde_json::json!(2.0)),
            ..LocationInput::default()
        };
        let err = store
            .append_location(&token, &missing_lng)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidInput(_)));

        let session = store.get_session(&token).await.unwrap();
        assert_eq!(session.history.len(), 1);
        assert_eq!(session.latest.unwrap().lat, 1.0);
    }

    #[tokio::test]
    async fn unknown_tokens_are_not_found_everywhere() {
        let (store, _) = store_with(StoreSettings::new(10));
        let token = SessionToken::from("never-created");
        assert!(matches!(
            store.get_session(&token).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_latest(&token).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.get_history(&token, Some(5)).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.append_location(&token, &fix(1.0, 1.0)).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.delete_session(&token).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn history_limit_truncates_newest_first() {
        let (store, _) = store_with(StoreSettings::new(2));
        let token = store.create_session().await.unwrap();
        for lat in [1.0, 2.0, 3.0] {
            store.append_location(&token, &fix(lat, 0.0)).await.unwrap();
        }

        let history = store.get_history(&token, Some(10)).await.unwrap();
        let lats: Vec<f64> = history.iter().map(|s| s.lat).collect();
        assert_eq!(lats, vec![3.0, 2.0]);

        let one = store.get_history(&token, Some(1)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].lat, 3.0);
        assert!(store.get_history(&token, Some(0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expire_sessions_removes_only_old_sessions_and_is_idempotent() {
        let (store, clock) = store_with(StoreSettings::new(10));
        let old = store.create_session().await.unwrap();
        store.append_location(&old, &fix(1.0, 1.0)).await.unwrap();
        clock.advance(Duration::hours(10));
        let fresh = store.create_session().await.unwrap();

        let now = start() + Duration::hours(25);
        let lifetime = Duration::hours(24);
        assert_eq!(store.expire_sessions(now, lifetime).await.unwrap(), 1);
        assert_eq!(store.expire_sessions(now, lifetime).await.unwrap(), 0);

        assert!(matches!(
            store.get_session(&old).await,
            Err(StoreError::NotFound)
        ));
        assert!(store.get_session(&fresh).await.is_ok());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn session_expired_one_second_past_lifetime_is_gone() {
        let (store, _) = store_with(StoreSettings::new(10));
        let token = store.create_session().await.unwrap();
        let created_at = store.get_session(&token).await.unwrap().created_at;
        let lifetime = Duration::hours(24);

        let removed = store
            .expire_sessions(created_at + lifetime + Duration::seconds(1), lifetime)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(matches!(
            store.get_session(&token).await,
            Err(StoreError::NotFound)
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn lazy_expiry_deletes_on_access() {
        let settings = StoreSettings::new(10)
            .with_lifetime(Some(Duration::hours(1)))
            .with_lazy_expiry(true);
        let (store, clock) = store_with(settings);
        let token = store.create_session().await.unwrap();

        clock.advance(Duration::minutes(59));
        assert!(store.get_latest(&token).await.is_ok());

        clock.advance(Duration::minutes(2));
        assert!(store.list_sessions().await.unwrap().is_empty());
        assert_eq!(store.len().await, 1, "listing must not mutate");

        assert!(matches!(
            store.append_location(&token, &fix(1.0, 1.0)).await,
            Err(StoreError::NotFound)
        ));
        assert!(store.is_empty().await);
        assert!(matches!(
            store.get_session(&token).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn without_lazy_expiry_old_sessions_stay_until_swept() {
        let settings = StoreSettings::new(10).with_lifetime(Some(Duration::hours(1)));
        let (store, clock) = store_with(settings);
        let token = store.create_session().await.unwrap();
        clock.advance(Duration::hours(5));
        assert!(store.get_session(&token).await.is_ok());
    }

    #[tokio::test]
    async fn create_retries_on_token_collision() {
        let generator = Arc::new(ScriptedTokenGenerator::new(["dup", "dup", "other"]));
        let (store, _) = store_with(StoreSettings::new(10));
        let store = store.with_token_generator(generator);

        let first = store.create_session().await.unwrap();
        store.append_location(&first, &fix(5.0, 5.0)).await.unwrap();
        let second = store.create_session().await.unwrap();

        assert_eq!(first.as_str(), "dup");
        assert_eq!(second.as_str(), "other");
        let kept = store.get_latest(&first).await.unwrap().expect("not overwritten");
        assert_eq!(kept.lat, 5.0);
    }

    #[tokio::test]
    async fn create_produces_distinct_tokens() {
        let (store, _) = store_with(StoreSettings::new(10));
        let mut tokens = HashSet::new();
        for _ in 0..200 {
            tokens.insert(store.create_session().await.unwrap());
        }
        assert_eq!(tokens.len(), 200);
        assert_eq!(store.len().await, 200);
    }

    #[tokio::test]
    async fn list_sessions_is_newest_first_with_counts() {
        let (store, clock) = store_with(StoreSettings::new(2));
        let first = store.create_session().await.unwrap();
        clock.advance(Duration::seconds(1));
        let second = store.create_session().await.unwrap();
        for lat in [1.0, 2.0, 3.0] {
            store.append_location(&first, &fix(lat, 0.0)).await.unwrap();
        }

        let listed = store.list_sessions().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].token, second);
        assert_eq!(listed[0].sample_count, 0);
        assert!(!listed[0].has_location);
        assert_eq!(listed[1].token, first);
        assert_eq!(listed[1].sample_count, 2);
        assert!(listed[1].has_location);
    }

    #[tokio::test]
    async fn deleted_tokens_are_never_revived() {
        let (store, _) = store_with(StoreSettings::new(10));
        let token = store.create_session().await.unwrap();
        let slot = store.slot(&token).await.unwrap();
        store.delete_session(&token).await.unwrap();

        // A writer that resolved the record before deletion must not succeed.
        assert!(slot.read().await.removed);
        assert!(matches!(
            store.append_location(&token, &fix(1.0, 1.0)).await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.delete_session(&token).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn concurrent_appends_on_many_sessions_respect_capacity() {
        let store = Arc::new(InMemorySessionStore::new(StoreSettings::new(5)));
        let mut tokens = Vec::new();
        for _ in 0..8 {
            tokens.push(store.create_session().await.unwrap());
        }

        let mut handles = Vec::new();
        for token in tokens.clone() {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    store
                        .append_location(&token, &fix(i as f64, 0.0))
                        .await
                        .unwrap();
                }
            }));
        }
        let sweeper = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                for _ in 0..20 {
                    store
                        .expire_sessions(Utc::now(), Duration::hours(1))
                        .await
                        .unwrap();
                }
            })
        };
        for handle in handles {
            handle.await.unwrap();
        }
        sweeper.await.unwrap();

        for token in tokens {
            let session = store.get_session(&token).await.unwrap();
            assert_eq!(session.history.len(), 5);
            assert_eq!(session.latest.as_ref(), session.history.last());
            assert_eq!(session.latest.unwrap().lat, 49.0);
        }
    }
}
