//! Behaviour every `SessionStore` backend must share. Each check takes a
//! store built over a `ManualClock` so timestamps are deterministic.

use chrono::Duration;
use geoshare_backend::{
    error::StoreError,
    models::location::{LocationFix, LocationInput},
    repositories::SessionStore,
    types::SessionToken,
    utils::time::{Clock, ManualClock},
};
use serde_json::json;
use std::collections::HashSet;

fn fix(lat: f64, lng: f64) -> LocationInput {
    LocationFix::new(lat, lng).into()
}

/// History never exceeds capacity and evicts strictly oldest first.
pub async fn history_is_bounded_fifo(store: &dyn SessionStore, clock: &ManualClock) {
    let capacity = store.settings().max_history;
    let token = store.create_session().await.unwrap();
    let total = capacity + 3;

    for i in 0..total {
        clock.advance(Duration::seconds(1));
        store
            .append_location(&token, &fix(i as f64, 0.0))
            .await
            .unwrap();

        let session = store.get_session(&token).await.unwrap();
        assert!(session.history.len() <= capacity);
        let expected_oldest = (i + 1).saturating_sub(capacity) as f64;
        assert_eq!(session.history[0].lat, expected_oldest);
        assert_eq!(session.history.last().unwrap().lat, i as f64);
    }
}

/// The latest sample mirrors what was just appended, stamped by the store.
pub async fn latest_matches_last_append(store: &dyn SessionStore, clock: &ManualClock) {
    let token = store.create_session().await.unwrap();
    assert_eq!(store.get_latest(&token).await.unwrap(), None);

    clock.advance(Duration::seconds(30));
    let input: LocationInput = serde_json::from_value(json!({
        "lat": 48.8566,
        "lng": 2.3522,
        "accuracy": 12.0,
        "speed": "1.5"
    }))
    .unwrap();
    let appended = store.append_location(&token, &input).await.unwrap();

    let latest = store.get_latest(&token).await.unwrap().expect("latest");
    assert_eq!(latest, appended);
    assert_eq!(latest.lat, 48.8566);
    assert_eq!(latest.lng, 2.3522);
    assert_eq!(latest.accuracy, Some(12.0));
    assert_eq!(latest.heading, None);
    assert_eq!(latest.speed, Some(1.5));
    assert_eq!(latest.captured_at, clock.now());
}

pub async fn unknown_token_is_not_found(store: &dyn SessionStore) {
    let token = SessionToken::from("never-issued");
    assert!(matches!(
        store.get_session(&token).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.get_latest(&token).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.append_location(&token, &fix(1.0, 1.0)).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.get_history(&token, None).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.delete_session(&token).await,
        Err(StoreError::NotFound)
    ));
}

/// A second sweep right after the first removes nothing.
pub async fn expire_is_idempotent(store: &dyn SessionStore, clock: &ManualClock) {
    let lifetime = Duration::hours(1);
    let old_a = store.create_session().await.unwrap();
    let old_b = store.create_session().await.unwrap();
    clock.advance(Duration::minutes(90));
    let fresh = store.create_session().await.unwrap();

    let now = clock.now();
    assert_eq!(store.expire_sessions(now, lifetime).await.unwrap(), 2);
    assert_eq!(store.expire_sessions(now, lifetime).await.unwrap(), 0);

    for token in [&old_a, &old_b] {
        assert!(matches!(
            store.get_session(token).await,
            Err(StoreError::NotFound)
        ));
    }
    assert!(store.get_session(&fresh).await.is_ok());
}

/// A session exactly one lifetime old survives; one second more does not.
pub async fn expire_uses_strict_cutoff(store: &dyn SessionStore) {
    let lifetime = Duration::hours(24);
    let token = store.create_session().await.unwrap();
    let created_at = store.get_session(&token).await.unwrap().created_at;

    assert_eq!(
        store
            .expire_sessions(created_at + lifetime, lifetime)
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        store
            .expire_sessions(created_at + lifetime + Duration::seconds(1), lifetime)
            .await
            .unwrap(),
        1
    );
    assert!(matches!(
        store.get_session(&token).await,
        Err(StoreError::NotFound)
    ));
    assert!(matches!(
        store.append_location(&token, &fix(1.0, 2.0)).await,
        Err(StoreError::NotFound)
    ));
}

pub async fn tokens_are_distinct(store: &dyn SessionStore) {
    let mut seen = HashSet::new();
    for _ in 0..64 {
        let token = store.create_session().await.unwrap();
        assert!(seen.insert(token));
    }
}

/// Missing `lng` is rejected and leaves the stored history untouched.
pub async fn invalid_input_leaves_history(store: &dyn SessionStore, clock: &ManualClock) {
    let token = store.create_session().await.unwrap();
    clock.advance(Duration::seconds(1));
    store.append_location(&token, &fix(5.0, 6.0)).await.unwrap();
    let before = store.get_session(&token).await.unwrap();

    let missing_lng: LocationInput = serde_json::from_value(json!({ "lat": 7.0 })).unwrap();
    assert!(matches!(
        store.append_location(&token, &missing_lng).await,
        Err(StoreError::InvalidInput(_))
    ));
    let garbage: LocationInput =
        serde_json::from_value(json!({ "lat": "north", "lng": 1.0 })).unwrap();
    assert!(matches!(
        store.append_location(&token, &garbage).await,
        Err(StoreError::InvalidInput(_))
    ));

    let after = store.get_session(&token).await.unwrap();
    assert_eq!(after.history, before.history);
    assert_eq!(after.latest, before.latest);
}

/// Three appends into a two-slot history keep the 2nd and 3rd, newest first.
pub async fn history_keeps_last_two_of_three(store: &dyn SessionStore, clock: &ManualClock) {
    assert_eq!(store.settings().max_history, 2);
    let token = store.create_session().await.unwrap();
    for lat in [1.0, 2.0, 3.0] {
        clock.advance(Duration::seconds(1));
        store.append_location(&token, &fix(lat, lat)).await.unwrap();
    }

    let history = store.get_history(&token, Some(10)).await.unwrap();
    let lats: Vec<f64> = history.iter().map(|s| s.lat).collect();
    assert_eq!(lats, vec![3.0, 2.0]);
    assert!(history[0].captured_at > history[1].captured_at);

    let one = store.get_history(&token, Some(1)).await.unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].lat, 3.0);
    assert!(store.get_history(&token, Some(0)).await.unwrap().is_empty());
}

/// Listing is newest first and reflects sample counts.
pub async fn listing_reports_counts(store: &dyn SessionStore, clock: &ManualClock) {
    let older = store.create_session().await.unwrap();
    clock.advance(Duration::seconds(5));
    let newer = store.create_session().await.unwrap();
    store.append_location(&newer, &fix(1.0, 1.0)).await.unwrap();

    let sessions = store.list_sessions().await.unwrap();
    let position = |token: &SessionToken| {
        sessions
            .iter()
            .position(|s| &s.token == token)
            .expect("listed")
    };
    assert!(position(&newer) < position(&older));

    let newer_summary = &sessions[position(&newer)];
    assert_eq!(newer_summary.sample_count, 1);
    assert!(newer_summary.has_location);
    let older_summary = &sessions[position(&older)];
    assert_eq!(older_summary.sample_count, 0);
    assert!(!older_summary.has_location);
}
