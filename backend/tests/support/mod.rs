#![allow(dead_code)]
use axum::{
    body::Body,
    http::{header, Request, Response},
    Router,
};
use chrono::{DateTime, TimeZone, Utc};
use geoshare_backend::{
    config::Config,
    repositories::{InMemorySessionStore, SessionStore, StoreSettings},
    routes::build_router,
    state::AppState,
    utils::time::ManualClock,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{env, sync::Arc, time::Duration as StdDuration};
use tower::ServiceExt;

pub mod properties;

pub const ADMIN_KEY: &str = "test-admin-key";

pub fn test_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 7, 1, 8, 0, 0).unwrap()
}

pub fn test_config() -> Config {
    Config {
        public_base_url: Some("https://geo.test".into()),
        admin_key: ADMIN_KEY.into(),
        max_history: 1000,
        session_lifetime_hours: Some(24),
        lazy_expiry: true,
        ..Config::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemorySessionStore>,
    pub clock: Arc<ManualClock>,
    pub config: Config,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(test_start()));
        let store = Arc::new(
            InMemorySessionStore::new(StoreSettings::from_config(&config))
                .with_clock(clock.clone()),
        );
        let dyn_store: Arc<dyn SessionStore> = store.clone();
        let router = build_router(AppState::new(dyn_store, config.clone()));
        Self {
            router,
            store,
            clock,
            config,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("call router")
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .uri(uri)
                .body(Body::empty())
                .expect("build GET request"),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .expect("build POST request"),
        )
        .await
    }

    pub async fn delete(&self, uri: &str) -> Response<Body> {
        self.send(
            Request::builder()
                .method("DELETE")
                .uri(uri)
                .body(Body::empty())
                .expect("build DELETE request"),
        )
        .await
    }

    /// Creates a session through the API and returns its token.
    pub async fn create_session(&self) -> String {
        let response = self
            .send(
                Request::builder()
                    .method("POST")
                    .uri("/api/session")
                    .body(Body::empty())
                    .expect("build create request"),
            )
            .await;
        assert_eq!(response.status(), 201);
        let json = body_json(response).await;
        json["token"].as_str().expect("token").to_string()
    }
}

pub async fn body_bytes(response: Response<Body>) -> axum::body::Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("json body")
}

pub fn test_database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}

/// Connects to `TEST_DATABASE_URL`, or returns `None` so database tests can
/// be skipped on machines without PostgreSQL.
pub async fn test_pool() -> Option<PgPool> {
    let database_url = test_database_url()?;
    let mut retry_count = 0;
    let max_retries = 3;

    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(StdDuration::from_secs(30))
            .connect(&database_url)
            .await
        {
            Ok(pool) => return Some(pool),
            Err(e) if retry_count < max_retries => {
                retry_count += 1;
                eprintln!(
                    "Failed to connect to test database (attempt {}/{}): {}",
                    retry_count, max_retries, e
                );
                tokio::time::sleep(StdDuration::from_secs(2)).await;
            }
            Err(e) => panic!("Failed to connect to test database: {}", e),
        }
    }
}
