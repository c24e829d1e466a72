//! PostgreSQL-backed session store.
//!
//! `share_sessions` holds one row per session with the latest sample
//! denormalized into `latest_*` columns; `location_samples` holds the bounded
//! history and cascades on session deletion. Appends serialize on the
//! session row via `SELECT ... FOR UPDATE`; reads hold `FOR SHARE` on the
//! same row for their whole transaction.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgConnection, PgPool, Postgres, Transaction};
use std::sync::Arc;

use crate::{
    error::StoreError,
    models::{
        location::{LocationInput, LocationSample},
        share_session::{SessionSummary, ShareSession},
    },
    repositories::session_store::{SessionStore, StoreSettings, MAX_TOKEN_ATTEMPTS},
    types::SessionToken,
    utils::{
        time::{Clock, SystemClock},
        token::{RandomTokenGenerator, TokenGenerator},
    },
};

#[derive(Debug, FromRow)]
struct SessionRow {
    token: SessionToken,
    created_at: DateTime<Utc>,
    latest_lat: Option<f64>,
    latest_lng: Option<f64>,
    latest_accuracy: Option<f64>,
    latest_heading: Option<f64>,
    latest_speed: Option<f64>,
    latest_captured_at: Option<DateTime<Utc>>,
}

impl SessionRow {
    fn latest(&self) -> Option<LocationSample> {
        match (self.latest_lat, self.latest_lng, self.latest_captured_at) {
            (Some(lat), Some(lng), Some(captured_at)) => Some(LocationSample {
                lat,
                lng,
                accuracy: self.latest_accuracy,
                heading: self.latest_heading,
                speed: self.latest_speed,
                captured_at,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, FromRow)]
struct SummaryRow {
    token: SessionToken,
    created_at: DateTime<Utc>,
    sample_count: i64,
    has_location: bool,
}

impl From<SummaryRow> for SessionSummary {
    fn from(row: SummaryRow) -> Self {
        SessionSummary {
            token: row.token,
            created_at: row.created_at,
            sample_count: usize::try_from(row.sample_count).unwrap_or(0),
            has_location: row.has_location,
        }
    }
}

pub struct PgSessionStore {
    pool: PgPool,
    settings: StoreSettings,
    clock: Arc<dyn Clock>,
    tokens: Arc<dyn TokenGenerator>,
}

impl PgSessionStore {
    pub fn new(pool: PgPool, settings: StoreSettings) -> Self {
        Self {
            pool,
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

    /// Opens a read transaction holding `FOR SHARE` on a live session row.
    /// Appends and deletions of that session wait for the transaction, so
    /// everything read through it belongs to one state of the session.
    async fn begin_read(
        &self,
        token: &SessionToken,
    ) -> Result<(Transaction<'static, Postgres>, SessionRow), StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT token, created_at, latest_lat, latest_lng, latest_accuracy,
                   latest_heading, latest_speed, latest_captured_at
            FROM share_sessions
            WHERE token = $1
            FOR SHARE
            "#,
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(row) = row else {
            return Err(StoreError::NotFound);
        };

        let now = self.clock.now();
        if self.settings.expires_on_access(row.created_at, now) {
            // Never upgrade a share lock to a delete.
            tx.rollback().await?;
            self.delete_if_expired(&self.pool, token, now).await?;
            return Err(StoreError::NotFound);
        }
        Ok((tx, row))
    }

    async fn delete_if_expired<'e, E>(
        &self,
        executor: E,
        token: &SessionToken,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let Some(lifetime) = self.settings.lifetime else {
            return Ok(false);
        };
        let removed = delete_created_before(executor, token, now - lifetime).await?;
        if removed {
            tracing::info!(token = %token, "Expired session removed on access");
        }
        Ok(removed)
    }

    async fn fetch_history(
        &self,
        conn: &mut PgConnection,
        token: &SessionToken,
        limit: usize,
    ) -> Result<Vec<LocationSample>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let samples = sqlx::query_as::<_, LocationSample>(
            r#"
            SELECT lat, lng, accuracy, heading, speed, captured_at
            FROM location_samples
            WHERE session_token = $1
            ORDER BY id DESC
            LIMIT $2
            "#,
        )
        .bind(token)
        .bind(limit)
        .fetch_all(conn)
        .await?;
        Ok(samples)
    }

    async fn insert_sample(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        token: &SessionToken,
        sample: &LocationSample,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO location_samples
                (session_token, lat, lng, accuracy, heading, speed, captured_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(token)
        .bind(sample.lat)
        .bind(sample.lng)
        .bind(sample.accuracy)
        .bind(sample.heading)
        .bind(sample.speed)
        .bind(sample.captured_at)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE share_sessions
            SET latest_lat = $2,
                latest_lng = $3,
                latest_accuracy = $4,
                latest_heading = $5,
                latest_speed = $6,
                latest_captured_at = $7
            WHERE token = $1
            "#,
        )
        .bind(token)
        .bind(sample.lat)
        .bind(sample.lng)
        .bind(sample.accuracy)
        .bind(sample.heading)
        .bind(sample.speed)
        .bind(sample.captured_at)
        .execute(&mut **tx)
        .await?;

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM location_samples WHERE session_token = $1")
                .bind(token)
                .fetch_one(&mut **tx)
                .await?;
        if count > self.settings.max_history as i64 {
            sqlx::query(
                r#"
                DELETE FROM location_samples
                WHERE id = (
                    SELECT id FROM location_samples
                    WHERE session_token = $1
                    ORDER BY id ASC
                    LIMIT 1
                )
                "#,
            )
            .bind(token)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

async fn delete_created_before<'e, E>(
    executor: E,
    token: &SessionToken,
    cutoff: DateTime<Utc>,
) -> Result<bool, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let result = sqlx::query("DELETE FROM share_sessions WHERE token = $1 AND created_at < $2")
        .bind(token)
        .bind(cutoff)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl SessionStore for PgSessionStore {
    fn settings(&self) -> StoreSettings {
        self.settings
    }

    async fn create_session(&self) -> Result<SessionToken, StoreError> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let token = self.tokens.generate();
            let result = sqlx::query(
                r#"
                INSERT INTO share_sessions (token, created_at)
                VALUES ($1, $2)
                ON CONFLICT (token) DO NOTHING
                "#,
            )
            .bind(&token)
            .bind(self.clock.now())
            .execute(&self.pool)
            .await?;
            if result.rows_affected() == 1 {
                tracing::debug!(token = %token, "Session created");
                return Ok(token);
            }
            tracing::warn!("Generated session token collided with a live session, retrying");
        }
        Err(StoreError::Backend(anyhow::anyhow!(
            "could not generate a unique session token after {} attempts",
            MAX_TOKEN_ATTEMPTS
        )))
    }

    async fn get_session(&self, token: &SessionToken) -> Result<ShareSession, StoreError> {
        let (mut tx, row) = self.begin_read(token).await?;
        let mut history = self
            .fetch_history(&mut tx, token, self.settings.max_history)
            .await?;
        tx.commit().await?;
        history.reverse();
        Ok(ShareSession {
            latest: row.latest(),
            token: row.token,
            created_at: row.created_at,
            history,
        })
    }

    async fn append_location(
        &self,
        token: &SessionToken,
        input: &LocationInput,
    ) -> Result<LocationSample, StoreError> {
        let mut tx = self.pool.begin().await?;
        let created_at: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT created_at FROM share_sessions WHERE token = $1 FOR UPDATE",
        )
        .bind(token)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(created_at) = created_at else {
            return Err(StoreError::NotFound);
        };

        let now = self.clock.now();
        if self.settings.expires_on_access(created_at, now) {
            self.delete_if_expired(&mut *tx, token, now).await?;
            tx.commit().await?;
            return Err(StoreError::NotFound);
        }

        let sample = input.validate()?.captured_at(now);
        self.insert_sample(&mut tx, token, &sample).await?;
        tx.commit().await?;
        Ok(sample)
    }

    async fn get_latest(&self, token: &SessionToken) -> Result<Option<LocationSample>, StoreError> {
        let (tx, row) = self.begin_read(token).await?;
        tx.commit().await?;
        Ok(row.latest())
    }

    async fn get_history(
        &self,
        token: &SessionToken,
        limit: Option<usize>,
    ) -> Result<Vec<LocationSample>, StoreError> {
        let (mut tx, _) = self.begin_read(token).await?;
        let history = self
            .fetch_history(&mut tx, token, self.settings.history_limit(limit))
            .await?;
        tx.commit().await?;
        Ok(history)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, StoreError> {
        let now = self.clock.now();
        let cutoff = match (self.settings.lazy_expiry, self.settings.lifetime) {
            (true, Some(lifetime)) => Some(now - lifetime),
            _ => None,
        };
        let rows = sqlx::query_as::<_, SummaryRow>(
            r#"
            SELECT s.token,
                   s.created_at,
                   COUNT(l.id) AS sample_count,
                   (s.latest_captured_at IS NOT NULL) AS has_location
            FROM share_sessions s
            LEFT JOIN location_samples l ON l.session_token = s.token
            WHERE $1::timestamptz IS NULL OR s.created_at >= $1
            GROUP BY s.token
            ORDER BY s.created_at DESC, s.token ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(SessionSummary::from).collect())
    }

    async fn expire_sessions(
        &self,
        now: DateTime<Utc>,
        lifetime: Duration,
    ) -> Result<u64, StoreError> {
        let cutoff = now - lifetime;
        let candidates: Vec<SessionToken> =
            sqlx::query_scalar("SELECT token FROM share_sessions WHERE created_at < $1")
                .bind(cutoff)
                .fetch_all(&self.pool)
                .await?;

        let mut deleted = 0u64;
        for token in candidates {
            match delete_created_before(&self.pool, &token, cutoff).await {
                Ok(true) => {
                    tracing::debug!(token = %token, "Expired session removed by sweep");
                    deleted += 1;
                }
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(
                        token = %token,
                        error = ?err,
                        "Failed to delete expired session, continuing sweep"
                    );
                }
            }
        }
        Ok(deleted)
    }

    async fn delete_session(&self, token: &SessionToken) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM share_sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
