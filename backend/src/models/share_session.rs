//! Models for location-sharing sessions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::models::location::LocationSample;
use crate::types::SessionToken;

/// Snapshot of one sharing session.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ShareSession {
    #[schema(value_type = String)]
    pub token: SessionToken,
    pub created_at: DateTime<Utc>,
    /// Most recently appended sample, if any.
    pub latest: Option<LocationSample>,
    /// Retained samples, oldest first.
    pub history: Vec<LocationSample>,
}

/// Row of the administrative session listing.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SessionSummary {
    #[schema(value_type = String)]
    pub token: SessionToken,
    pub created_at: DateTime<Utc>,
    pub sample_count: usize,
    pub has_location: bool,
}

/// Whether a session created at `created_at` is past `lifetime` at `now`.
pub fn is_expired(
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    lifetime: Option<chrono::Duration>,
) -> bool {
    match lifetime {
        Some(lifetime) => created_at < now - lifetime,
        None => false,
    }
}
