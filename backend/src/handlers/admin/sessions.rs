use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::{AppError, StoreError},
    models::{location::LocationSample, share_session::SessionSummary},
    state::AppState,
    types::SessionToken,
    utils::urls::{base_url, share_url, track_url},
};

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AdminSessionsQuery {
    /// Admin shared secret; checked by the admin middleware.
    pub key: Option<String>,
    /// Session whose history should be included.
    pub token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminSessionItem {
    pub token: String,
    pub share_url: String,
    pub track_url: String,
    pub created_at: DateTime<Utc>,
    pub has_location: bool,
    pub count: usize,
}

impl AdminSessionItem {
    fn from_summary(summary: SessionSummary, base: &str) -> Self {
        Self {
            share_url: share_url(base, &summary.token),
            track_url: track_url(base, &summary.token),
            token: summary.token.into_inner(),
            created_at: summary.created_at,
            has_location: summary.has_location,
            count: summary.sample_count,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminSessionsResponse {
    pub sessions: Vec<AdminSessionItem>,
    pub selected_token: Option<String>,
    /// History of `selected_token`, newest first.
    pub history: Vec<LocationSample>,
    pub max_history: usize,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AdminSessionsQuery>,
) -> Result<Json<AdminSessionsResponse>, AppError> {
    let base = base_url(&state.config, &headers);
    let sessions = state
        .store()
        .list_sessions()
        .await?
        .into_iter()
        .map(|summary| AdminSessionItem::from_summary(summary, &base))
        .collect();

    let mut selected_token = None;
    let mut history = Vec::new();
    if let Some(token) = query.token.filter(|t| !t.trim().is_empty()) {
        let token = SessionToken::from(token);
        match state.store().get_history(&token, None).await {
            Ok(samples) => {
                selected_token = Some(token.into_inner());
                history = samples;
            }
            // An unknown filter just shows no selection.
            Err(StoreError::NotFound) => {}
            Err(err) => return Err(err.into()),
        }
    }

    Ok(Json(AdminSessionsResponse {
        sessions,
        selected_token,
        history,
        max_history: state.store().settings().max_history,
    }))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<Value>, AppError> {
    if token.trim().is_empty() {
        return Err(AppError::BadRequest("Session token is required".into()));
    }
    let token = SessionToken::from(token);
    state.store().delete_session(&token).await?;
    tracing::info!(token = %token, "Session deleted by admin");

    Ok(Json(json!({
        "message": "Session deleted",
        "token": token.as_str()
    })))
}
