use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppError,
    models::location::{LocationInput, LocationSample},
    state::AppState,
    types::SessionToken,
    utils::urls::{base_url, share_url, track_url},
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateSessionResponse {
    pub token: String,
    pub share_url: String,
    pub track_url: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusResponse {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LatestLocationResponse {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<LocationSample>,
}

#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Maximum number of samples to return (default: MAX_HISTORY).
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryResponse {
    pub token: String,
    pub max_history: usize,
    /// Samples, newest first.
    pub history: Vec<LocationSample>,
}

pub async fn create_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let token = state.store().create_session().await?;
    let base = base_url(&state.config, &headers);
    tracing::info!(token = %token, "Share session created");

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            share_url: share_url(&base, &token),
            track_url: track_url(&base, &token),
            token: token.into_inner(),
        }),
    ))
}

/// Accepts any body; unparsable JSON is treated like an empty object so the
/// caller gets the same "lat/lng is required" answer.
pub async fn update_location(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Bytes,
) -> Result<Json<StatusResponse>, AppError> {
    let token = SessionToken::from(token);
    let input = LocationInput::from_body(&body);
    state.store().append_location(&token, &input).await?;
    Ok(Json(StatusResponse {
        status: "ok".to_string(),
    }))
}

pub async fn latest_location(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<LatestLocationResponse>, AppError> {
    let token = SessionToken::from(token);
    let latest = state.store().get_latest(&token).await?;
    Ok(Json(LatestLocationResponse {
        available: latest.is_some(),
        location: latest,
    }))
}

pub async fn location_history(
    State(state): State<AppState>,
    Path(token): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, AppError> {
    let Query(query) = query.map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
    let token = SessionToken::from(token);
    let history = state.store().get_history(&token, query.limit).await?;
    Ok(Json(HistoryResponse {
        token: token.into_inner(),
        max_history: state.store().settings().max_history,
        history,
    }))
}
