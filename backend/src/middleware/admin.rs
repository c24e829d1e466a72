use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;

use crate::{error::AppError, state::AppState};

#[derive(Debug, Deserialize)]
struct AdminKeyQuery {
    key: Option<String>,
}

/// Rejects requests whose `key` query parameter does not match `ADMIN_KEY`.
pub async fn require_admin_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let provided = Query::<AdminKeyQuery>::try_from_uri(request.uri())
        .ok()
        .and_then(|Query(query)| query.key);

    match provided {
        Some(key) if key == state.config.admin_key => Ok(next.run(request).await),
        _ => {
            tracing::warn!(uri = %request.uri().path(), "Rejected admin request with bad key");
            Err(AppError::Forbidden("Forbidden".into()))
        }
    }
}
