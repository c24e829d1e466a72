use axum::{
    extract::{Path, State},
    response::Html,
};

use crate::{error::AppError, state::AppState, types::SessionToken};

const INDEX_TEMPLATE: &str = include_str!("../../templates/index.html");
const SHARE_TEMPLATE: &str = include_str!("../../templates/share.html");
const TRACK_TEMPLATE: &str = include_str!("../../templates/track.html");
const ADMIN_TEMPLATE: &str = include_str!("../../templates/admin.html");

pub async fn index() -> Html<&'static str> {
    Html(INDEX_TEMPLATE)
}

/// Admin dashboard; data comes from `GET /api/admin/sessions`.
pub async fn admin_page() -> Html<&'static str> {
    Html(ADMIN_TEMPLATE)
}

pub async fn share_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Html<String>, AppError> {
    render_for_session(&state, token, SHARE_TEMPLATE).await
}

pub async fn track_page(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Html<String>, AppError> {
    render_for_session(&state, token, TRACK_TEMPLATE).await
}

async fn render_for_session(
    state: &AppState,
    token: String,
    template: &str,
) -> Result<Html<String>, AppError> {
    let token = SessionToken::from(token);
    // Same NotFound rule as the API, without copying the history.
    state.store().get_latest(&token).await?;
    Ok(Html(render(template, &token)))
}

/// Substitutes `{{token}}`. Tokens from the store are URL-safe base64, but the
/// path segment is user input, so it is escaped anyway.
fn render(template: &str, token: &SessionToken) -> String {
    template.replace("{{token}}", &escape(token.as_str()))
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '\\' => out.push_str("&#x5C;"),
            c => out.push(c),
        }
    }
    out
}
