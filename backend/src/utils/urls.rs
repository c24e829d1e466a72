use axum::http::{header::HOST, HeaderMap};

use crate::{config::Config, types::SessionToken};

/// Base address used for share/track links: the configured public URL, or
/// the request's `Host` header when none is configured.
pub fn base_url(config: &Config, headers: &HeaderMap) -> String {
    if let Some(base) = &config.public_base_url {
        return base.clone();
    }
    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .unwrap_or("localhost");
    format!("http://{}", host)
}

pub fn share_url(base: &str, token: &SessionToken) -> String {
    format!("{}/share/{}", base.trim_end_matches('/'), token)
}

pub fn track_url(base: &str, token: &SessionToken) -> String {
    format!("{}/track/{}", base.trim_end_matches('/'), token)
}
