use axum::{
    extract::Request,
    http::{header::HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tags every request with an id (reusing the caller's `x-request-id`), echoes
/// it on the response and logs responses in the 4xx/5xx range.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);
    let request_id = req
        .headers()
        .get(&header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(req).await;
    let status = response.status();
    let latency_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        tracing::error!(
            status = status.as_u16(),
            method = %method,
            path = %path,
            latency_ms,
            request_id = %request_id,
            "Request completed with error status"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            status = status.as_u16(),
            method = %method,
            path = %path,
            latency_ms,
            request_id = %request_id,
            "Request completed with error status"
        );
    }

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(header_name, value);
    }
    response
}
