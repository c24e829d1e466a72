use axum::{
    http::{HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::Config,
    docs::ApiDoc,
    handlers::{self, admin},
    middleware::{log_requests, require_admin_key},
    state::AppState,
};

/// Full application router: pages, public API, admin API and docs.
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route("/share/{token}", get(handlers::share_page))
        .route("/track/{token}", get(handlers::track_page))
        .route("/api/session", post(handlers::create_session))
        .route(
            "/api/location/{token}",
            post(handlers::update_location).get(handlers::latest_location),
        )
        .route(
            "/api/location/{token}/history",
            get(handlers::location_history),
        );

    let admin_routes = Router::new()
        .route("/admin", get(handlers::admin_page))
        .route("/api/admin/sessions", get(admin::list_sessions))
        .route("/api/admin/sessions/{token}", delete(admin::delete_session))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            require_admin_key,
        ));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(SwaggerUi::new("/api/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn(log_requests))
                .layer(cors_layer(&state.config)),
        )
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(24 * 60 * 60));

    if config.cors_allow_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = config
        .cors_allow_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}
