#![allow(dead_code)] // OpenAPI doc stubs are only referenced by utoipa macros.

use crate::{
    error::ErrorResponse,
    handlers::{
        admin::{AdminSessionItem, AdminSessionsQuery, AdminSessionsResponse},
        sessions::{
            CreateSessionResponse, HistoryQuery, HistoryResponse, LatestLocationResponse,
            StatusResponse,
        },
    },
    models::location::{LocationInput, LocationSample},
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(title = "Geoshare API", description = "Location sharing sessions"),
    paths(
        create_session_doc,
        update_location_doc,
        latest_location_doc,
        location_history_doc,
        admin_list_sessions_doc,
        admin_delete_session_doc,
        health_doc
    ),
    components(schemas(
        CreateSessionResponse,
        StatusResponse,
        LatestLocationResponse,
        HistoryQuery,
        HistoryResponse,
        LocationInput,
        LocationSample,
        AdminSessionsQuery,
        AdminSessionItem,
        AdminSessionsResponse,
        ErrorResponse
    )),
    tags(
        (name = "Sessions", description = "Share session lifecycle and locations"),
        (name = "Admin", description = "Administrative listing, requires ?key="),
        (name = "System", description = "Health")
    )
)]
pub struct ApiDoc;

#[utoipa::path(
    post,
    path = "/api/session",
    responses((status = 201, description = "Session created", body = CreateSessionResponse)),
    tag = "Sessions"
)]
fn create_session_doc() {}

#[utoipa::path(
    post,
    path = "/api/location/{token}",
    params(("token" = String, Path, description = "Session token")),
    request_body = LocationInput,
    responses(
        (status = 200, description = "Location stored", body = StatusResponse),
        (status = 400, description = "lat/lng missing or not numeric", body = ErrorResponse),
        (status = 404, description = "Unknown or expired token", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn update_location_doc() {}

#[utoipa::path(
    get,
    path = "/api/location/{token}",
    params(("token" = String, Path, description = "Session token")),
    responses(
        (status = 200, description = "Latest location, if any", body = LatestLocationResponse),
        (status = 404, description = "Unknown or expired token", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn latest_location_doc() {}

#[utoipa::path(
    get,
    path = "/api/location/{token}/history",
    params(("token" = String, Path, description = "Session token"), HistoryQuery),
    responses(
        (status = 200, description = "Samples, newest first", body = HistoryResponse),
        (status = 400, description = "Invalid limit", body = ErrorResponse),
        (status = 404, description = "Unknown or expired token", body = ErrorResponse)
    ),
    tag = "Sessions"
)]
fn location_history_doc() {}

#[utoipa::path(
    get,
    path = "/api/admin/sessions",
    params(AdminSessionsQuery),
    responses(
        (status = 200, description = "Live sessions, newest first", body = AdminSessionsResponse),
        (status = 403, description = "Admin key mismatch", body = ErrorResponse)
    ),
    tag = "Admin"
)]
fn admin_list_sessions_doc() {}

#[utoipa::path(
    delete,
    path = "/api/admin/sessions/{token}",
    params(
        ("token" = String, Path, description = "Session token"),
        ("key" = String, Query, description = "Admin key")
    ),
    responses(
        (status = 200, description = "Session deleted"),
        (status = 403, description = "Admin key mismatch", body = ErrorResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse)
    ),
    tag = "Admin"
)]
fn admin_delete_session_doc() {}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "System"
)]
fn health_doc() {}
