//! Read-only view of the server registry.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{ServerDetailResponse, ServerListResponse, ServerSummaryDto};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, SyncError};

/// `GET /api/v1/servers` — List known servers.
#[utoipa::path(
    get,
    path = "/api/v1/servers",
    tag = "Servers",
    summary = "List servers",
    description = "Returns every server this node currently considers alive, sorted by name.",
    responses(
        (status = 200, description = "Known servers", body = ServerListResponse),
    )
)]
pub async fn list_servers(State(state): State<AppState>) -> impl IntoResponse {
    let data: Vec<ServerSummaryDto> = state
        .registry
        .list()
        .await
        .into_iter()
        .map(ServerSummaryDto::from)
        .collect();
    let total = data.len();
    Json(ServerListResponse { data, total })
}

/// `GET /api/v1/servers/{name}` — Server detail with roster.
#[utoipa::path(
    get,
    path = "/api/v1/servers/{name}",
    tag = "Servers",
    summary = "Get server details",
    description = "Returns address, capacity, liveness and the full roster of one server.",
    params(
        ("name" = String, Path, description = "Server name"),
    ),
    responses(
        (status = 200, description = "Server details", body = ServerDetailResponse),
        (status = 404, description = "Server not known to this node", body = ErrorResponse),
    )
)]
pub async fn get_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, SyncError> {
    let server = state
        .registry
        .get(&name)
        .await
        .ok_or(SyncError::ServerNotFound(name))?;
    Ok(Json(ServerDetailResponse::from(&server)))
}

/// Server routes, nested under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/servers", get(list_servers))
        .route("/servers/{name}", get(get_server))
}
