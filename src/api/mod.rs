//! Read-only status API: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root. With the `swagger-ui` feature the OpenAPI document is served at
//! `/api-docs/openapi.json` and browsable at `/swagger-ui`.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI description of the status API.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "serversync", description = "Fleet membership and roster view of a serversync node"),
    paths(
        handlers::system::health_handler,
        handlers::servers::list_servers,
        handlers::servers::get_server,
    ),
    components(schemas(
        handlers::system::HealthResponse,
        dto::ServerSummaryDto,
        dto::ServerListResponse,
        dto::ServerDetailResponse,
        dto::PlayerDto,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "Servers", description = "Servers known to this node"),
        (name = "System", description = "Node health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}
