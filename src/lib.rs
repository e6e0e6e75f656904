pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use api::state::SharedState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Assemble the full HTTP surface around the shared service bundle.
pub fn create_router(state: SharedState) -> Router {
    let api_v1 = Router::new()
        .route(
            "/projects",
            get(api::projects::list_projects).post(api::projects::create_project),
        )
        .route(
            "/projects/{slug}",
            get(api::projects::get_project).delete(api::projects::delete_project),
        )
        .route(
            "/projects/{slug}/documents",
            get(api::documents::list_documents).post(api::documents::create_document),
        )
        .route(
            "/projects/{slug}/documents/{document_id}",
            get(api::documents::get_document).delete(api::documents::delete_document),
        )
        .route(
            "/projects/{slug}/documents/{document_id}/process",
            post(api::documents::process_document),
        )
        .route(
            "/projects/{slug}/entities",
            get(api::knowledge::list_entities)
                .post(api::knowledge::create_entity)
                .put(api::knowledge::upsert_entity),
        )
        .route("/projects/{slug}/entities/find", get(api::knowledge::find_entity))
        .route(
            "/projects/{slug}/entities/batch",
            delete(api::knowledge::batch_delete_entities),
        )
        .route(
            "/projects/{slug}/entities/deduplicate",
            post(api::knowledge::deduplicate_entities),
        )
        .route(
            "/projects/{slug}/entities/{entity_id}",
            get(api::knowledge::get_entity)
                .patch(api::knowledge::update_entity)
                .delete(api::knowledge::delete_entity),
        )
        .route(
            "/projects/{slug}/entities/{entity_id}/relationships",
            get(api::knowledge::get_entity_relationships),
        )
        .route(
            "/projects/{slug}/relationships",
            get(api::knowledge::list_relationships).post(api::knowledge::create_relationship),
        )
        .route("/projects/{slug}/query/cypher", post(api::knowledge::execute_cypher))
        .route("/projects/{slug}/batch", post(api::knowledge::batch_create))
        .route("/projects/{slug}/search", post(api::search::search))
        .route("/search", post(api::search::fanout_search))
        .route(
            "/projects/{slug}/visualization/graph",
            get(api::visualization::get_visualization_graph),
        )
        .route(
            "/projects/{slug}/visualization/graph/local/{entity_id}",
            get(api::visualization::get_local_graph),
        )
        .route(
            "/projects/{slug}/snapshots",
            get(api::snapshots::list_snapshots).post(api::snapshots::create_snapshot),
        )
        .route(
            "/projects/{slug}/snapshots/{snapshot_id}",
            get(api::snapshots::get_snapshot).delete(api::snapshots::delete_snapshot),
        )
        .route(
            "/projects/{slug}/snapshots/{snapshot_id}/restore",
            post(api::snapshots::restore_snapshot),
        );

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/auth/verify", get(auth::verify_auth))
        .nest("/api/v1", api_v1)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": state.settings.app_name,
        "version": VERSION,
    }))
}

async fn root(State(state): State<SharedState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "name": state.settings.app_name,
        "version": VERSION,
        "health": "/health",
    }))
}
