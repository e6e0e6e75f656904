use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use schemars::JsonSchema;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::{
    errors::{ApiResult, AppError},
    fetch_project,
    state::SharedState,
    ValidatedJson,
};
use crate::database::models::{RestoreResponse, SnapshotCreate, SnapshotDetail, SnapshotResponse};

// Snapshot the current graph state
pub async fn create_snapshot(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<SnapshotCreate>,
) -> ApiResult<Json<SnapshotResponse>> {
    let project = fetch_project(&state, &slug).await?;

    let snapshot = state
        .snapshot
        .create(
            project.id,
            &project.graph_name,
            request.label.as_deref(),
            &request.trigger,
        )
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::CREATED, Json(snapshot)))
}

#[derive(Deserialize, JsonSchema)]
pub struct SnapshotListQuery {
    pub limit: Option<i64>,
}

// List snapshots, newest first
pub async fn list_snapshots(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Query(params): Query<SnapshotListQuery>,
) -> ApiResult<Json<Vec<SnapshotResponse>>> {
    let project = fetch_project(&state, &slug).await?;
    let limit = params.limit.unwrap_or(20).clamp(1, 100);

    let snapshots = state
        .snapshot
        .list(project.id, limit)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::OK, Json(snapshots)))
}

// Get a snapshot including its graph data
pub async fn get_snapshot(
    State(state): State<SharedState>,
    Path((slug, snapshot_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<SnapshotDetail>> {
    fetch_project(&state, &slug).await?;

    let snapshot = state
        .snapshot
        .get(snapshot_id)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                AppError::not_found(&format!("Snapshot '{snapshot_id}'")),
            )
        })?;

    Ok((StatusCode::OK, Json(snapshot)))
}

// Delete a snapshot
pub async fn delete_snapshot(
    State(state): State<SharedState>,
    Path((slug, snapshot_id)): Path<(String, Uuid)>,
) -> ApiResult<()> {
    fetch_project(&state, &slug).await?;

    let deleted = state
        .snapshot
        .delete(snapshot_id)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    if !deleted {
        return Err((
            StatusCode::NOT_FOUND,
            AppError::not_found(&format!("Snapshot '{snapshot_id}'")),
        ));
    }

    Ok((StatusCode::NO_CONTENT, ()))
}

// Rebuild the project graph from a snapshot
pub async fn restore_snapshot(
    State(state): State<SharedState>,
    Path((slug, snapshot_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<RestoreResponse>> {
    let project = fetch_project(&state, &slug).await?;

    let response = state
        .snapshot
        .restore(snapshot_id, &project.graph_name, project.id)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::OK, Json(response)))
}
