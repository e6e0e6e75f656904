use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use crate::api::{
    errors::{ApiResult, AppError},
    fetch_project,
    state::SharedState,
    ValidatedJson,
};
use crate::database::models::{FanoutSearchResponse, SearchRequest, SearchResponse};

fn validate(request: &SearchRequest) -> Result<(), (StatusCode, AppError)> {
    if request.query.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::missing_field("Search query cannot be empty"),
        ));
    }
    if !(1..=100).contains(&request.limit) {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::validation("Search limit must be between 1 and 100"),
        ));
    }
    Ok(())
}

// Hybrid search within one project
pub async fn search(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<SearchRequest>,
) -> ApiResult<Json<SearchResponse>> {
    validate(&request)?;
    let project = fetch_project(&state, &slug).await?;

    let response = state
        .search
        .search(&project.slug, &project.graph_name, &request, None)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::OK, Json(response)))
}

// Fan-out search across every project
pub async fn fanout_search(
    State(state): State<SharedState>,
    ValidatedJson(request): ValidatedJson<SearchRequest>,
) -> ApiResult<Json<FanoutSearchResponse>> {
    validate(&request)?;

    let response = state
        .search
        .fanout(request)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::OK, Json(response)))
}
