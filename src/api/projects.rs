use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::{error, warn};

use crate::api::{
    errors::{ApiResult, AppError},
    fetch_project,
    state::SharedState,
    ValidatedJson,
};
use crate::database::models::{CreateProjectRequest, ProjectListResponse, ProjectResponse};
use crate::database::queries::projects;
use crate::utils::{graph_name_for_slug, slugify};

// List projects
pub async fn list_projects(State(state): State<SharedState>) -> ApiResult<Json<ProjectListResponse>> {
    let rows = projects::list_projects(state.db.pool()).await.map_err(|e| {
        error!(error = %e, "Failed to list projects");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            AppError::internal_error("Failed to list projects"),
        )
    })?;

    let total = rows.len() as i64;
    let response = ProjectListResponse {
        projects: rows
            .into_iter()
            .map(|row| ProjectResponse::from_row(row, None))
            .collect(),
        total,
    };

    Ok((StatusCode::OK, Json(response)))
}

// Create project with its graph namespace and vector collection
pub async fn create_project(
    State(state): State<SharedState>,
    ValidatedJson(request): ValidatedJson<CreateProjectRequest>,
) -> ApiResult<Json<ProjectResponse>> {
    if request.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::missing_field("Project name cannot be empty"),
        ));
    }

    if let Some(slug) = &request.slug {
        if slug.is_empty()
            || !slug
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err((
                StatusCode::BAD_REQUEST,
                AppError::validation("Slug may only contain lowercase letters, digits and hyphens"),
            ));
        }
    }

    let slug = request.slug.clone().unwrap_or_else(|| slugify(&request.name));
    if slug.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::validation("Project name does not produce a valid slug"),
        ));
    }
    let graph_name = graph_name_for_slug(&slug);

    match projects::get_project_by_slug(state.db.pool(), &slug).await {
        Ok(Some(_)) => {
            return Err((
                StatusCode::CONFLICT,
                AppError::conflict(format!("Project with slug '{slug}' already exists")),
            ));
        }
        Ok(None) => {}
        Err(e) => {
            error!(error = %e, "Failed to check slug");
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                AppError::internal_error("Failed to create project"),
            ));
        }
    }

    let row = projects::create_project(
        state.db.pool(),
        &request.name,
        &slug,
        &graph_name,
        request.description.as_deref(),
        request.settings.as_ref(),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Failed to create project");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            AppError::internal_error("Failed to create project"),
        )
    })?;

    state
        .graph
        .create_graph(&graph_name)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;
    state
        .vector
        .create_collection(&slug)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((
        StatusCode::CREATED,
        Json(ProjectResponse::from_row(row, None)),
    ))
}

// Get project with graph stats
pub async fn get_project(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> ApiResult<Json<ProjectResponse>> {
    let row = fetch_project(&state, &slug).await?;

    let stats = match state.graph.get_graph_stats(&row.graph_name).await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(slug = %slug, error = %e, "Failed to load graph stats");
            None
        }
    };

    Ok((StatusCode::OK, Json(ProjectResponse::from_row(row, stats))))
}

// Delete project, its graph and its vector collection
pub async fn delete_project(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> ApiResult<()> {
    let row = fetch_project(&state, &slug).await?;

    // Best-effort cross-store cleanup: failures are logged, the project row
    // is removed regardless.
    state.graph.drop_graph(&row.graph_name).await;
    state.vector.delete_collection(&slug).await;

    projects::delete_project(state.db.pool(), &slug)
        .await
        .map_err(|e| {
            error!(slug = %slug, error = %e, "Failed to delete project");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                AppError::internal_error("Failed to delete project"),
            )
        })?;

    Ok((StatusCode::NO_CONTENT, ()))
}
