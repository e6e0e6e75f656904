use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::api::{
    errors::{ApiResult, AppError},
    fetch_project,
    state::SharedState,
    ValidatedJson,
};
use crate::database::models::{
    ContentType, CreateDocumentRequest, DocumentListResponse, DocumentResponse,
    ProcessDocumentResponse,
};
use crate::database::queries::{chunks, documents};

#[derive(Deserialize, JsonSchema)]
pub struct DocumentListQuery {
    pub content_type: Option<ContentType>,
    pub processed: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

// List documents with chunk counts
pub async fn list_documents(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Query(params): Query<DocumentListQuery>,
) -> ApiResult<Json<DocumentListResponse>> {
    let project = fetch_project(&state, &slug).await?;
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);
    let offset = params.offset.unwrap_or(0).max(0);

    let rows = documents::list_documents(
        state.db.pool(),
        project.id,
        params.content_type.map(|ct| ct.as_str()),
        params.processed,
        limit,
        offset,
    )
    .await
    .map_err(|e| {
        error!(slug = %slug, error = %e, "Failed to list documents");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            AppError::internal_error("Failed to list documents"),
        )
    })?;

    let mut items = Vec::with_capacity(rows.len());
    for row in rows {
        let chunk_count = chunks::count_for_document(state.db.pool(), row.id)
            .await
            .unwrap_or(0);
        items.push(DocumentResponse::from_row(row, Some(chunk_count)));
    }

    let total = documents::count_documents(state.db.pool(), project.id)
        .await
        .unwrap_or(items.len() as i64);

    Ok((
        StatusCode::OK,
        Json(DocumentListResponse {
            documents: items,
            total,
        }),
    ))
}

// Upload a document
pub async fn create_document(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<CreateDocumentRequest>,
) -> ApiResult<Json<DocumentResponse>> {
    let project = fetch_project(&state, &slug).await?;

    if request.raw_content.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::missing_field("Document content cannot be empty"),
        ));
    }

    let row = documents::create_document(state.db.pool(), project.id, &request)
        .await
        .map_err(|e| {
            error!(slug = %slug, error = %e, "Failed to create document");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                AppError::internal_error("Failed to create document"),
            )
        })?;

    Ok((
        StatusCode::CREATED,
        Json(DocumentResponse::from_row(row, None)),
    ))
}

// Get a document with its chunk count
pub async fn get_document(
    State(state): State<SharedState>,
    Path((slug, document_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<DocumentResponse>> {
    let project = fetch_project(&state, &slug).await?;

    let row = documents::get_document(state.db.pool(), document_id, project.id)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to get document");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                AppError::internal_error("Failed to get document"),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                AppError::not_found(&format!("Document '{document_id}'")),
            )
        })?;

    let chunk_count = chunks::count_for_document(state.db.pool(), document_id)
        .await
        .unwrap_or(0);

    Ok((
        StatusCode::OK,
        Json(DocumentResponse::from_row(row, Some(chunk_count))),
    ))
}

// Delete a document, its chunk rows and its vector points
pub async fn delete_document(
    State(state): State<SharedState>,
    Path((slug, document_id)): Path<(String, Uuid)>,
) -> ApiResult<()> {
    let project = fetch_project(&state, &slug).await?;

    documents::get_document(state.db.pool(), document_id, project.id)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to get document");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                AppError::internal_error("Failed to delete document"),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                AppError::not_found(&format!("Document '{document_id}'")),
            )
        })?;

    state
        .vector
        .delete_by_document(&slug, document_id)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    documents::delete_document(state.db.pool(), document_id)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to delete document");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                AppError::internal_error("Failed to delete document"),
            )
        })?;

    Ok((StatusCode::NO_CONTENT, ()))
}

// Run the ingestion pipeline for a document
pub async fn process_document(
    State(state): State<SharedState>,
    Path((slug, document_id)): Path<(String, Uuid)>,
) -> ApiResult<Json<ProcessDocumentResponse>> {
    let project = fetch_project(&state, &slug).await?;

    let response = state
        .ingestion
        .process_document(&project, document_id)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::OK, Json(response)))
}
