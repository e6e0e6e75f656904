use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::api::{
    errors::{ApiResult, AppError},
    fetch_project,
    state::SharedState,
    ValidatedJson,
};
use crate::database::models::{
    BatchCreateRequest, BatchCreateResponse, BatchDeleteRequest, BatchDeleteResponse,
    CypherRequest, CypherResponse, DeduplicateRequest, DeduplicateResponse, EntityCreate,
    EntityListResponse, EntityRelationshipsResponse, EntityResponse, EntityType,
    FindEntityResponse, RelationshipCreate, RelationshipCreated, RelationshipDirection,
    RelationshipListResponse, RelationshipType, UpsertEntityRequest, UpsertResponse,
};
use crate::database::{parse_return_columns, JsonMap};
use crate::error::ServiceError;
use crate::services::graph::has_dangerous_keywords;

const MAX_BATCH_ENTITIES: usize = 100;
const MAX_BATCH_RELATIONSHIPS: usize = 500;

#[derive(Deserialize, JsonSchema)]
pub struct EntityListQuery {
    #[serde(rename = "type")]
    pub entity_type: Option<EntityType>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

// List entities ordered by name
pub async fn list_entities(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Query(params): Query<EntityListQuery>,
) -> ApiResult<Json<EntityListResponse>> {
    let project = fetch_project(&state, &slug).await?;
    let page = params.page.unwrap_or(1).max(1);
    let page_size = params.page_size.unwrap_or(50).clamp(1, 500);
    let offset = (page - 1) * page_size;

    let entities = state
        .graph
        .list_entities(&project.graph_name, params.entity_type, page_size, offset)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    let total = entities.len() as i64;
    Ok((
        StatusCode::OK,
        Json(EntityListResponse {
            entities,
            total,
            page,
            page_size,
        }),
    ))
}

// Create an entity
pub async fn create_entity(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<EntityCreate>,
) -> ApiResult<Json<EntityResponse>> {
    let project = fetch_project(&state, &slug).await?;

    if request.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::missing_field("Entity name cannot be empty"),
        ));
    }

    let entity = state
        .graph
        .create_entity(&project.graph_name, &request)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::CREATED, Json(entity)))
}

// Create-or-merge an entity by (name, type)
pub async fn upsert_entity(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<UpsertEntityRequest>,
) -> ApiResult<Json<UpsertResponse>> {
    let project = fetch_project(&state, &slug).await?;

    if request.name.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::missing_field("Entity name cannot be empty"),
        ));
    }

    let entity = EntityCreate {
        name: request.name.clone(),
        entity_type: request.entity_type,
        properties: request.properties.clone(),
    };

    let (response, _created) = state
        .graph
        .upsert_entity(&project.graph_name, &entity, request.description.as_deref())
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::OK, Json(response)))
}

#[derive(Deserialize, JsonSchema)]
pub struct FindEntityQuery {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: Option<EntityType>,
}

// Find entities by exact name (case-insensitive)
pub async fn find_entity(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Query(params): Query<FindEntityQuery>,
) -> ApiResult<Json<FindEntityResponse>> {
    if params.name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::missing_field("'name' query parameter is required"),
        ));
    }

    let project = fetch_project(&state, &slug).await?;

    let entities = state
        .graph
        .find_entity_by_name(&project.graph_name, &params.name, params.entity_type)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    let total = entities.len() as i64;
    Ok((StatusCode::OK, Json(FindEntityResponse { entities, total })))
}

// Delete multiple entities, with a safety snapshot first
pub async fn batch_delete_entities(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<BatchDeleteRequest>,
) -> ApiResult<Json<BatchDeleteResponse>> {
    let project = fetch_project(&state, &slug).await?;

    state
        .snapshot
        .create(
            project.id,
            &project.graph_name,
            Some(&format!(
                "Auto before batch_delete ({} entities)",
                request.entity_ids.len()
            )),
            "auto_pre_batch_delete",
        )
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    let deleted = state
        .graph
        .batch_delete(&project.graph_name, &request.entity_ids)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::OK, Json(BatchDeleteResponse { deleted })))
}

// Find duplicate groups and optionally merge them
pub async fn deduplicate_entities(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<DeduplicateRequest>,
) -> ApiResult<Json<DeduplicateResponse>> {
    let project = fetch_project(&state, &slug).await?;

    let groups = state
        .graph
        .find_duplicates(&project.graph_name, request.entity_type)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    let total_duplicates: usize = groups
        .iter()
        .map(|g| g.entities.len().saturating_sub(1))
        .sum();

    let mut merged = 0;
    if !request.dry_run && !groups.is_empty() {
        state
            .snapshot
            .create(
                project.id,
                &project.graph_name,
                Some(&format!("Auto before deduplicate ({total_duplicates} duplicates)")),
                "auto_pre_deduplicate",
            )
            .await
            .map_err(Into::<(StatusCode, AppError)>::into)?;

        for group in &groups {
            let remove_ids: Vec<String> = group
                .entities
                .iter()
                .map(|e| e.id.clone())
                .filter(|id| *id != group.recommended_keep)
                .collect();
            if remove_ids.is_empty() {
                continue;
            }

            state
                .graph
                .merge_duplicates(&project.graph_name, &group.recommended_keep, &remove_ids)
                .await
                .map_err(Into::<(StatusCode, AppError)>::into)?;
            merged += remove_ids.len();
        }
    }

    Ok((
        StatusCode::OK,
        Json(DeduplicateResponse {
            duplicate_groups: groups,
            total_duplicates,
            merged,
        }),
    ))
}

// Get an entity with its connections
pub async fn get_entity(
    State(state): State<SharedState>,
    Path((slug, entity_id)): Path<(String, String)>,
) -> ApiResult<Json<EntityResponse>> {
    let project = fetch_project(&state, &slug).await?;

    let entity = state
        .graph
        .get_entity(&project.graph_name, &entity_id)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                AppError::not_found(&format!("Entity '{entity_id}'")),
            )
        })?;

    Ok((StatusCode::OK, Json(entity)))
}

// Patch entity properties; null values remove the property
pub async fn update_entity(
    State(state): State<SharedState>,
    Path((slug, entity_id)): Path<(String, String)>,
    ValidatedJson(updates): ValidatedJson<JsonMap>,
) -> ApiResult<Json<EntityResponse>> {
    let project = fetch_project(&state, &slug).await?;

    let entity = state
        .graph
        .update_entity(&project.graph_name, &entity_id, &updates)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                AppError::not_found(&format!("Entity '{entity_id}'")),
            )
        })?;

    Ok((StatusCode::OK, Json(entity)))
}

// Delete an entity and its relationships
pub async fn delete_entity(
    State(state): State<SharedState>,
    Path((slug, entity_id)): Path<(String, String)>,
) -> ApiResult<()> {
    let project = fetch_project(&state, &slug).await?;

    let deleted = state
        .graph
        .delete_entity(&project.graph_name, &entity_id)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    if !deleted {
        return Err((
            StatusCode::NOT_FOUND,
            AppError::not_found(&format!("Entity '{entity_id}'")),
        ));
    }

    Ok((StatusCode::NO_CONTENT, ()))
}

#[derive(Deserialize, JsonSchema)]
pub struct EntityRelationshipsQuery {
    #[serde(default)]
    pub direction: RelationshipDirection,
    #[serde(rename = "type")]
    pub relationship_type: Option<RelationshipType>,
}

// Relationships for one entity
pub async fn get_entity_relationships(
    State(state): State<SharedState>,
    Path((slug, entity_id)): Path<(String, String)>,
    Query(params): Query<EntityRelationshipsQuery>,
) -> ApiResult<Json<EntityRelationshipsResponse>> {
    let project = fetch_project(&state, &slug).await?;

    let relationships = state
        .graph
        .get_entity_relationships(
            &project.graph_name,
            &entity_id,
            params.direction,
            params.relationship_type,
        )
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    let total = relationships.len() as i64;
    Ok((
        StatusCode::OK,
        Json(EntityRelationshipsResponse {
            relationships,
            total,
        }),
    ))
}

#[derive(Deserialize, JsonSchema)]
pub struct RelationshipListQuery {
    pub limit: Option<i64>,
}

// List relationships
pub async fn list_relationships(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Query(params): Query<RelationshipListQuery>,
) -> ApiResult<Json<RelationshipListResponse>> {
    let project = fetch_project(&state, &slug).await?;
    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    let relationships = state
        .graph
        .list_relationships(&project.graph_name, limit)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    let total = relationships.len() as i64;
    Ok((
        StatusCode::OK,
        Json(RelationshipListResponse {
            relationships,
            total,
        }),
    ))
}

// Create a relationship between existing entities
pub async fn create_relationship(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<RelationshipCreate>,
) -> ApiResult<Json<RelationshipCreated>> {
    let project = fetch_project(&state, &slug).await?;

    let created = state
        .graph
        .create_relationship(&project.graph_name, &request)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::CREATED, Json(created)))
}

// Execute a read-only Cypher query
pub async fn execute_cypher(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<CypherRequest>,
) -> ApiResult<Json<CypherResponse>> {
    if request.query.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::missing_field("Query cannot be empty"),
        ));
    }

    if has_dangerous_keywords(&request.query) {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::restricted_keyword(
                "Query contains restricted keywords (DELETE, CREATE, DROP, SET, REMOVE, MERGE, DETACH, CALL). Use the dedicated endpoints for mutations.",
            ),
        ));
    }

    let project = fetch_project(&state, &slug).await?;
    let columns = parse_return_columns(&request.query);

    // Engine errors surface verbatim on this endpoint.
    let rows = state
        .db
        .execute_cypher(&project.graph_name, &request.query)
        .await
        .map_err(|e| match e {
            ServiceError::Graph(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                AppError::internal_error(message),
            ),
            other => other.into(),
        })?;

    let row_count = rows.len();
    Ok((
        StatusCode::OK,
        Json(CypherResponse {
            results: rows.into_iter().map(Value::Object).collect(),
            columns,
            row_count,
        }),
    ))
}

// Batch create entities and relationships with ref resolution
pub async fn batch_create(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    ValidatedJson(request): ValidatedJson<BatchCreateRequest>,
) -> ApiResult<Json<BatchCreateResponse>> {
    if request.entities.len() > MAX_BATCH_ENTITIES {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::batch_limit(format!(
                "Batch create accepts at most {MAX_BATCH_ENTITIES} entities"
            )),
        ));
    }
    if request.relationships.len() > MAX_BATCH_RELATIONSHIPS {
        return Err((
            StatusCode::BAD_REQUEST,
            AppError::batch_limit(format!(
                "Batch create accepts at most {MAX_BATCH_RELATIONSHIPS} relationships"
            )),
        ));
    }

    let project = fetch_project(&state, &slug).await?;

    let response = state
        .graph
        .batch_create(&project.graph_name, &request.entities, &request.relationships)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((StatusCode::OK, Json(response)))
}
