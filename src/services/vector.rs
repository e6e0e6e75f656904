// Vector store gateway over Qdrant: per-project collection lifecycle,
// point upsert, similarity search and payload-filtered deletion.

use std::collections::HashMap;
use std::sync::Arc;

use qdrant_client::qdrant::{
    point_id::PointIdOptions, value::Kind, Condition, CreateCollectionBuilder,
    DeletePointsBuilder, Distance, Filter, PointId, PointStruct, PointsIdsList,
    ScrollPointsBuilder, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::database::models::ContentType;
use crate::error::{ServiceError, ServiceResult};

/// A chunk ready for upsert; the chunk row id doubles as the point id.
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub content_type: ContentType,
    pub chunk_index: i32,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub content: String,
    pub document_id: Option<String>,
    pub content_type: Option<String>,
    pub chunk_index: i64,
    pub metadata: Value,
}

#[derive(Clone)]
pub struct VectorService {
    client: Arc<Qdrant>,
    dimension: u64,
}

impl VectorService {
    pub fn new(settings: &Settings) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let client = Qdrant::from_url(&settings.qdrant_url).build()?;
        Ok(Self {
            client: Arc::new(client),
            dimension: settings.embedding_dimensions as u64,
        })
    }

    fn collection_name(project_slug: &str) -> String {
        format!("project_{project_slug}_chunks")
    }

    /// Create the project collection; an existing one counts as success.
    pub async fn create_collection(&self, project_slug: &str) -> ServiceResult<()> {
        let collection = Self::collection_name(project_slug);

        let result = self
            .client
            .create_collection(
                CreateCollectionBuilder::new(&collection)
                    .vectors_config(VectorParamsBuilder::new(self.dimension, Distance::Cosine)),
            )
            .await;

        match result {
            Ok(_) => {
                info!(collection = %collection, "Vector collection created");
                Ok(())
            }
            Err(e) if e.to_string().contains("already exists") => {
                info!(collection = %collection, "Vector collection exists");
                Ok(())
            }
            Err(e) => Err(ServiceError::Vector(e.to_string())),
        }
    }

    /// Drop the project collection, best-effort.
    pub async fn delete_collection(&self, project_slug: &str) -> bool {
        let collection = Self::collection_name(project_slug);
        match self.client.delete_collection(&collection).await {
            Ok(_) => {
                info!(collection = %collection, "Vector collection deleted");
                true
            }
            Err(e) => {
                warn!(collection = %collection, error = %e, "Failed to delete collection");
                false
            }
        }
    }

    /// Insert or update chunk points with their embeddings.
    pub async fn upsert_chunks(
        &self,
        project_slug: &str,
        chunks: &[ChunkPoint],
        vectors: &[Vec<f32>],
    ) -> ServiceResult<usize> {
        let collection = Self::collection_name(project_slug);

        let mut points = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let payload = Payload::try_from(serde_json::json!({
                "chunk_id": chunk.id.to_string(),
                "document_id": chunk.document_id.to_string(),
                "content": chunk.content,
                "content_type": chunk.content_type.as_str(),
                "chunk_index": chunk.chunk_index,
                "metadata": chunk.metadata,
            }))
            .map_err(|e| ServiceError::Vector(e.to_string()))?;

            points.push(PointStruct::new(
                chunk.id.to_string(),
                vector.clone(),
                payload,
            ));
        }

        let count = points.len();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&collection, points).wait(true))
            .await
            .map_err(|e| ServiceError::Vector(e.to_string()))?;

        info!(collection = %collection, count, "Chunks upserted");
        Ok(count)
    }

    /// Cosine similarity search, optionally restricted to content types.
    pub async fn search(
        &self,
        project_slug: &str,
        query_vector: &[f32],
        limit: usize,
        content_types: Option<&[ContentType]>,
    ) -> ServiceResult<Vec<VectorHit>> {
        let collection = Self::collection_name(project_slug);

        let mut builder =
            SearchPointsBuilder::new(&collection, query_vector.to_vec(), limit as u64)
                .with_payload(true);

        if let Some(types) = content_types {
            if !types.is_empty() {
                let conditions: Vec<Condition> = types
                    .iter()
                    .map(|ct| Condition::matches("content_type", ct.as_str().to_string()))
                    .collect();
                builder = builder.filter(Filter::should(conditions));
            }
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| ServiceError::Vector(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let id = point_id_to_string(point.id)?;
                Some(VectorHit {
                    id,
                    score: point.score,
                    content: payload_string(&point.payload, "content").unwrap_or_default(),
                    document_id: payload_string(&point.payload, "document_id"),
                    content_type: payload_string(&point.payload, "content_type"),
                    chunk_index: payload_integer(&point.payload, "chunk_index").unwrap_or(0),
                    metadata: point
                        .payload
                        .get("metadata")
                        .map(qdrant_value_to_json)
                        .unwrap_or(Value::Null),
                })
            })
            .collect())
    }

    /// Delete every point belonging to a document via a payload filter,
    /// scrolling until the engine reports no further page.
    pub async fn delete_by_document(
        &self,
        project_slug: &str,
        document_id: Uuid,
    ) -> ServiceResult<usize> {
        let collection = Self::collection_name(project_slug);
        let filter = Filter::must([Condition::matches(
            "document_id",
            document_id.to_string(),
        )]);

        let mut point_ids: Vec<PointId> = Vec::new();
        let mut offset: Option<PointId> = None;

        loop {
            let mut builder = ScrollPointsBuilder::new(&collection)
                .filter(filter.clone())
                .limit(100)
                .with_payload(false);
            if let Some(next) = offset.take() {
                builder = builder.offset(next);
            }

            let response = self
                .client
                .scroll(builder)
                .await
                .map_err(|e| ServiceError::Vector(e.to_string()))?;

            point_ids.extend(response.result.into_iter().filter_map(|p| p.id));

            match response.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        if !point_ids.is_empty() {
            self.client
                .delete_points(
                    DeletePointsBuilder::new(&collection)
                        .points(PointsIdsList {
                            ids: point_ids.clone(),
                        })
                        .wait(true),
                )
                .await
                .map_err(|e| ServiceError::Vector(e.to_string()))?;
        }

        info!(document_id = %document_id, count = point_ids.len(), "Chunks deleted");
        Ok(point_ids.len())
    }

    /// Delete specific points by id.
    pub async fn delete_points(
        &self,
        project_slug: &str,
        point_ids: &[Uuid],
    ) -> ServiceResult<usize> {
        if point_ids.is_empty() {
            return Ok(0);
        }
        let collection = Self::collection_name(project_slug);

        let ids: Vec<PointId> = point_ids.iter().map(|id| id.to_string().into()).collect();
        self.client
            .delete_points(
                DeletePointsBuilder::new(&collection)
                    .points(PointsIdsList { ids })
                    .wait(true),
            )
            .await
            .map_err(|e| ServiceError::Vector(e.to_string()))?;

        info!(collection = %collection, count = point_ids.len(), "Points deleted");
        Ok(point_ids.len())
    }
}

fn point_id_to_string(id: Option<PointId>) -> Option<String> {
    match id?.point_id_options? {
        PointIdOptions::Uuid(uuid) => Some(uuid),
        PointIdOptions::Num(num) => Some(num.to_string()),
    }
}

fn payload_string(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
    key: &str,
) -> Option<String> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::StringValue(s) => Some(s.clone()),
        _ => None,
    }
}

fn payload_integer(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
    key: &str,
) -> Option<i64> {
    match payload.get(key)?.kind.as_ref()? {
        Kind::IntegerValue(i) => Some(*i),
        _ => None,
    }
}

fn qdrant_value_to_json(value: &qdrant_client::qdrant::Value) -> Value {
    match value.kind.as_ref() {
        Some(Kind::StringValue(s)) => Value::String(s.clone()),
        Some(Kind::IntegerValue(i)) => Value::from(*i),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map(Value::Number).unwrap_or(Value::Null)
        }
        Some(Kind::BoolValue(b)) => Value::Bool(*b),
        Some(Kind::StructValue(s)) => Value::Object(
            s.fields
                .iter()
                .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
                .collect(),
        ),
        Some(Kind::ListValue(l)) => {
            Value::Array(l.values.iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::NullValue(_)) | None => Value::Null,
    }
}
