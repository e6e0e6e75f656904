// Document ingestion orchestrator: idempotent re-processing through
// chunk → embed → vector upsert → extraction → graph merge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::models::{
    ContentType, DocumentRow, EntityCreate, EntityType, ProcessDocumentResponse, ProjectRow,
    RelationshipCreate, RelationshipType,
};
use crate::database::queries::{chunks, documents};
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::services::chunking::ChunkingService;
use crate::services::embedding::EmbeddingService;
use crate::services::extraction::ExtractionService;
use crate::services::graph::GraphService;
use crate::services::vector::{ChunkPoint, VectorService};

#[derive(Clone)]
pub struct IngestionService {
    db: Database,
    vector: VectorService,
    embedding: EmbeddingService,
    extraction: ExtractionService,
    graph: GraphService,
    chunking: Arc<ChunkingService>,
}

impl IngestionService {
    pub fn new(
        db: Database,
        vector: VectorService,
        embedding: EmbeddingService,
        extraction: ExtractionService,
        graph: GraphService,
        chunking: Arc<ChunkingService>,
    ) -> Self {
        Self {
            db,
            vector,
            embedding,
            extraction,
            graph,
            chunking,
        }
    }

    /// Run the full ingestion pipeline for one document.
    ///
    /// The vector path is the critical path: any failure there is recorded
    /// on the document row and surfaced. Extraction runs afterwards and is
    /// best-effort.
    pub async fn process_document(
        &self,
        project: &ProjectRow,
        document_id: Uuid,
    ) -> ServiceResult<ProcessDocumentResponse> {
        let start = Instant::now();

        let document = documents::get_document(self.db.pool(), document_id, project.id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Document '{document_id}'")))?;

        if document.raw_content.trim().is_empty() {
            return Err(ServiceError::Validation(
                "Document has no content to process".to_string(),
            ));
        }

        match self.run_pipeline(project, &document, start).await {
            Ok(response) => Ok(response),
            Err(e) => {
                error!(document_id = %document_id, error = %e, "Document processing failed");
                if let Err(db_err) =
                    documents::record_error(self.db.pool(), document_id, &e.to_string()).await
                {
                    error!(document_id = %document_id, error = %db_err, "Failed to record processing error");
                }
                Err(e)
            }
        }
    }

    async fn run_pipeline(
        &self,
        project: &ProjectRow,
        document: &DocumentRow,
        start: Instant,
    ) -> ServiceResult<ProcessDocumentResponse> {
        // Idempotent reset: clear any chunks and points from a prior run
        // before inserting the new ones.
        let existing_points = chunks::list_point_ids(self.db.pool(), document.id).await?;
        if !existing_points.is_empty() {
            match self.vector.delete_points(&project.slug, &existing_points).await {
                Ok(count) => {
                    info!(document_id = %document.id, count, "Deleted existing vector points")
                }
                Err(e) => warn!(document_id = %document.id, error = %e, "Failed to delete vector points"),
            }
        }
        let deleted = chunks::delete_for_document(self.db.pool(), document.id).await?;
        if deleted > 0 {
            info!(document_id = %document.id, count = deleted, "Deleted existing chunks");
        }

        let text_chunks = self.chunking.chunk_text(&document.raw_content);
        info!(document_id = %document.id, num_chunks = text_chunks.len(), "Document chunked");

        if text_chunks.is_empty() {
            documents::mark_processed(self.db.pool(), document.id).await?;
            return Ok(ProcessDocumentResponse {
                document_id: document.id,
                chunks_created: 0,
                entities_extracted: 0,
                relationships_created: 0,
                duration_ms: start.elapsed().as_millis() as u64,
            });
        }

        // One batched embedding call for all chunks.
        let chunk_texts: Vec<String> = text_chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedding.embed_texts(&chunk_texts).await?;
        info!(document_id = %document.id, num_embeddings = embeddings.len(), "Embeddings generated");

        let content_type = ContentType::from_str(&document.content_type).unwrap_or_default();

        // Insert chunk rows; the row id doubles as the vector point id.
        let mut points = Vec::with_capacity(text_chunks.len());
        for chunk in &text_chunks {
            let chunk_id = Uuid::new_v4();
            chunks::insert_chunk(
                self.db.pool(),
                &chunks::NewChunk {
                    id: chunk_id,
                    document_id: document.id,
                    content: &chunk.content,
                    chunk_index: chunk.index as i32,
                    token_count: chunk.token_count as i32,
                    vector_point_id: chunk_id,
                    metadata: json!({
                        "start_char": chunk.start_char,
                        "end_char": chunk.end_char,
                    }),
                },
            )
            .await?;

            points.push(ChunkPoint {
                id: chunk_id,
                document_id: document.id,
                content: chunk.content.clone(),
                content_type,
                chunk_index: chunk.index as i32,
                metadata: json!({ "filename": document.filename }),
            });
        }

        self.vector
            .upsert_chunks(&project.slug, &points, &embeddings)
            .await?;
        info!(
            document_id = %document.id,
            collection = %format!("project_{}_chunks", project.slug),
            "Chunks stored in vector collection"
        );

        documents::mark_processed(self.db.pool(), document.id).await?;

        // Extraction phase: best-effort, never fails the ingest.
        let mut entities_extracted = 0;
        let mut relationships_created = 0;

        if self.extraction.is_configured() {
            match self
                .extract_to_graph(project, document, &chunk_texts, content_type)
                .await
            {
                Ok((entities, relationships)) => {
                    entities_extracted = entities;
                    relationships_created = relationships;
                }
                Err(e) => {
                    warn!(
                        document_id = %document.id,
                        error = %e,
                        "Entity extraction failed, continuing without graph"
                    );
                }
            }
        } else {
            info!("Skipping entity extraction - provider not configured");
        }

        Ok(ProcessDocumentResponse {
            document_id: document.id,
            chunks_created: text_chunks.len(),
            entities_extracted,
            relationships_created,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Store extracted entities and relationships in the project graph,
    /// resolving temp ids to graph ids as creations succeed.
    async fn extract_to_graph(
        &self,
        project: &ProjectRow,
        document: &DocumentRow,
        chunk_texts: &[String],
        content_type: ContentType,
    ) -> ServiceResult<(usize, usize)> {
        let mut context = Vec::new();
        if let Some(filename) = &document.filename {
            context.push(("filename".to_string(), filename.clone()));
        }
        context.push(("document_id".to_string(), document.id.to_string()));

        let result = self
            .extraction
            .extract_from_document(chunk_texts, content_type, &context)
            .await?;

        info!(
            document_id = %document.id,
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            "Entities extracted"
        );

        let mut id_map: HashMap<String, String> = HashMap::new();
        let mut entities_stored = 0;

        for entity in &result.entities {
            let Some(entity_type) = EntityType::from_str(&entity.entity_type) else {
                warn!(name = %entity.name, entity_type = %entity.entity_type, "Skipping entity with unknown label");
                continue;
            };

            let mut properties = entity.properties.clone();
            properties.insert(
                "document_id".to_string(),
                Value::String(document.id.to_string()),
            );
            properties.insert(
                "source".to_string(),
                document
                    .filename
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            );

            let create = EntityCreate {
                name: entity.name.clone(),
                entity_type,
                properties,
            };

            match self.graph.create_entity(&project.graph_name, &create).await {
                Ok(created) => {
                    id_map.insert(entity.temp_id.clone(), created.id);
                    entities_stored += 1;
                }
                Err(e) => {
                    warn!(name = %entity.name, error = %e, "Failed to store extracted entity")
                }
            }
        }

        let mut relationships_stored = 0;
        for rel in &result.relationships {
            let (Some(source_id), Some(target_id)) =
                (id_map.get(&rel.source), id_map.get(&rel.target))
            else {
                continue;
            };
            let Some(relationship_type) = RelationshipType::from_str(&rel.relationship_type)
            else {
                warn!(relationship_type = %rel.relationship_type, "Skipping relationship with unknown label");
                continue;
            };

            let create = RelationshipCreate {
                source_id: source_id.clone(),
                target_id: target_id.clone(),
                relationship_type,
                properties: rel.properties.clone(),
            };

            match self
                .graph
                .create_relationship(&project.graph_name, &create)
                .await
            {
                Ok(_) => relationships_stored += 1,
                Err(e) => warn!(error = %e, "Failed to store extracted relationship"),
            }
        }

        info!(
            document_id = %document.id,
            entities_stored,
            relationships_stored,
            "Graph updated"
        );

        Ok((entities_stored, relationships_stored))
    }
}
