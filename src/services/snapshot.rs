// Snapshot service: full-graph export, point-in-time restore with a safety
// snapshot, and retention pruning.

use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::database::models::{
    EntityCreate, EntityType, ExportedEntity, ExportedRelationship, GraphExport,
    RelationshipCreate, RelationshipType, RestoreResponse, SnapshotDetail, SnapshotDetailRow,
    SnapshotResponse, SnapshotRow,
};
use crate::database::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::services::graph::GraphService;

pub const MAX_SNAPSHOTS_PER_PROJECT: i64 = 20;

// Paging bound for a full export.
const EXPORT_LIMIT: i64 = 100_000;

#[derive(Clone)]
pub struct SnapshotService {
    db: Database,
    graph: GraphService,
}

impl SnapshotService {
    pub fn new(db: Database, graph: GraphService) -> Self {
        Self { db, graph }
    }

    /// Create the snapshots table and its index if absent.
    pub async fn ensure_table(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS public.kg_snapshots (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                project_id UUID NOT NULL REFERENCES public.projects(id),
                label TEXT,
                trigger TEXT NOT NULL DEFAULT 'manual',
                graph_data JSONB NOT NULL,
                entity_count INT NOT NULL DEFAULT 0,
                relationship_count INT NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(self.db.pool())
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_kg_snapshots_project
                ON public.kg_snapshots(project_id, created_at DESC)
            "#,
        )
        .execute(self.db.pool())
        .await?;

        Ok(())
    }

    /// Export every entity and relationship of a graph in canonical shape.
    pub async fn export_all(&self, graph_name: &str) -> ServiceResult<GraphExport> {
        let entities = self
            .graph
            .list_entities(graph_name, None, EXPORT_LIMIT, 0)
            .await?;
        let relationships = self.graph.list_relationships(graph_name, EXPORT_LIMIT).await?;

        Ok(GraphExport {
            entities: entities
                .into_iter()
                .map(|e| ExportedEntity {
                    age_id: e.id,
                    name: e.name,
                    entity_type: e.entity_type,
                    properties: e.properties.as_object().cloned().unwrap_or_default(),
                })
                .collect(),
            relationships: relationships
                .into_iter()
                .map(|r| ExportedRelationship {
                    age_id: r.id,
                    source_id: r.source_id,
                    target_id: r.target_id,
                    relationship_type: if r.relationship_type.is_empty() {
                        "RELATED_TO".to_string()
                    } else {
                        r.relationship_type
                    },
                    properties: r.properties.as_object().cloned().unwrap_or_default(),
                    source_name: r.source_name,
                    target_name: r.target_name,
                })
                .collect(),
        })
    }

    /// Snapshot the current graph state, then prune beyond the retention
    /// limit.
    pub async fn create(
        &self,
        project_id: Uuid,
        graph_name: &str,
        label: Option<&str>,
        trigger: &str,
    ) -> ServiceResult<SnapshotResponse> {
        let export = self.export_all(graph_name).await?;
        let entity_count = export.entities.len() as i32;
        let relationship_count = export.relationships.len() as i32;
        let graph_data = serde_json::to_value(&export)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let row: SnapshotRow = sqlx::query_as(
            r#"
            INSERT INTO public.kg_snapshots (project_id, label, trigger, graph_data, entity_count, relationship_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, project_id, label, trigger, entity_count, relationship_count, created_at
            "#,
        )
        .bind(project_id)
        .bind(label)
        .bind(trigger)
        .bind(&graph_data)
        .bind(entity_count)
        .bind(relationship_count)
        .fetch_one(self.db.pool())
        .await?;

        info!(
            snapshot_id = %row.id,
            entities = entity_count,
            relationships = relationship_count,
            trigger,
            "Snapshot created"
        );

        self.prune(project_id).await?;

        Ok(row.into())
    }

    /// List snapshots for a project, newest first.
    pub async fn list(&self, project_id: Uuid, limit: i64) -> ServiceResult<Vec<SnapshotResponse>> {
        let rows: Vec<SnapshotRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, label, trigger, entity_count, relationship_count, created_at
            FROM public.kg_snapshots
            WHERE project_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(project_id)
        .bind(limit)
        .fetch_all(self.db.pool())
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Fetch one snapshot including its full graph data.
    pub async fn get(&self, snapshot_id: Uuid) -> ServiceResult<Option<SnapshotDetail>> {
        let row: Option<SnapshotDetailRow> = sqlx::query_as(
            r#"
            SELECT id, project_id, label, trigger, graph_data, entity_count, relationship_count, created_at
            FROM public.kg_snapshots
            WHERE id = $1
            "#,
        )
        .bind(snapshot_id)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(row.map(Into::into))
    }

    pub async fn delete(&self, snapshot_id: Uuid) -> ServiceResult<bool> {
        let result = sqlx::query("DELETE FROM public.kg_snapshots WHERE id = $1")
            .bind(snapshot_id)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Rebuild a graph from a snapshot.
    ///
    /// Sequence: safety snapshot of the current state, drop and recreate the
    /// graph, recreate entities building an old→new id map, then recreate
    /// relationships through the map (skipping any with a missing endpoint).
    pub async fn restore(
        &self,
        snapshot_id: Uuid,
        graph_name: &str,
        project_id: Uuid,
    ) -> ServiceResult<RestoreResponse> {
        let snapshot = self
            .get(snapshot_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Snapshot '{snapshot_id}'")))?;

        let export: GraphExport = serde_json::from_value(snapshot.graph_data)
            .map_err(|e| ServiceError::Internal(format!("corrupt snapshot data: {e}")))?;

        let pre_snapshot = self
            .create(
                project_id,
                graph_name,
                Some(&format!("Auto pre-restore from {snapshot_id}")),
                "auto_pre_restore",
            )
            .await?;

        self.graph.drop_graph(graph_name).await;
        self.graph.create_graph(graph_name).await?;

        let mut old_to_new: HashMap<String, String> = HashMap::new();
        let mut entities_restored = 0usize;

        for entity_data in &export.entities {
            let entity_type = EntityType::from_str(&entity_data.entity_type).ok_or_else(|| {
                ServiceError::Validation(format!(
                    "Unknown entity type in snapshot: {}",
                    entity_data.entity_type
                ))
            })?;

            let mut properties = entity_data.properties.clone();
            properties.remove("name");

            let created = self
                .graph
                .create_entity(
                    graph_name,
                    &EntityCreate {
                        name: entity_data.name.clone(),
                        entity_type,
                        properties,
                    },
                )
                .await?;

            old_to_new.insert(entity_data.age_id.clone(), created.id);
            entities_restored += 1;
        }

        let mut relationships_restored = 0usize;
        for rel_data in &export.relationships {
            let (Some(source_id), Some(target_id)) = (
                old_to_new.get(&rel_data.source_id),
                old_to_new.get(&rel_data.target_id),
            ) else {
                warn!(
                    source = %rel_data.source_id,
                    target = %rel_data.target_id,
                    "Skipping relationship - missing entity"
                );
                continue;
            };

            let relationship_type = RelationshipType::from_str(&rel_data.relationship_type)
                .unwrap_or(RelationshipType::RelatedTo);

            self.graph
                .create_relationship(
                    graph_name,
                    &RelationshipCreate {
                        source_id: source_id.clone(),
                        target_id: target_id.clone(),
                        relationship_type,
                        properties: rel_data.properties.clone(),
                    },
                )
                .await?;
            relationships_restored += 1;
        }

        info!(
            snapshot_id = %snapshot_id,
            entities = entities_restored,
            relationships = relationships_restored,
            "Graph restored from snapshot"
        );

        Ok(RestoreResponse {
            snapshot_id,
            entities_restored,
            relationships_restored,
            pre_restore_snapshot_id: pre_snapshot.id,
        })
    }

    /// Delete the oldest snapshots beyond the retention limit.
    async fn prune(&self, project_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            DELETE FROM public.kg_snapshots
            WHERE id IN (
                SELECT id FROM public.kg_snapshots
                WHERE project_id = $1
                ORDER BY created_at DESC
                OFFSET $2
            )
            "#,
        )
        .bind(project_id)
        .bind(MAX_SNAPSHOTS_PER_PROJECT)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn export_shape_round_trips_through_json() {
        let export = GraphExport {
            entities: vec![ExportedEntity {
                age_id: "844424930131969".to_string(),
                name: "Alpha".to_string(),
                entity_type: "Component".to_string(),
                properties: json!({"color": "red"}).as_object().cloned().unwrap(),
            }],
            relationships: vec![ExportedRelationship {
                age_id: "1125899906842625".to_string(),
                source_id: "844424930131969".to_string(),
                target_id: "844424930131970".to_string(),
                relationship_type: "USES".to_string(),
                properties: Default::default(),
                source_name: "Alpha".to_string(),
                target_name: "Beta".to_string(),
            }],
        };

        let value = serde_json::to_value(&export).unwrap();
        assert_eq!(value["entities"][0]["age_id"], json!("844424930131969"));
        assert_eq!(value["entities"][0]["type"], json!("Component"));
        assert_eq!(value["relationships"][0]["type"], json!("USES"));

        let parsed: GraphExport = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.entities.len(), 1);
        assert_eq!(parsed.relationships[0].source_name, "Alpha");
    }

    #[test]
    fn snapshot_graph_data_tolerates_missing_optional_fields() {
        let value = json!({
            "entities": [{"age_id": "1", "name": "A", "type": "Concept"}],
            "relationships": [{"age_id": "2", "source_id": "1", "target_id": "1", "type": "RELATED_TO"}]
        });
        let parsed: GraphExport = serde_json::from_value(value).unwrap();
        assert!(parsed.entities[0].properties.is_empty());
        assert!(parsed.relationships[0].source_name.is_empty());
    }
}
