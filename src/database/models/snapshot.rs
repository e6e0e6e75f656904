use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::database::JsonMap;

fn default_trigger() -> String {
    "manual".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotCreate {
    pub label: Option<String>,
    #[serde(default = "default_trigger")]
    pub trigger: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub label: Option<String>,
    pub trigger: String,
    pub entity_count: i32,
    pub relationship_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotDetailRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub label: Option<String>,
    pub trigger: String,
    pub graph_data: Value,
    pub entity_count: i32,
    pub relationship_count: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotResponse {
    pub id: Uuid,
    pub project_id: Uuid,
    pub label: Option<String>,
    pub trigger: String,
    pub entity_count: i32,
    pub relationship_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<SnapshotRow> for SnapshotResponse {
    fn from(row: SnapshotRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            label: row.label,
            trigger: row.trigger,
            entity_count: row.entity_count,
            relationship_count: row.relationship_count,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SnapshotDetail {
    pub id: Uuid,
    pub project_id: Uuid,
    pub label: Option<String>,
    pub trigger: String,
    pub graph_data: Value,
    pub entity_count: i32,
    pub relationship_count: i32,
    pub created_at: DateTime<Utc>,
}

impl From<SnapshotDetailRow> for SnapshotDetail {
    fn from(row: SnapshotDetailRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            label: row.label,
            trigger: row.trigger,
            graph_data: row.graph_data,
            entity_count: row.entity_count,
            relationship_count: row.relationship_count,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RestoreResponse {
    pub snapshot_id: Uuid,
    pub entities_restored: usize,
    pub relationships_restored: usize,
    pub pre_restore_snapshot_id: Uuid,
}

// Canonical export shape persisted in `graph_data`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraphExport {
    pub entities: Vec<ExportedEntity>,
    pub relationships: Vec<ExportedRelationship>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedEntity {
    pub age_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub properties: JsonMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedRelationship {
    pub age_id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub properties: JsonMap,
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub target_name: String,
}
