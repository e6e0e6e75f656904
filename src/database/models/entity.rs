use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::database::JsonMap;

/// Closed set of node labels. Unknown values on the wire fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum EntityType {
    // Codebase entities
    Module,
    File,
    Function,
    Class,
    // Design entities
    Component,
    DesignToken,
    // Business entities
    Contract,
    Requirement,
    Person,
    Concept,
    Feature,
    Document,
    #[serde(rename = "API")]
    Api,
    Chunk,
    Client,
    Project,
    Task,
    // Execution entities
    Workflow,
    Agent,
    Run,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Module => "Module",
            EntityType::File => "File",
            EntityType::Function => "Function",
            EntityType::Class => "Class",
            EntityType::Component => "Component",
            EntityType::DesignToken => "DesignToken",
            EntityType::Contract => "Contract",
            EntityType::Requirement => "Requirement",
            EntityType::Person => "Person",
            EntityType::Concept => "Concept",
            EntityType::Feature => "Feature",
            EntityType::Document => "Document",
            EntityType::Api => "API",
            EntityType::Chunk => "Chunk",
            EntityType::Client => "Client",
            EntityType::Project => "Project",
            EntityType::Task => "Task",
            EntityType::Workflow => "Workflow",
            EntityType::Agent => "Agent",
            EntityType::Run => "Run",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Module" => Some(EntityType::Module),
            "File" => Some(EntityType::File),
            "Function" => Some(EntityType::Function),
            "Class" => Some(EntityType::Class),
            "Component" => Some(EntityType::Component),
            "DesignToken" => Some(EntityType::DesignToken),
            "Contract" => Some(EntityType::Contract),
            "Requirement" => Some(EntityType::Requirement),
            "Person" => Some(EntityType::Person),
            "Concept" => Some(EntityType::Concept),
            "Feature" => Some(EntityType::Feature),
            "Document" => Some(EntityType::Document),
            "API" => Some(EntityType::Api),
            "Chunk" => Some(EntityType::Chunk),
            "Client" => Some(EntityType::Client),
            "Project" => Some(EntityType::Project),
            "Task" => Some(EntityType::Task),
            "Workflow" => Some(EntityType::Workflow),
            "Agent" => Some(EntityType::Agent),
            "Run" => Some(EntityType::Run),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed set of relationship labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    // Codebase relationships
    Imports,
    Exports,
    Calls,
    Contains,
    Extends,
    // Semantic relationships
    Uses,
    Defines,
    Requires,
    References,
    Implements,
    DependsOn,
    RelatedTo,
    // Business relationships
    CreatedBy,
    Owns,
    WorksOn,
    Manages,
}

impl RelationshipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Imports => "IMPORTS",
            RelationshipType::Exports => "EXPORTS",
            RelationshipType::Calls => "CALLS",
            RelationshipType::Contains => "CONTAINS",
            RelationshipType::Extends => "EXTENDS",
            RelationshipType::Uses => "USES",
            RelationshipType::Defines => "DEFINES",
            RelationshipType::Requires => "REQUIRES",
            RelationshipType::References => "REFERENCES",
            RelationshipType::Implements => "IMPLEMENTS",
            RelationshipType::DependsOn => "DEPENDS_ON",
            RelationshipType::RelatedTo => "RELATED_TO",
            RelationshipType::CreatedBy => "CREATED_BY",
            RelationshipType::Owns => "OWNS",
            RelationshipType::WorksOn => "WORKS_ON",
            RelationshipType::Manages => "MANAGES",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IMPORTS" => Some(RelationshipType::Imports),
            "EXPORTS" => Some(RelationshipType::Exports),
            "CALLS" => Some(RelationshipType::Calls),
            "CONTAINS" => Some(RelationshipType::Contains),
            "EXTENDS" => Some(RelationshipType::Extends),
            "USES" => Some(RelationshipType::Uses),
            "DEFINES" => Some(RelationshipType::Defines),
            "REQUIRES" => Some(RelationshipType::Requires),
            "REFERENCES" => Some(RelationshipType::References),
            "IMPLEMENTS" => Some(RelationshipType::Implements),
            "DEPENDS_ON" => Some(RelationshipType::DependsOn),
            "RELATED_TO" => Some(RelationshipType::RelatedTo),
            "CREATED_BY" => Some(RelationshipType::CreatedBy),
            "OWNS" => Some(RelationshipType::Owns),
            "WORKS_ON" => Some(RelationshipType::WorksOn),
            "MANAGES" => Some(RelationshipType::Manages),
            _ => None,
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Relationship direction filter for neighbourhood queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipDirection {
    Incoming,
    Outgoing,
    #[default]
    All,
}

// Request structures
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityCreate {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub properties: JsonMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpsertEntityRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default)]
    pub properties: JsonMap,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipCreate {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub properties: JsonMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchEntityCreate {
    /// Client-side token other batch items may reference.
    #[serde(rename = "ref")]
    pub entity_ref: Option<String>,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub description: Option<String>,
    #[serde(default)]
    pub properties: JsonMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchRelationshipCreate {
    /// A `ref` from the entity list, or a bare graph id.
    #[serde(rename = "from")]
    pub from_ref: String,
    #[serde(rename = "to")]
    pub to_ref: String,
    #[serde(rename = "type")]
    pub relationship_type: RelationshipType,
    #[serde(default)]
    pub properties: JsonMap,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchCreateRequest {
    #[serde(default)]
    pub entities: Vec<BatchEntityCreate>,
    #[serde(default)]
    pub relationships: Vec<BatchRelationshipCreate>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchDeleteRequest {
    pub entity_ids: Vec<String>,
}

fn default_dry_run() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeduplicateRequest {
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    pub entity_type: Option<EntityType>,
}

// Response structures
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectionResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub relationship: String,
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityResponse {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub properties: Value,
    #[serde(default)]
    pub connections: Vec<ConnectionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityListResponse {
    pub entities: Vec<EntityResponse>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FindEntityResponse {
    pub entities: Vec<EntityResponse>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipResponse {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub properties: Value,
    pub source_name: String,
    pub target_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipListResponse {
    pub relationships: Vec<RelationshipResponse>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipCreated {
    pub id: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
}

/// One relationship as seen from a specific entity.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityRelationship {
    pub id: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    pub properties: Value,
    pub other_id: String,
    pub other_name: String,
    pub other_type: String,
    pub direction: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EntityRelationshipsResponse {
    pub relationships: Vec<EntityRelationship>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UpsertResponse {
    pub id: String,
    pub name: String,
    pub properties: Value,
    /// Keys of incoming properties that overwrote existing ones.
    pub merged_properties: Vec<String>,
    pub created: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchCreatedEntity {
    #[serde(rename = "ref")]
    pub entity_ref: String,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchCreatedRelationship {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchCreateResponse {
    pub entities_created: Vec<BatchCreatedEntity>,
    pub relationships_created: Vec<BatchCreatedRelationship>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchDeleteResponse {
    pub deleted: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DuplicateEntity {
    pub id: String,
    pub name: String,
    pub properties: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DuplicateGroup {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub entities: Vec<DuplicateEntity>,
    pub recommended_keep: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DeduplicateResponse {
    pub duplicate_groups: Vec<DuplicateGroup>,
    pub total_duplicates: usize,
    pub merged: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphStats {
    pub node_count: i64,
    pub edge_count: i64,
    pub types: BTreeMap<String, i64>,
}

// Raw graph slices used by visualization and snapshot export.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphDataNode {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub properties: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphDataEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct GraphData {
    pub nodes: Vec<GraphDataNode>,
    pub edges: Vec<GraphDataEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphCounts {
    pub node_count: usize,
    pub edge_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FullGraphData {
    pub nodes: Vec<GraphDataNode>,
    pub edges: Vec<GraphDataEdge>,
    pub stats: GraphCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CypherRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CypherResponse {
    pub results: Vec<Value>,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_round_trips_on_the_wire() {
        let api: EntityType = serde_json::from_str("\"API\"").unwrap();
        assert_eq!(api, EntityType::Api);
        assert_eq!(serde_json::to_string(&api).unwrap(), "\"API\"");

        let token: EntityType = serde_json::from_str("\"DesignToken\"").unwrap();
        assert_eq!(token.as_str(), "DesignToken");
    }

    #[test]
    fn unknown_entity_type_is_rejected() {
        assert!(serde_json::from_str::<EntityType>("\"Widget\"").is_err());
        assert!(EntityType::from_str("widget").is_none());
    }

    #[test]
    fn relationship_type_uses_screaming_snake_case() {
        let depends: RelationshipType = serde_json::from_str("\"DEPENDS_ON\"").unwrap();
        assert_eq!(depends, RelationshipType::DependsOn);
        assert_eq!(depends.as_str(), "DEPENDS_ON");
        assert!(serde_json::from_str::<RelationshipType>("\"KNOWS\"").is_err());
    }

    #[test]
    fn deduplicate_request_defaults_to_dry_run() {
        let req: DeduplicateRequest = serde_json::from_str("{}").unwrap();
        assert!(req.dry_run);
        assert!(req.entity_type.is_none());
    }
}
