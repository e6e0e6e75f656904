use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::entity::EntityType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    #[default]
    Hybrid,
    Vector,
    Graph,
}

impl SearchMode {
    /// Whether this mode runs the vector path and therefore needs a query
    /// embedding.
    pub fn uses_vector(&self) -> bool {
        matches!(self, SearchMode::Hybrid | SearchMode::Vector)
    }

    pub fn uses_graph(&self) -> bool {
        matches!(self, SearchMode::Hybrid | SearchMode::Graph)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct SearchFilters {
    pub entity_types: Option<Vec<EntityType>>,
}

fn default_limit() -> usize {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub mode: SearchMode,
    pub filters: Option<SearchFilters>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResultConnection {
    pub id: String,
    pub name: String,
    pub relationship: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResult {
    pub id: String,
    #[serde(rename = "type")]
    pub result_type: String,
    pub label: String,
    pub name: String,
    pub content: String,
    pub score: f32,
    pub source: String,
    #[serde(default)]
    pub connections: Vec<SearchResultConnection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchStats {
    pub vector_hits: usize,
    pub graph_hits: usize,
    pub total_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    pub stats: SearchStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectSearchStats {
    pub project: String,
    pub result_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FanoutSearchResponse {
    pub results: Vec<SearchResult>,
    pub total: usize,
    pub projects_searched: usize,
    pub project_stats: Vec<ProjectSearchStats>,
}
