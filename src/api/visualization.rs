use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{
    errors::{ApiResult, AppError},
    fetch_project,
    state::SharedState,
};
use crate::database::models::{EntityType, GraphData};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub properties: Value,
    pub color: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub properties: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VisualizationStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub types: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GraphVisualizationResponse {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub stats: VisualizationStats,
}

const FALLBACK_COLOR: &str = "#6B7280";

fn type_color(entity_type: &str) -> Option<String> {
    let color = match entity_type {
        "Component" => "#7C3AED",
        "DesignToken" => "#10B981",
        "Contract" => "#F59E0B",
        "Requirement" => "#3B82F6",
        "Person" => "#EC4899",
        "Concept" => "#8B5CF6",
        "Feature" => "#06B6D4",
        "Document" => "#64748B",
        "API" => "#EF4444",
        "Chunk" => "#9CA3AF",
        _ => FALLBACK_COLOR,
    };
    Some(color.to_string())
}

#[derive(Deserialize, JsonSchema)]
pub struct VisualizationQuery {
    /// Entity id to center the view on.
    pub focus: Option<String>,
    pub depth: Option<usize>,
    /// Comma-separated entity types to include.
    pub types: Option<String>,
    pub limit: Option<i64>,
}

// Graph data for visualization, optionally focused or type-filtered
pub async fn get_visualization_graph(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
    Query(params): Query<VisualizationQuery>,
) -> ApiResult<Json<GraphVisualizationResponse>> {
    let project = fetch_project(&state, &slug).await?;

    let depth = params.depth.unwrap_or(2).clamp(1, 5);
    let limit = params.limit.unwrap_or(500).clamp(1, 5000);

    let type_filter = parse_type_filter(params.types.as_deref())?;

    let data = if let Some(focus) = &params.focus {
        let local = state
            .graph
            .get_local_graph(&project.graph_name, focus, depth)
            .await
            .map_err(Into::<(StatusCode, AppError)>::into)?;
        GraphData {
            nodes: local.nodes,
            edges: local.edges,
        }
    } else if let Some(types) = &type_filter {
        // Over-fetch before filtering so every matching label is represented.
        let full = state
            .graph
            .get_full_graph(&project.graph_name, limit * 3, Some(types))
            .await
            .map_err(Into::<(StatusCode, AppError)>::into)?;
        GraphData {
            nodes: full.nodes,
            edges: full.edges,
        }
    } else {
        let full = state
            .graph
            .get_full_graph(&project.graph_name, limit, None)
            .await
            .map_err(Into::<(StatusCode, AppError)>::into)?;
        GraphData {
            nodes: full.nodes,
            edges: full.edges,
        }
    };

    Ok((StatusCode::OK, Json(to_visualization(data, type_filter.as_deref()))))
}

#[derive(Deserialize, JsonSchema)]
pub struct LocalGraphQuery {
    pub depth: Option<usize>,
}

// Local neighbourhood of an entity
pub async fn get_local_graph(
    State(state): State<SharedState>,
    Path((slug, entity_id)): Path<(String, String)>,
    Query(params): Query<LocalGraphQuery>,
) -> ApiResult<Json<GraphVisualizationResponse>> {
    let project = fetch_project(&state, &slug).await?;
    let depth = params.depth.unwrap_or(2).clamp(1, 5);

    let local = state
        .graph
        .get_local_graph(&project.graph_name, &entity_id, depth)
        .await
        .map_err(Into::<(StatusCode, AppError)>::into)?;

    Ok((
        StatusCode::OK,
        Json(to_visualization(
            GraphData {
                nodes: local.nodes,
                edges: local.edges,
            },
            None,
        )),
    ))
}

fn parse_type_filter(
    types: Option<&str>,
) -> Result<Option<Vec<EntityType>>, (StatusCode, AppError)> {
    let Some(raw) = types else { return Ok(None) };
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let mut parsed = Vec::new();
    for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let entity_type = EntityType::from_str(item).ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                AppError::validation(format!("Unknown entity type '{item}'")),
            )
        })?;
        parsed.push(entity_type);
    }

    if parsed.is_empty() {
        Ok(None)
    } else {
        Ok(Some(parsed))
    }
}

fn to_visualization(
    data: GraphData,
    type_filter: Option<&[EntityType]>,
) -> GraphVisualizationResponse {
    let allowed: Option<Vec<&str>> =
        type_filter.map(|types| types.iter().map(EntityType::as_str).collect());

    let nodes: Vec<GraphNode> = data
        .nodes
        .into_iter()
        .filter(|n| {
            allowed
                .as_ref()
                .is_none_or(|labels| labels.contains(&n.entity_type.as_str()))
        })
        .map(|n| GraphNode {
            color: type_color(&n.entity_type),
            id: n.id,
            label: n.name,
            entity_type: n.entity_type,
            properties: n.properties,
        })
        .collect();

    let node_ids: std::collections::HashSet<&str> =
        nodes.iter().map(|n| n.id.as_str()).collect();

    let edges: Vec<GraphEdge> = data
        .edges
        .into_iter()
        .filter(|e| node_ids.contains(e.source.as_str()) && node_ids.contains(e.target.as_str()))
        .map(|e| GraphEdge {
            id: e.id,
            source: e.source,
            target: e.target,
            relationship_type: e.relationship_type,
            properties: Value::Object(Default::default()),
        })
        .collect();

    let mut types = BTreeMap::new();
    for node in &nodes {
        *types.entry(node.entity_type.clone()).or_insert(0) += 1;
    }

    GraphVisualizationResponse {
        stats: VisualizationStats {
            node_count: nodes.len(),
            edge_count: edges.len(),
            types,
        },
        nodes,
        edges,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{GraphDataEdge, GraphDataNode};
    use serde_json::json;

    fn node(id: &str, entity_type: &str) -> GraphDataNode {
        GraphDataNode {
            id: id.to_string(),
            name: format!("node {id}"),
            entity_type: entity_type.to_string(),
            properties: json!({}),
        }
    }

    fn edge(id: &str, source: &str, target: &str) -> GraphDataEdge {
        GraphDataEdge {
            id: id.to_string(),
            source: source.to_string(),
            target: target.to_string(),
            relationship_type: "USES".to_string(),
        }
    }

    #[test]
    fn filtering_drops_edges_with_missing_endpoints() {
        let data = GraphData {
            nodes: vec![node("1", "Component"), node("2", "Concept")],
            edges: vec![edge("10", "1", "2"), edge("11", "1", "3")],
        };

        let filter = vec![EntityType::Component];
        let response = to_visualization(data, Some(&filter));

        assert_eq!(response.nodes.len(), 1);
        // Both edges lost an endpoint: node 2 was filtered, node 3 unknown.
        assert!(response.edges.is_empty());
        assert_eq!(response.stats.node_count, 1);
        assert_eq!(response.stats.types["Component"], 1);
    }

    #[test]
    fn known_types_get_palette_colors() {
        let data = GraphData {
            nodes: vec![node("1", "Component"), node("2", "Run")],
            edges: vec![edge("10", "1", "2")],
        };
        let response = to_visualization(data, None);

        assert_eq!(response.nodes[0].color.as_deref(), Some("#7C3AED"));
        assert_eq!(response.nodes[1].color.as_deref(), Some(FALLBACK_COLOR));
        assert_eq!(response.edges.len(), 1);
    }

    #[test]
    fn type_filter_parsing_rejects_unknown_labels() {
        assert!(parse_type_filter(Some("Component,Concept")).unwrap().is_some());
        assert!(parse_type_filter(Some("Widget")).is_err());
        assert!(parse_type_filter(Some("  ")).unwrap().is_none());
        assert!(parse_type_filter(None).unwrap().is_none());
    }
}
