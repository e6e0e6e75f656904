// Graph operations service over the Apache AGE property-graph extension.
//
// Every graph mutation and read in the system goes through this service so
// that identifier discipline, literal encoding and the closed label sets are
// enforced in one place.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{info, warn};

use crate::database::models::{
    BatchCreateResponse, BatchCreatedEntity, BatchCreatedRelationship, BatchEntityCreate,
    BatchRelationshipCreate, ConnectionResponse, DuplicateEntity, DuplicateGroup, EntityCreate,
    EntityRelationship, EntityResponse, EntityType, FullGraphData, GraphCounts, GraphData,
    GraphDataEdge, GraphDataNode, GraphStats, RelationshipCreate, RelationshipCreated,
    RelationshipDirection, RelationshipResponse, RelationshipType, UpsertResponse,
};
use crate::database::{Database, JsonMap};
use crate::error::{ServiceError, ServiceResult};
use crate::utils::normalize_label;

/// Write/destructive Cypher keywords rejected by the raw-query gate.
pub const DANGEROUS_KEYWORDS: [&str; 8] = [
    "DELETE", "CREATE", "DROP", "SET", "REMOVE", "MERGE", "DETACH", "CALL",
];

static LINE_COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)//.*$").unwrap());
static BLOCK_COMMENTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap());
static UPPER_WORDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]+\b").unwrap());

/// Check a raw Cypher query for write keywords.
///
/// Comments are stripped first, then the uppercased text is tokenised on
/// word boundaries, so identifiers like `dataset` or `create_date` are never
/// flagged while any executable occurrence of a restricted keyword is.
pub fn has_dangerous_keywords(query: &str) -> bool {
    let cleaned = LINE_COMMENTS.replace_all(query, "");
    let cleaned = BLOCK_COMMENTS.replace_all(&cleaned, "");
    let upper = cleaned.to_uppercase();
    UPPER_WORDS
        .find_iter(&upper)
        .any(|word| DANGEROUS_KEYWORDS.contains(&word.as_str()))
}

/// Validate an externally supplied entity id.
///
/// Ids coming back from search results may carry an `entity_` or `chunk_`
/// prefix; strip it and require the remainder to be an integer.
pub fn validate_id(entity_id: &str) -> ServiceResult<i64> {
    let mut cleaned = entity_id.trim();
    for prefix in ["entity_", "chunk_"] {
        if let Some(rest) = cleaned.strip_prefix(prefix) {
            cleaned = rest;
        }
    }
    cleaned
        .parse::<i64>()
        .map_err(|_| ServiceError::InvalidId(entity_id.to_string()))
}

fn escape_quotes(s: &str) -> String {
    s.replace('\'', "\\'")
}

/// Serialise a single value as an AGE Cypher literal.
fn serialize_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("'{}'", escape_quotes(s)),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => format!("'{}'", escape_quotes(&other.to_string())),
    }
}

/// Render a property bag in AGE map literal syntax.
///
/// AGE expects `{name: 'value', count: 42}`, not JSON. Null-valued keys are
/// dropped.
pub fn to_cypher_map(props: &JsonMap) -> String {
    let parts: Vec<String> = props
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| format!("{}: {}", k, serialize_value(v)))
        .collect();
    format!("{{{}}}", parts.join(", "))
}

fn row_i64(row: &JsonMap, key: &str) -> i64 {
    row.get(key).and_then(Value::as_i64).unwrap_or_default()
}

fn row_id(row: &JsonMap, key: &str) -> String {
    match row.get(key) {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

fn row_string(row: &JsonMap, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn row_label(row: &JsonMap, key: &str) -> String {
    normalize_label(row.get(key).unwrap_or(&Value::Null))
}

fn row_properties(row: &JsonMap, key: &str) -> Value {
    match row.get(key) {
        Some(Value::Object(map)) => Value::Object(map.clone()),
        _ => Value::Object(JsonMap::new()),
    }
}

fn row_property_map(row: &JsonMap, key: &str) -> JsonMap {
    match row.get(key) {
        Some(Value::Object(map)) => map.clone(),
        _ => JsonMap::new(),
    }
}

#[derive(Clone)]
pub struct GraphService {
    db: Database,
}

impl GraphService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a graph namespace; an existing graph counts as success.
    pub async fn create_graph(&self, graph_name: &str) -> ServiceResult<()> {
        let result = sqlx::query("SELECT ag_catalog.create_graph($1);")
            .bind(graph_name)
            .execute(self.db.pool())
            .await;

        match result {
            Ok(_) => {
                info!(graph_name, "Graph created");
                Ok(())
            }
            Err(e) if e.to_string().contains("already exists") => {
                info!(graph_name, "Graph already exists");
                Ok(())
            }
            Err(e) => Err(ServiceError::Graph(e.to_string())),
        }
    }

    /// Drop a graph namespace, best-effort.
    pub async fn drop_graph(&self, graph_name: &str) -> bool {
        let result = sqlx::query("SELECT ag_catalog.drop_graph($1, true);")
            .bind(graph_name)
            .execute(self.db.pool())
            .await;

        match result {
            Ok(_) => {
                info!(graph_name, "Graph dropped");
                true
            }
            Err(e) => {
                warn!(graph_name, error = %e, "Failed to drop graph");
                false
            }
        }
    }

    /// Create a node. The `name` property is lifted from the request field,
    /// not the property bag.
    pub async fn create_entity(
        &self,
        graph_name: &str,
        entity: &EntityCreate,
    ) -> ServiceResult<EntityResponse> {
        let mut props = JsonMap::new();
        props.insert("name".to_string(), Value::String(entity.name.clone()));
        for (k, v) in &entity.properties {
            props.insert(k.clone(), v.clone());
        }
        let props_cypher = to_cypher_map(&props);

        let cypher = format!(
            "CREATE (n:{label} {props_cypher}) RETURN id(n) as id, n.name as name, labels(n) as type",
            label = entity.entity_type.as_str(),
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        let row = results
            .first()
            .ok_or_else(|| ServiceError::Graph("entity creation returned no rows".to_string()))?;

        info!(graph = graph_name, name = %entity.name, entity_type = %entity.entity_type, "Entity created");
        Ok(EntityResponse {
            id: row_id(row, "id"),
            name: row_string(row, "name"),
            entity_type: entity.entity_type.as_str().to_string(),
            properties: Value::Object(entity.properties.clone()),
            connections: Vec::new(),
        })
    }

    /// Get an entity together with its one-hop neighbourhood.
    pub async fn get_entity(
        &self,
        graph_name: &str,
        entity_id: &str,
    ) -> ServiceResult<Option<EntityResponse>> {
        let safe_id = validate_id(entity_id)?;
        let cypher = format!(
            r#"
            MATCH (n)
            WHERE id(n) = {safe_id}
            OPTIONAL MATCH (n)-[r]-(connected)
            RETURN id(n) as id, n.name as name, labels(n) as type, properties(n) as properties, collect({{
                id: id(connected),
                name: connected.name,
                type: labels(connected),
                relationship: type(r),
                direction: CASE WHEN startNode(r) = n THEN 'outgoing' ELSE 'incoming' END
            }}) as connections
            "#
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        let Some(row) = results.first() else {
            return Ok(None);
        };

        let connections = row
            .get("connections")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .filter(|c| c.get("name").and_then(Value::as_str).is_some_and(|n| !n.is_empty()))
                    .map(|c| ConnectionResponse {
                        id: row_id(c, "id"),
                        name: row_string(c, "name"),
                        entity_type: row_label(c, "type"),
                        relationship: row_string(c, "relationship"),
                        direction: row_string(c, "direction"),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(EntityResponse {
            id: row_id(row, "id"),
            name: row_string(row, "name"),
            entity_type: row_label(row, "type"),
            properties: row_properties(row, "properties"),
            connections,
        }))
    }

    pub async fn list_entities(
        &self,
        graph_name: &str,
        entity_type: Option<EntityType>,
        limit: i64,
        offset: i64,
    ) -> ServiceResult<Vec<EntityResponse>> {
        let type_filter = entity_type
            .map(|t| format!(":{}", t.as_str()))
            .unwrap_or_default();

        let cypher = format!(
            r#"
            MATCH (n{type_filter})
            RETURN id(n) as id, n.name as name, labels(n) as type, properties(n) as properties
            ORDER BY n.name
            SKIP {offset}
            LIMIT {limit}
            "#
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        Ok(results
            .iter()
            .map(|row| EntityResponse {
                id: row_id(row, "id"),
                name: row_string(row, "name"),
                entity_type: row_label(row, "type"),
                properties: row_properties(row, "properties"),
                connections: Vec::new(),
            })
            .collect())
    }

    /// Detach-delete an entity; returns whether anything matched.
    pub async fn delete_entity(&self, graph_name: &str, entity_id: &str) -> ServiceResult<bool> {
        let safe_id = validate_id(entity_id)?;
        let cypher = format!(
            r#"
            MATCH (n)
            WHERE id(n) = {safe_id}
            DETACH DELETE n
            RETURN count(*) as deleted
            "#
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        Ok(results.first().is_some_and(|row| row_i64(row, "deleted") > 0))
    }

    /// Create a relationship; both endpoints must exist.
    pub async fn create_relationship(
        &self,
        graph_name: &str,
        rel: &RelationshipCreate,
    ) -> ServiceResult<RelationshipCreated> {
        let safe_source = validate_id(&rel.source_id)?;
        let safe_target = validate_id(&rel.target_id)?;
        let props_cypher = to_cypher_map(&rel.properties);

        let cypher = format!(
            r#"
            MATCH (a), (b)
            WHERE id(a) = {safe_source} AND id(b) = {safe_target}
            CREATE (a)-[r:{label} {props_cypher}]->(b)
            RETURN id(r) as id, type(r) as type
            "#,
            label = rel.relationship_type.as_str(),
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        let row = results
            .first()
            .ok_or_else(|| ServiceError::NotFound("Source or target entity".to_string()))?;

        info!(graph = graph_name, relationship_type = %rel.relationship_type, "Relationship created");
        Ok(RelationshipCreated {
            id: row_id(row, "id"),
            relationship_type: row_string(row, "type"),
        })
    }

    pub async fn list_relationships(
        &self,
        graph_name: &str,
        limit: i64,
    ) -> ServiceResult<Vec<RelationshipResponse>> {
        let cypher = format!(
            r#"
            MATCH (a)-[r]->(b)
            RETURN id(r) as id, id(a) as source_id, id(b) as target_id,
                   type(r) as type, properties(r) as properties,
                   a.name as source_name, b.name as target_name
            LIMIT {limit}
            "#
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        Ok(results
            .iter()
            .map(|row| RelationshipResponse {
                id: row_id(row, "id"),
                source_id: row_id(row, "source_id"),
                target_id: row_id(row, "target_id"),
                relationship_type: row_string(row, "type"),
                properties: row_properties(row, "properties"),
                source_name: row_string(row, "source_name"),
                target_name: row_string(row, "target_name"),
            })
            .collect())
    }

    /// Relationships touching one entity, filtered by direction and label.
    pub async fn get_entity_relationships(
        &self,
        graph_name: &str,
        entity_id: &str,
        direction: RelationshipDirection,
        rel_type: Option<RelationshipType>,
    ) -> ServiceResult<Vec<EntityRelationship>> {
        let safe_id = validate_id(entity_id)?;
        let type_filter = rel_type
            .map(|t| format!(":{}", t.as_str()))
            .unwrap_or_default();

        let pattern = match direction {
            RelationshipDirection::Outgoing => format!("(n)-[r{type_filter}]->(other)"),
            RelationshipDirection::Incoming => format!("(n)<-[r{type_filter}]-(other)"),
            RelationshipDirection::All => format!("(n)-[r{type_filter}]-(other)"),
        };

        let cypher = format!(
            r#"
            MATCH {pattern}
            WHERE id(n) = {safe_id}
            RETURN id(r) as id, type(r) as type, properties(r) as properties,
                   id(other) as other_id, other.name as other_name, labels(other) as other_type,
                   CASE WHEN startNode(r) = n THEN 'outgoing' ELSE 'incoming' END as direction
            "#
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        Ok(results
            .iter()
            .map(|row| EntityRelationship {
                id: row_id(row, "id"),
                relationship_type: row_string(row, "type"),
                properties: row_properties(row, "properties"),
                other_id: row_id(row, "other_id"),
                other_name: row_string(row, "other_name"),
                other_type: row_label(row, "other_type"),
                direction: row_string(row, "direction"),
            })
            .collect())
    }

    /// Patch entity properties. Null values REMOVE the property, everything
    /// else is SET; an empty update returns the node unchanged.
    pub async fn update_entity(
        &self,
        graph_name: &str,
        entity_id: &str,
        updates: &JsonMap,
    ) -> ServiceResult<Option<EntityResponse>> {
        let safe_id = validate_id(entity_id)?;

        let mut set_clauses = Vec::new();
        let mut remove_clauses = Vec::new();
        for (key, value) in updates {
            if value.is_null() {
                remove_clauses.push(format!("REMOVE n.{key}"));
            } else {
                set_clauses.push(format!("n.{key} = {}", serialize_value(value)));
            }
        }

        let mut mutation_parts = Vec::new();
        if !set_clauses.is_empty() {
            mutation_parts.push(format!("SET {}", set_clauses.join(", ")));
        }
        if !remove_clauses.is_empty() {
            mutation_parts.push(remove_clauses.join(" "));
        }
        let mutation = mutation_parts.join(" ");

        let cypher = format!(
            r#"
            MATCH (n)
            WHERE id(n) = {safe_id}
            {mutation}
            RETURN id(n) as id, n.name as name, labels(n) as type, properties(n) as properties
            "#
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        let Some(row) = results.first() else {
            return Ok(None);
        };

        info!(graph = graph_name, entity_id, "Entity updated");
        Ok(Some(EntityResponse {
            id: row_id(row, "id"),
            name: row_string(row, "name"),
            entity_type: row_label(row, "type"),
            properties: row_properties(row, "properties"),
            connections: Vec::new(),
        }))
    }

    /// Create-or-merge keyed by case-insensitive name within a label.
    ///
    /// On a match the incoming properties overlay the existing ones and the
    /// overlapping keys are reported; otherwise a new node is created.
    /// Returns `(entity, created)`.
    pub async fn upsert_entity(
        &self,
        graph_name: &str,
        entity: &EntityCreate,
        description: Option<&str>,
    ) -> ServiceResult<(UpsertResponse, bool)> {
        let escaped_name = escape_quotes(&entity.name);

        let find_cypher = format!(
            r#"
            MATCH (n:{label})
            WHERE toLower(n.name) = toLower('{escaped_name}')
            RETURN id(n) as id, n.name as name, properties(n) as properties
            "#,
            label = entity.entity_type.as_str(),
        );
        let existing = self.db.execute_cypher(graph_name, &find_cypher).await?;

        if let Some(found) = existing.first() {
            let entity_id = row_id(found, "id");
            let existing_props = row_property_map(found, "properties");

            let mut merged = existing_props.clone();
            for (k, v) in &entity.properties {
                merged.insert(k.clone(), v.clone());
            }
            if let Some(desc) = description {
                merged.insert("description".to_string(), Value::String(desc.to_string()));
            }

            self.update_entity(graph_name, &entity_id, &merged).await?;

            let merged_keys = entity
                .properties
                .keys()
                .filter(|k| existing_props.contains_key(*k))
                .cloned()
                .collect();

            Ok((
                UpsertResponse {
                    id: entity_id,
                    name: {
                        let name = row_string(found, "name");
                        if name.is_empty() {
                            entity.name.clone()
                        } else {
                            name
                        }
                    },
                    properties: Value::Object(merged),
                    merged_properties: merged_keys,
                    created: false,
                },
                false,
            ))
        } else {
            let mut props = entity.properties.clone();
            if let Some(desc) = description {
                props.insert("description".to_string(), Value::String(desc.to_string()));
            }
            let create = EntityCreate {
                name: entity.name.clone(),
                entity_type: entity.entity_type,
                properties: props.clone(),
            };
            let created = self.create_entity(graph_name, &create).await?;

            Ok((
                UpsertResponse {
                    id: created.id,
                    name: entity.name.clone(),
                    properties: Value::Object(props),
                    merged_properties: Vec::new(),
                    created: true,
                },
                true,
            ))
        }
    }

    /// Exact name match (case-insensitive), each hit assembled with its
    /// one-hop neighbours via a follow-up query.
    pub async fn find_entity_by_name(
        &self,
        graph_name: &str,
        name: &str,
        entity_type: Option<EntityType>,
    ) -> ServiceResult<Vec<EntityResponse>> {
        let type_filter = entity_type
            .map(|t| format!(":{}", t.as_str()))
            .unwrap_or_default();
        let escaped_name = escape_quotes(name);

        let find_cypher = format!(
            r#"
            MATCH (n{type_filter})
            WHERE toLower(n.name) = toLower('{escaped_name}')
            RETURN id(n) as id, n.name as name, labels(n) as type, properties(n) as properties
            "#
        );
        let entities = self.db.execute_cypher(graph_name, &find_cypher).await?;

        let mut results = Vec::with_capacity(entities.len());
        for row in &entities {
            let entity_id = validate_id(&row_id(row, "id"))?;
            let conn_cypher = format!(
                r#"
                MATCH (n)-[r]-(connected)
                WHERE id(n) = {entity_id}
                RETURN id(connected) as conn_id, connected.name as conn_name,
                       labels(connected) as conn_type, type(r) as rel_type,
                       CASE WHEN startNode(r) = n THEN 'outgoing' ELSE 'incoming' END as direction
                "#
            );
            let connections = self.db.execute_cypher(graph_name, &conn_cypher).await?;

            results.push(EntityResponse {
                id: row_id(row, "id"),
                name: row_string(row, "name"),
                entity_type: row_label(row, "type"),
                properties: row_properties(row, "properties"),
                connections: connections
                    .iter()
                    .filter(|c| {
                        c.get("conn_name")
                            .and_then(Value::as_str)
                            .is_some_and(|n| !n.is_empty())
                    })
                    .map(|c| ConnectionResponse {
                        id: row_id(c, "conn_id"),
                        name: row_string(c, "conn_name"),
                        entity_type: row_label(c, "conn_type"),
                        relationship: row_string(c, "rel_type"),
                        direction: row_string(c, "direction"),
                    })
                    .collect(),
            });
        }

        Ok(results)
    }

    /// Two-phase batch create: entities first, then relationships with their
    /// `from`/`to` refs resolved against the fresh ids (falling back to the
    /// value as a real id). Per-item errors are collected, never fatal.
    pub async fn batch_create(
        &self,
        graph_name: &str,
        entities: &[BatchEntityCreate],
        relationships: &[BatchRelationshipCreate],
    ) -> ServiceResult<BatchCreateResponse> {
        let mut ref_to_id: std::collections::HashMap<String, String> =
            std::collections::HashMap::new();
        let mut entities_created = Vec::new();
        let mut relationships_created = Vec::new();
        let mut errors = Vec::new();

        for entity in entities {
            let mut properties = entity.properties.clone();
            if let Some(desc) = &entity.description {
                properties.insert("description".to_string(), Value::String(desc.clone()));
            }
            let create = EntityCreate {
                name: entity.name.clone(),
                entity_type: entity.entity_type,
                properties,
            };

            match self.create_entity(graph_name, &create).await {
                Ok(created) => {
                    if let Some(entity_ref) = &entity.entity_ref {
                        ref_to_id.insert(entity_ref.clone(), created.id.clone());
                    }
                    entities_created.push(BatchCreatedEntity {
                        entity_ref: entity.entity_ref.clone().unwrap_or_default(),
                        id: created.id,
                        name: entity.name.clone(),
                    });
                }
                Err(e) => errors.push(format!("Entity '{}': {}", entity.name, e)),
            }
        }

        for rel in relationships {
            let resolved_source = ref_to_id
                .get(&rel.from_ref)
                .cloned()
                .unwrap_or_else(|| rel.from_ref.clone());
            let resolved_target = ref_to_id
                .get(&rel.to_ref)
                .cloned()
                .unwrap_or_else(|| rel.to_ref.clone());

            let create = RelationshipCreate {
                source_id: resolved_source.clone(),
                target_id: resolved_target.clone(),
                relationship_type: rel.relationship_type,
                properties: rel.properties.clone(),
            };

            match self.create_relationship(graph_name, &create).await {
                Ok(created) => relationships_created.push(BatchCreatedRelationship {
                    id: created.id,
                    from: resolved_source,
                    to: resolved_target,
                    relationship_type: rel.relationship_type.as_str().to_string(),
                }),
                Err(e) => errors.push(format!(
                    "Relationship '{}'->'{}': {}",
                    rel.from_ref, rel.to_ref, e
                )),
            }
        }

        Ok(BatchCreateResponse {
            entities_created,
            relationships_created,
            errors,
        })
    }

    /// Detach-delete all supplied ids in one statement.
    pub async fn batch_delete(&self, graph_name: &str, entity_ids: &[String]) -> ServiceResult<i64> {
        let mut safe_ids = Vec::with_capacity(entity_ids.len());
        for id in entity_ids {
            safe_ids.push(validate_id(id)?.to_string());
        }
        let id_list = safe_ids.join(", ");

        let cypher = format!(
            r#"
            MATCH (n)
            WHERE id(n) IN [{id_list}]
            DETACH DELETE n
            RETURN count(*) as deleted_count
            "#
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        Ok(results
            .first()
            .map(|row| row_i64(row, "deleted_count"))
            .unwrap_or_default())
    }

    /// Group entities by `(lowercased name, label)` and report groups of two
    /// or more, each with its lowest-id (oldest) entity as recommended keeper.
    pub async fn find_duplicates(
        &self,
        graph_name: &str,
        entity_type: Option<EntityType>,
    ) -> ServiceResult<Vec<DuplicateGroup>> {
        let type_filter = entity_type
            .map(|t| format!(":{}", t.as_str()))
            .unwrap_or_default();

        // Grouping happens here rather than in Cypher: AGE map literals in a
        // grouped RETURN clash with its column handling.
        let cypher = format!(
            r#"
            MATCH (n{type_filter})
            RETURN id(n) as id, n.name as name, labels(n) as type, properties(n) as properties
            ORDER BY n.name
            "#
        );
        let all_entities = self.db.execute_cypher(graph_name, &cypher).await?;

        let mut groups: BTreeMap<String, Vec<&JsonMap>> = BTreeMap::new();
        for row in &all_entities {
            let name = row_string(row, "name").to_lowercase();
            let label = row_label(row, "type");
            groups.entry(format!("{name}::{label}")).or_default().push(row);
        }

        let mut duplicate_groups = Vec::new();
        for rows in groups.values() {
            if rows.len() < 2 {
                continue;
            }

            let mut entities: Vec<(i64, DuplicateEntity)> = rows
                .iter()
                .map(|row| {
                    let id = row_i64(row, "id");
                    (
                        id,
                        DuplicateEntity {
                            id: row_id(row, "id"),
                            name: row_string(row, "name"),
                            properties: row_properties(row, "properties"),
                        },
                    )
                })
                .collect();
            entities.sort_by_key(|(id, _)| *id);

            let recommended_keep = entities
                .first()
                .map(|(_, e)| e.id.clone())
                .unwrap_or_default();

            duplicate_groups.push(DuplicateGroup {
                name: rows
                    .first()
                    .map(|row| row_string(row, "name"))
                    .unwrap_or_default(),
                entity_type: rows
                    .first()
                    .map(|row| row_label(row, "type"))
                    .unwrap_or_else(|| "Unknown".to_string()),
                entities: entities.into_iter().map(|(_, e)| e).collect(),
                recommended_keep,
            });
        }

        Ok(duplicate_groups)
    }

    /// Merge duplicates into a keeper: re-point every relationship of each
    /// removed node (preserving label and properties), then delete the node.
    /// A failed re-pointing is logged and skipped, never aborts the merge.
    pub async fn merge_duplicates(
        &self,
        graph_name: &str,
        keep_id: &str,
        remove_ids: &[String],
    ) -> ServiceResult<()> {
        let safe_keep = validate_id(keep_id)?;

        for remove_id in remove_ids {
            let safe_remove = validate_id(remove_id)?;

            if let Err(e) = self.repoint_outgoing(graph_name, safe_keep, safe_remove).await {
                warn!(remove_id = %remove_id, error = %e, "Failed to re-point outgoing relationships");
            }
            if let Err(e) = self.repoint_incoming(graph_name, safe_keep, safe_remove).await {
                warn!(remove_id = %remove_id, error = %e, "Failed to re-point incoming relationships");
            }

            self.delete_entity(graph_name, &safe_remove.to_string())
                .await?;
        }

        info!(graph = graph_name, keep_id, removed = remove_ids.len(), "Duplicates merged");
        Ok(())
    }

    async fn repoint_outgoing(
        &self,
        graph_name: &str,
        safe_keep: i64,
        safe_remove: i64,
    ) -> ServiceResult<()> {
        let rels = self
            .db
            .execute_cypher(
                graph_name,
                &format!(
                    r#"
                    MATCH (old)-[r]->(target)
                    WHERE id(old) = {safe_remove} AND id(target) <> {safe_keep}
                    RETURN id(r) as rid, type(r) as rtype, properties(r) as rprops,
                           id(target) as tid
                    "#
                ),
            )
            .await?;

        for rel in &rels {
            let rtype = {
                let t = row_string(rel, "rtype");
                if t.is_empty() {
                    "RELATED_TO".to_string()
                } else {
                    t
                }
            };
            let props_cypher = to_cypher_map(&row_property_map(rel, "rprops"));
            let target_id = validate_id(&row_id(rel, "tid"))?;

            self.db
                .execute_cypher(
                    graph_name,
                    &format!(
                        r#"
                        MATCH (keeper), (target)
                        WHERE id(keeper) = {safe_keep} AND id(target) = {target_id}
                        CREATE (keeper)-[nr:{rtype} {props_cypher}]->(target)
                        RETURN id(nr) as id
                        "#
                    ),
                )
                .await?;
        }

        if !rels.is_empty() {
            self.db
                .execute_cypher(
                    graph_name,
                    &format!(
                        r#"
                        MATCH (old)-[r]->(target)
                        WHERE id(old) = {safe_remove} AND id(target) <> {safe_keep}
                        DELETE r
                        RETURN count(*) as deleted
                        "#
                    ),
                )
                .await?;
        }

        Ok(())
    }

    async fn repoint_incoming(
        &self,
        graph_name: &str,
        safe_keep: i64,
        safe_remove: i64,
    ) -> ServiceResult<()> {
        let rels = self
            .db
            .execute_cypher(
                graph_name,
                &format!(
                    r#"
                    MATCH (source)-[r]->(old)
                    WHERE id(old) = {safe_remove} AND id(source) <> {safe_keep}
                    RETURN id(r) as rid, type(r) as rtype, properties(r) as rprops,
                           id(source) as sid
                    "#
                ),
            )
            .await?;

        for rel in &rels {
            let rtype = {
                let t = row_string(rel, "rtype");
                if t.is_empty() {
                    "RELATED_TO".to_string()
                } else {
                    t
                }
            };
            let props_cypher = to_cypher_map(&row_property_map(rel, "rprops"));
            let source_id = validate_id(&row_id(rel, "sid"))?;

            self.db
                .execute_cypher(
                    graph_name,
                    &format!(
                        r#"
                        MATCH (source), (keeper)
                        WHERE id(source) = {source_id} AND id(keeper) = {safe_keep}
                        CREATE (source)-[nr:{rtype} {props_cypher}]->(keeper)
                        RETURN id(nr) as id
                        "#
                    ),
                )
                .await?;
        }

        if !rels.is_empty() {
            self.db
                .execute_cypher(
                    graph_name,
                    &format!(
                        r#"
                        MATCH (source)-[r]->(old)
                        WHERE id(old) = {safe_remove} AND id(source) <> {safe_keep}
                        DELETE r
                        RETURN count(*) as deleted
                        "#
                    ),
                )
                .await?;
        }

        Ok(())
    }

    /// Neighbourhood of an entity up to `depth` hops, as de-duplicated node
    /// and edge sets. A node with no relationships still yields itself.
    pub async fn get_local_graph(
        &self,
        graph_name: &str,
        entity_id: &str,
        depth: usize,
    ) -> ServiceResult<GraphData> {
        let safe_id = validate_id(entity_id)?;
        let cypher = format!(
            r#"
            MATCH path = (start)-[*1..{depth}]-(connected)
            WHERE id(start) = {safe_id}
            WITH nodes(path) as ns, relationships(path) as rs
            UNWIND ns as n
            WITH collect(DISTINCT {{
                id: id(n),
                name: n.name,
                type: labels(n),
                properties: properties(n)
            }}) as nodes, rs
            UNWIND rs as r
            RETURN nodes, collect(DISTINCT {{
                id: id(r),
                source: id(startNode(r)),
                target: id(endNode(r)),
                type: type(r)
            }}) as edges
            "#
        );

        let results = self.db.execute_cypher(graph_name, &cypher).await?;
        if let Some(row) = results.first() {
            return Ok(GraphData {
                nodes: parse_nodes(row.get("nodes")),
                edges: parse_edges(row.get("edges")),
            });
        }

        // Disconnected node: the path match is empty, so fetch the center
        // node itself and return it alone.
        let node_cypher = format!(
            r#"
            MATCH (n)
            WHERE id(n) = {safe_id}
            RETURN id(n) as id, n.name as name, labels(n) as type, properties(n) as properties
            "#
        );
        let node_rows = self.db.execute_cypher(graph_name, &node_cypher).await?;
        let nodes = node_rows
            .iter()
            .map(|row| GraphDataNode {
                id: row_id(row, "id"),
                name: row_string(row, "name"),
                entity_type: row_label(row, "type"),
                properties: row_properties(row, "properties"),
            })
            .collect();

        Ok(GraphData {
            nodes,
            edges: Vec::new(),
        })
    }

    /// Sample of the whole graph for visualisation. When `types` is given,
    /// each label is fetched separately and only edges with both endpoints
    /// in the collected node set are returned.
    pub async fn get_full_graph(
        &self,
        graph_name: &str,
        limit: i64,
        types: Option<&[EntityType]>,
    ) -> ServiceResult<FullGraphData> {
        let mut nodes = Vec::new();

        match types {
            Some(entity_types) if !entity_types.is_empty() => {
                for entity_type in entity_types {
                    let cypher = format!(
                        r#"
                        MATCH (n:{label})
                        RETURN id(n) as id, n.name as name, labels(n) as type, properties(n) as properties
                        ORDER BY n.name
                        LIMIT {limit}
                        "#,
                        label = entity_type.as_str(),
                    );
                    let rows = self.db.execute_cypher(graph_name, &cypher).await?;
                    nodes.extend(rows.iter().map(|row| GraphDataNode {
                        id: row_id(row, "id"),
                        name: row_string(row, "name"),
                        entity_type: row_label(row, "type"),
                        properties: row_properties(row, "properties"),
                    }));
                }
            }
            _ => {
                let cypher = format!(
                    r#"
                    MATCH (n)
                    RETURN id(n) as id, n.name as name, labels(n) as type, properties(n) as properties
                    LIMIT {limit}
                    "#
                );
                let rows = self.db.execute_cypher(graph_name, &cypher).await?;
                nodes.extend(rows.iter().map(|row| GraphDataNode {
                    id: row_id(row, "id"),
                    name: row_string(row, "name"),
                    entity_type: row_label(row, "type"),
                    properties: row_properties(row, "properties"),
                }));
            }
        }

        let edges = if nodes.is_empty() {
            Vec::new()
        } else {
            let id_list = nodes
                .iter()
                .map(|n| n.id.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let edge_limit = limit * 2;
            let cypher = format!(
                r#"
                MATCH (a)-[r]->(b)
                WHERE id(a) IN [{id_list}] AND id(b) IN [{id_list}]
                RETURN id(r) as id, id(a) as source, id(b) as target, type(r) as type
                LIMIT {edge_limit}
                "#
            );
            let rows = self.db.execute_cypher(graph_name, &cypher).await?;
            rows.iter()
                .map(|row| GraphDataEdge {
                    id: row_id(row, "id"),
                    source: row_id(row, "source"),
                    target: row_id(row, "target"),
                    relationship_type: row_string(row, "type"),
                })
                .collect()
        };

        let stats = GraphCounts {
            node_count: nodes.len(),
            edge_count: edges.len(),
        };
        Ok(FullGraphData { nodes, edges, stats })
    }

    /// Per-label node counts plus the total edge count.
    pub async fn get_graph_stats(&self, graph_name: &str) -> ServiceResult<GraphStats> {
        let stats_cypher = r#"
            MATCH (n)
            WITH labels(n) as type, count(*) as count
            RETURN type, count
        "#;
        let edge_cypher = r#"
            MATCH ()-[r]->()
            RETURN count(r) as edge_count
        "#;

        let type_counts = self.db.execute_cypher(graph_name, stats_cypher).await?;
        let edge_result = self.db.execute_cypher(graph_name, edge_cypher).await?;

        let mut types = BTreeMap::new();
        let mut node_count = 0;
        for row in &type_counts {
            let count = row_i64(row, "count");
            node_count += count;
            let label = row_label(row, "type");
            if label != "Unknown" {
                *types.entry(label).or_insert(0) += count;
            }
        }

        let edge_count = edge_result
            .first()
            .map(|row| row_i64(row, "edge_count"))
            .unwrap_or_default();

        Ok(GraphStats {
            node_count,
            edge_count,
            types,
        })
    }
}

fn parse_nodes(value: Option<&Value>) -> Vec<GraphDataNode> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|n| GraphDataNode {
                    id: row_id(n, "id"),
                    name: row_string(n, "name"),
                    entity_type: row_label(n, "type"),
                    properties: row_properties(n, "properties"),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_edges(value: Option<&Value>) -> Vec<GraphDataEdge> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_object)
                .map(|e| GraphDataEdge {
                    id: row_id(e, "id"),
                    source: row_id(e, "source"),
                    target: row_id(e, "target"),
                    relationship_type: row_string(e, "type"),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(pairs: &[(&str, Value)]) -> JsonMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn cypher_map_quotes_and_escapes_strings() {
        let props = map(&[("name", json!("O'Brien"))]);
        assert_eq!(to_cypher_map(&props), r"{name: 'O\'Brien'}");
    }

    #[test]
    fn cypher_map_renders_scalars_natively() {
        let props = map(&[
            ("count", json!(42)),
            ("ratio", json!(0.5)),
            ("active", json!(true)),
        ]);
        let rendered = to_cypher_map(&props);
        assert!(rendered.contains("count: 42"));
        assert!(rendered.contains("ratio: 0.5"));
        assert!(rendered.contains("active: true"));
    }

    #[test]
    fn cypher_map_json_encodes_compound_values() {
        let props = map(&[("tags", json!(["a", "b"]))]);
        assert_eq!(to_cypher_map(&props), r#"{tags: '["a","b"]'}"#);
    }

    #[test]
    fn cypher_map_drops_null_values() {
        let props = map(&[("keep", json!("x")), ("drop", Value::Null)]);
        assert_eq!(to_cypher_map(&props), "{keep: 'x'}");
    }

    #[test]
    fn validate_id_accepts_bare_and_prefixed_ids() {
        assert_eq!(validate_id("42").unwrap(), 42);
        assert_eq!(validate_id("entity_1125899906842625").unwrap(), 1125899906842625);
        assert_eq!(validate_id("chunk_7").unwrap(), 7);
    }

    #[test]
    fn validate_id_rejects_non_integers() {
        assert!(validate_id("abc").is_err());
        assert!(validate_id("entity_").is_err());
        assert!(validate_id("").is_err());
    }

    #[test]
    fn gate_rejects_every_write_keyword() {
        for query in [
            "MATCH (n) DETACH DELETE n",
            "CREATE (n:Concept {name: 'x'})",
            "DROP GRAPH foo",
            "MATCH (n) SET n.x = 1",
            "MATCH (n) REMOVE n.x",
            "MERGE (n:Concept {name: 'x'})",
            "CALL db.labels()",
            "match (n) delete n",
        ] {
            assert!(has_dangerous_keywords(query), "should reject: {query}");
        }
    }

    #[test]
    fn gate_allows_identifier_lookalikes() {
        for query in [
            "MATCH (n) WHERE n.name = 'dataset' RETURN n LIMIT 5",
            "MATCH (n) RETURN n.create_date",
            "MATCH (n) RETURN n.MERGED_AT",
            "MATCH (n) WHERE n.kind = 'dropdown' RETURN n",
        ] {
            assert!(!has_dangerous_keywords(query), "should allow: {query}");
        }
    }

    #[test]
    fn gate_checks_only_executable_text() {
        // Keywords that exist solely inside comments are not executable.
        assert!(!has_dangerous_keywords("MATCH (n) RETURN n // DELETE later"));
        assert!(!has_dangerous_keywords("/* DROP this? */ MATCH (n) RETURN n"));
        // Stripping the comment must not hide a live keyword elsewhere.
        assert!(has_dangerous_keywords("// harmless\nMATCH (n) DETACH DELETE n"));
    }
}
