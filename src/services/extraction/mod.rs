// LLM-driven entity extraction with cross-chunk deduplication.

pub mod prompts;

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Settings;
use crate::database::models::ContentType;
use crate::database::JsonMap;
use crate::error::{ServiceError, ServiceResult};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_RESPONSE_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

static JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json)?\s*([\s\S]*?)```").unwrap());

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    pub temp_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub properties: JsonMap,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
    #[serde(default)]
    pub properties: JsonMap,
}

#[derive(Debug, Default)]
pub struct ChunkExtraction {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
    pub tokens_used: u64,
}

#[derive(Debug, Default)]
pub struct DocumentExtraction {
    pub entities: Vec<ExtractedEntity>,
    pub relationships: Vec<ExtractedRelationship>,
    pub total_tokens_used: u64,
    pub chunks_processed: usize,
    pub deduplicated_count: usize,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

/// Entity extraction gateway over the Anthropic messages API.
#[derive(Clone)]
pub struct ExtractionService {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
}

impl ExtractionService {
    pub fn new(settings: &Settings) -> Self {
        let api_key = if settings.anthropic_api_key.is_empty() {
            warn!("Extraction provider not configured, extraction will be disabled");
            None
        } else {
            Some(settings.anthropic_api_key.clone())
        };

        Self {
            client: reqwest::Client::new(),
            api_key,
            model: settings.extraction_model.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Extract entities and relationships from a single text chunk.
    pub async fn extract_from_chunk(
        &self,
        text: &str,
        content_type: ContentType,
        context: &[(String, String)],
    ) -> ServiceResult<ChunkExtraction> {
        let Some(api_key) = &self.api_key else {
            warn!("Extraction skipped: provider not configured");
            return Ok(ChunkExtraction::default());
        };
        if text.trim().is_empty() {
            return Ok(ChunkExtraction::default());
        }

        let system_prompt = format!(
            "{}\n\n{}",
            prompts::extraction_prompt(content_type),
            prompts::RESPONSE_SCHEMA
        );

        let mut user_message = format!("## Text to Extract From:\n\n{text}");
        if !context.is_empty() {
            let context_block = context
                .iter()
                .map(|(k, v)| format!("- {k}: {v}"))
                .collect::<Vec<_>>()
                .join("\n");
            user_message = format!("## Context:\n{context_block}\n\n{user_message}");
        }

        let response = self
            .client
            .post(MESSAGES_URL)
            .header("x-api-key", api_key.as_str())
            .header("anthropic-version", API_VERSION)
            .timeout(REQUEST_TIMEOUT)
            .json(&serde_json::json!({
                "model": self.model,
                "max_tokens": MAX_RESPONSE_TOKENS,
                "system": system_prompt,
                "messages": [{ "role": "user", "content": user_message }],
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Extraction(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::Extraction(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Extraction(e.to_string()))?;

        let response_text = body
            .content
            .first()
            .and_then(|block| block.text.clone())
            .unwrap_or_default();
        let tokens_used = body
            .usage
            .map(|u| u.input_tokens.unwrap_or(0) + u.output_tokens.unwrap_or(0))
            .unwrap_or(0);

        let (entities, relationships) = parse_extraction_response(&response_text);

        info!(
            content_type = %content_type,
            entities_count = entities.len(),
            relationships_count = relationships.len(),
            tokens_used,
            "Extraction completed"
        );

        Ok(ChunkExtraction {
            entities,
            relationships,
            tokens_used,
        })
    }

    /// Extract from every chunk of a document, then deduplicate entities
    /// across chunks and remap relationship references.
    pub async fn extract_from_document(
        &self,
        chunks: &[String],
        content_type: ContentType,
        context: &[(String, String)],
    ) -> ServiceResult<DocumentExtraction> {
        let mut all_entities: Vec<ExtractedEntity> = Vec::new();
        let mut all_relationships: Vec<ExtractedRelationship> = Vec::new();
        let mut total_tokens = 0u64;
        let mut chunks_processed = 0usize;

        for (i, chunk_text) in chunks.iter().enumerate() {
            let mut chunk_context = context.to_vec();
            chunk_context.push(("chunk_index".to_string(), i.to_string()));
            chunk_context.push(("total_chunks".to_string(), chunks.len().to_string()));

            let mut result = self
                .extract_from_chunk(chunk_text, content_type, &chunk_context)
                .await?;
            prefix_chunk_ids(&mut result, i);

            all_entities.extend(result.entities);
            all_relationships.extend(result.relationships);
            total_tokens += result.tokens_used;
            chunks_processed += 1;
        }

        let raw_count = all_entities.len();
        let (entities, id_mapping, deduplicated_count) = deduplicate_entities(all_entities);
        let relationships = remap_relationships(all_relationships, &id_mapping);
        let relationships = deduplicate_relationships(relationships);

        info!(
            chunks_processed,
            raw_entities = raw_count,
            deduped_entities = entities.len(),
            deduplicated_count,
            relationships = relationships.len(),
            total_tokens,
            "Document extraction completed"
        );

        Ok(DocumentExtraction {
            entities,
            relationships,
            total_tokens_used: total_tokens,
            chunks_processed,
            deduplicated_count,
        })
    }
}

/// Make per-chunk temp_ids unique across the document.
fn prefix_chunk_ids(extraction: &mut ChunkExtraction, chunk_index: usize) {
    for entity in &mut extraction.entities {
        entity.temp_id = format!("c{chunk_index}_{}", entity.temp_id);
    }
    for rel in &mut extraction.relationships {
        rel.source = format!("c{chunk_index}_{}", rel.source);
        rel.target = format!("c{chunk_index}_{}", rel.target);
    }
}

/// Parse the model's JSON reply, tolerating a ```json fence. Malformed JSON
/// yields empty lists with a warning, never an error.
fn parse_extraction_response(
    response_text: &str,
) -> (Vec<ExtractedEntity>, Vec<ExtractedRelationship>) {
    let json_str = JSON_FENCE
        .captures(response_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| response_text.trim().to_string());

    let parsed: Value = match serde_json::from_str(&json_str) {
        Ok(value) => value,
        Err(e) => {
            let preview: String = response_text.chars().take(200).collect();
            warn!(error = %e, preview = %preview, "Failed to parse extraction response as JSON");
            return (Vec::new(), Vec::new());
        }
    };

    let mut entities = Vec::new();
    for raw in parsed
        .get("entities")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(obj) = raw.as_object() else { continue };
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string();
        if name.is_empty() {
            continue;
        }
        entities.push(ExtractedEntity {
            temp_id: obj
                .get("temp_id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("e{}", entities.len() + 1)),
            name,
            entity_type: obj
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("Concept")
                .to_string(),
            properties: obj
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        });
    }

    let mut relationships = Vec::new();
    for raw in parsed
        .get("relationships")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let Some(obj) = raw.as_object() else { continue };
        let source = obj
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let target = obj
            .get("target")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if source.is_empty() || target.is_empty() {
            continue;
        }
        relationships.push(ExtractedRelationship {
            source,
            target,
            relationship_type: obj
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("RELATED_TO")
                .to_string(),
            properties: obj
                .get("properties")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        });
    }

    (entities, relationships)
}

fn uppercase_count(name: &str) -> usize {
    name.chars().filter(|c| c.is_uppercase()).count()
}

/// Deduplicate entities by `(lowercase name, type)`, merging property bags.
///
/// The group's base entity is the one with the most uppercase letters in its
/// name (so "CamelCase" beats "camelcase"). Scalar conflicts coerce to a
/// list holding both values; list-valued keys are unioned.
fn deduplicate_entities(
    entities: Vec<ExtractedEntity>,
) -> (Vec<ExtractedEntity>, HashMap<String, String>, usize) {
    let total = entities.len();

    let mut order: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<ExtractedEntity>> = HashMap::new();
    for entity in entities {
        let key = (
            entity.name.to_lowercase().trim().to_string(),
            entity.entity_type.clone(),
        );
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(entity);
    }

    let mut deduped: Vec<ExtractedEntity> = Vec::new();
    let mut id_mapping: HashMap<String, String> = HashMap::new();

    for key in order {
        let group = groups.remove(&key).unwrap_or_default();
        if group.is_empty() {
            continue;
        }

        let mut base_index = 0;
        let mut best = uppercase_count(&group[0].name);
        for (i, entity) in group.iter().enumerate().skip(1) {
            let count = uppercase_count(&entity.name);
            if count > best {
                best = count;
                base_index = i;
            }
        }

        let new_id = format!("d{}", deduped.len() + 1);
        let mut merged = JsonMap::new();

        for entity in &group {
            for (prop_key, value) in &entity.properties {
                match merged.get_mut(prop_key) {
                    None => {
                        merged.insert(prop_key.clone(), value.clone());
                    }
                    Some(existing) => {
                        if let (Value::Array(current), Value::Array(incoming)) =
                            (&*existing, value)
                        {
                            let mut combined = current.clone();
                            for item in incoming {
                                if !combined.contains(item) {
                                    combined.push(item.clone());
                                }
                            }
                            *existing = Value::Array(combined);
                        } else if *existing != *value {
                            let mut list = match existing {
                                Value::Array(items) => items.clone(),
                                other => vec![other.clone()],
                            };
                            if !list.contains(value) {
                                list.push(value.clone());
                            }
                            *existing = Value::Array(list);
                        }
                    }
                }
            }
            id_mapping.insert(entity.temp_id.clone(), new_id.clone());
        }

        deduped.push(ExtractedEntity {
            temp_id: new_id,
            name: group[base_index].name.clone(),
            entity_type: key.1,
            properties: merged,
        });
    }

    let removed = total - deduped.len();
    (deduped, id_mapping, removed)
}

/// Rewrite relationship endpoints through the dedup id map, dropping
/// self-references the merge created.
fn remap_relationships(
    relationships: Vec<ExtractedRelationship>,
    id_mapping: &HashMap<String, String>,
) -> Vec<ExtractedRelationship> {
    relationships
        .into_iter()
        .filter_map(|rel| {
            let source = id_mapping.get(&rel.source).cloned().unwrap_or(rel.source);
            let target = id_mapping.get(&rel.target).cloned().unwrap_or(rel.target);
            if source == target {
                return None;
            }
            Some(ExtractedRelationship {
                source,
                target,
                relationship_type: rel.relationship_type,
                properties: rel.properties,
            })
        })
        .collect()
}

/// Remove duplicate `(source, target, type)` triples, folding any extra
/// properties from later duplicates into the first occurrence.
fn deduplicate_relationships(
    relationships: Vec<ExtractedRelationship>,
) -> Vec<ExtractedRelationship> {
    let mut seen: HashMap<(String, String, String), usize> = HashMap::new();
    let mut deduped: Vec<ExtractedRelationship> = Vec::new();

    for rel in relationships {
        let key = (
            rel.source.clone(),
            rel.target.clone(),
            rel.relationship_type.clone(),
        );
        match seen.get(&key) {
            None => {
                seen.insert(key, deduped.len());
                deduped.push(rel);
            }
            Some(&index) => {
                let existing = &mut deduped[index];
                for (prop_key, value) in rel.properties {
                    existing.properties.entry(prop_key).or_insert(value);
                }
            }
        }
    }

    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(temp_id: &str, name: &str, entity_type: &str, props: Value) -> ExtractedEntity {
        ExtractedEntity {
            temp_id: temp_id.to_string(),
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            properties: props.as_object().cloned().unwrap_or_default(),
        }
    }

    fn rel(source: &str, target: &str, rel_type: &str) -> ExtractedRelationship {
        ExtractedRelationship {
            source: source.to_string(),
            target: target.to_string(),
            relationship_type: rel_type.to_string(),
            properties: JsonMap::new(),
        }
    }

    #[test]
    fn parses_fenced_json_response() {
        let response = r#"Here you go:
```json
{"entities": [{"temp_id": "e1", "name": "Alpha", "type": "Component", "properties": {}}],
 "relationships": [{"source": "e1", "target": "e2", "type": "USES", "properties": {}}]}
```"#;
        let (entities, relationships) = parse_extraction_response(response);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].name, "Alpha");
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].relationship_type, "USES");
    }

    #[test]
    fn parses_bare_json_and_applies_defaults() {
        let response = r#"{"entities": [{"name": "Beta"}], "relationships": []}"#;
        let (entities, _) = parse_extraction_response(response);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_type, "Concept");
        assert_eq!(entities[0].temp_id, "e1");
    }

    #[test]
    fn malformed_json_yields_empty_lists() {
        let (entities, relationships) = parse_extraction_response("not json {{{");
        assert!(entities.is_empty());
        assert!(relationships.is_empty());
    }

    #[test]
    fn drops_items_with_empty_mandatory_fields() {
        let response = r#"{
            "entities": [{"temp_id": "e1", "name": "  ", "type": "Concept"}],
            "relationships": [{"source": "e1", "target": "", "type": "USES"}]
        }"#;
        let (entities, relationships) = parse_extraction_response(response);
        assert!(entities.is_empty());
        assert!(relationships.is_empty());
    }

    #[test]
    fn chunk_prefixing_namespaces_temp_ids() {
        let mut extraction = ChunkExtraction {
            entities: vec![entity("e1", "Alpha", "Component", json!({}))],
            relationships: vec![rel("e1", "e2", "USES")],
            tokens_used: 0,
        };
        prefix_chunk_ids(&mut extraction, 3);
        assert_eq!(extraction.entities[0].temp_id, "c3_e1");
        assert_eq!(extraction.relationships[0].source, "c3_e1");
        assert_eq!(extraction.relationships[0].target, "c3_e2");
    }

    #[test]
    fn dedup_prefers_uppercase_rich_name() {
        let (deduped, mapping, removed) = deduplicate_entities(vec![
            entity("c0_e1", "camelcase", "Concept", json!({})),
            entity("c1_e1", "CamelCase", "Concept", json!({})),
        ]);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].name, "CamelCase");
        assert_eq!(deduped[0].temp_id, "d1");
        assert_eq!(removed, 1);
        assert_eq!(mapping["c0_e1"], "d1");
        assert_eq!(mapping["c1_e1"], "d1");
    }

    #[test]
    fn dedup_merges_properties() {
        let (deduped, _, _) = deduplicate_entities(vec![
            entity("a", "Alpha", "Component", json!({"color": "red", "tags": ["ui"]})),
            entity(
                "b",
                "alpha",
                "Component",
                json!({"color": "blue", "size": "L", "tags": ["core", "ui"]}),
            ),
        ]);
        assert_eq!(deduped.len(), 1);
        let props = &deduped[0].properties;
        // Conflicting scalars coerce to a list with both values.
        assert_eq!(props["color"], json!(["red", "blue"]));
        // First-seen wins for new scalar keys.
        assert_eq!(props["size"], json!("L"));
        // Lists union without duplicates.
        assert_eq!(props["tags"], json!(["ui", "core"]));
    }

    #[test]
    fn dedup_keeps_distinct_types_apart() {
        let (deduped, _, removed) = deduplicate_entities(vec![
            entity("a", "Alpha", "Component", json!({})),
            entity("b", "Alpha", "Concept", json!({})),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(removed, 0);
    }

    #[test]
    fn remap_drops_self_references() {
        let mut mapping = HashMap::new();
        mapping.insert("c0_e1".to_string(), "d1".to_string());
        mapping.insert("c1_e1".to_string(), "d1".to_string());

        let remapped = remap_relationships(
            vec![rel("c0_e1", "c1_e1", "USES"), rel("c0_e1", "c0_e9", "USES")],
            &mapping,
        );
        // The first collapses to d1 -> d1 and is dropped; the second keeps
        // its unmapped target.
        assert_eq!(remapped.len(), 1);
        assert_eq!(remapped[0].source, "d1");
        assert_eq!(remapped[0].target, "c0_e9");
    }

    #[test]
    fn relationship_dedup_merges_first_seen_properties() {
        let mut first = rel("d1", "d2", "USES");
        first.properties.insert("weight".to_string(), json!(1));
        let mut second = rel("d1", "d2", "USES");
        second.properties.insert("weight".to_string(), json!(2));
        second.properties.insert("context".to_string(), json!("extra"));

        let deduped = deduplicate_relationships(vec![first, second, rel("d1", "d2", "REQUIRES")]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].properties["weight"], json!(1));
        assert_eq!(deduped[0].properties["context"], json!("extra"));
    }

    #[test]
    fn no_duplicate_triples_and_no_self_loops_survive() {
        let mut mapping = HashMap::new();
        for id in ["a", "b"] {
            mapping.insert(id.to_string(), "d1".to_string());
        }
        mapping.insert("c".to_string(), "d2".to_string());

        let relationships = remap_relationships(
            vec![
                rel("a", "b", "USES"),
                rel("a", "c", "USES"),
                rel("b", "c", "USES"),
            ],
            &mapping,
        );
        let deduped = deduplicate_relationships(relationships);

        assert!(deduped.iter().all(|r| r.source != r.target));
        let mut keys: Vec<_> = deduped
            .iter()
            .map(|r| (r.source.clone(), r.target.clone(), r.relationship_type.clone()))
            .collect();
        let before = keys.len();
        keys.dedup();
        assert_eq!(before, keys.len());
        assert_eq!(deduped.len(), 1);
    }
}
