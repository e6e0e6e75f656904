// Hybrid search (vector similarity ∪ graph text match) and cross-project
// fan-out with a single shared query embedding.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::database::models::{
    EntityType, FanoutSearchResponse, ProjectSearchStats, SearchRequest, SearchResponse,
    SearchResult, SearchStats,
};
use crate::database::queries::projects;
use crate::database::{Database, JsonMap};
use crate::error::{ServiceError, ServiceResult};
use crate::services::embedding::EmbeddingService;
use crate::services::vector::VectorService;
use crate::utils::normalize_label;

// Upper bound on concurrent per-project subqueries during fan-out.
const FANOUT_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct SearchService {
    db: Database,
    vector: VectorService,
    embedding: EmbeddingService,
}

impl SearchService {
    pub fn new(db: Database, vector: VectorService, embedding: EmbeddingService) -> Self {
        Self {
            db,
            vector,
            embedding,
        }
    }

    /// Hybrid search within one project.
    ///
    /// `embedding` is an optional pre-computed query vector; when present the
    /// vector path re-uses it instead of calling the embedding provider.
    /// Fan-out passes the same vector to every project this way.
    pub async fn search(
        &self,
        project_slug: &str,
        graph_name: &str,
        request: &SearchRequest,
        embedding: Option<&[f32]>,
    ) -> ServiceResult<SearchResponse> {
        let start = Instant::now();
        let entity_types = request
            .filters
            .as_ref()
            .and_then(|f| f.entity_types.clone());

        let mut results: Vec<SearchResult> = Vec::new();
        let mut vector_hits = 0;
        let mut graph_hits = 0;

        if request.mode.uses_vector() {
            let vector_results = self
                .vector_search(project_slug, &request.query, request.limit, embedding)
                .await;
            vector_hits = vector_results.len();
            results.extend(vector_results);
        }

        if request.mode.uses_graph() {
            let graph_results = self
                .graph_search(
                    graph_name,
                    &request.query,
                    request.limit,
                    entity_types.as_deref(),
                )
                .await;
            graph_hits = graph_results.len();
            results.extend(graph_results);
        }

        let results = merge_results(results, request.limit);

        Ok(SearchResponse {
            results,
            stats: SearchStats {
                vector_hits,
                graph_hits,
                total_time_ms: start.elapsed().as_millis() as u64,
            },
        })
    }

    /// Vector similarity path. Failures are logged and yield no hits rather
    /// than failing the whole search.
    async fn vector_search(
        &self,
        project_slug: &str,
        query: &str,
        limit: usize,
        embedding: Option<&[f32]>,
    ) -> Vec<SearchResult> {
        let attempt = async {
            let query_vector = match embedding {
                Some(vector) => vector.to_vec(),
                None => self.embedding.embed_text(query).await?,
            };

            let hits = self
                .vector
                .search(project_slug, &query_vector, limit, None)
                .await?;

            Ok::<_, ServiceError>(
                hits.into_iter()
                    .map(|hit| SearchResult {
                        id: format!("chunk_{}", hit.id),
                        result_type: "chunk".to_string(),
                        label: "Chunk".to_string(),
                        name: format!("Chunk {}", hit.chunk_index),
                        content: hit.content.chars().take(500).collect(),
                        score: hit.score,
                        source: "vector".to_string(),
                        connections: Vec::new(),
                        project: None,
                    })
                    .collect::<Vec<_>>(),
            )
        };

        match attempt.await {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "Vector search failed");
                Vec::new()
            }
        }
    }

    /// Graph text-match path: case-insensitive CONTAINS over name and
    /// description, optionally restricted to a union of labels.
    async fn graph_search(
        &self,
        graph_name: &str,
        query: &str,
        limit: usize,
        entity_types: Option<&[EntityType]>,
    ) -> Vec<SearchResult> {
        let attempt = async {
            let type_filter = match entity_types {
                Some(types) if !types.is_empty() => {
                    let labels: Vec<&str> = types.iter().map(EntityType::as_str).collect();
                    format!(":{}", labels.join("|"))
                }
                _ => String::new(),
            };
            let escaped = query.replace('\'', "\\'");

            let cypher = format!(
                r#"
                MATCH (n{type_filter})
                WHERE toLower(n.name) CONTAINS toLower('{escaped}')
                   OR toLower(n.description) CONTAINS toLower('{escaped}')
                RETURN id(n) as id, n.name as entity_name, labels(n) as entity_type, n.description as description
                LIMIT {limit}
                "#
            );

            let rows = self.db.execute_cypher(graph_name, &cypher).await?;

            Ok::<_, ServiceError>(
                rows.iter()
                    .filter(|row| !field_str(row, "entity_name").is_empty())
                    .map(|row| {
                        let name = field_str(row, "entity_name");
                        let description = field_str(row, "description");
                        SearchResult {
                            id: field_id(row, "id"),
                            result_type: "entity".to_string(),
                            label: normalize_label(
                                row.get("entity_type").unwrap_or(&Value::Null),
                            ),
                            content: if description.is_empty() {
                                name.clone()
                            } else {
                                description
                            },
                            name,
                            score: 1.0,
                            source: "graph".to_string(),
                            connections: Vec::new(),
                            project: None,
                        }
                    })
                    .collect::<Vec<_>>(),
            )
        };

        match attempt.await {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "Graph search failed");
                Vec::new()
            }
        }
    }

    /// Search every project in parallel and merge.
    ///
    /// The query is embedded exactly once and shared across all per-project
    /// subqueries; a fan-out over N projects makes one embedding call, not N.
    /// Per-project failures collapse to empty result lists.
    pub async fn fanout(&self, request: SearchRequest) -> ServiceResult<FanoutSearchResponse> {
        let all_projects = projects::list_projects(self.db.pool()).await?;
        if all_projects.is_empty() {
            return Ok(FanoutSearchResponse {
                results: Vec::new(),
                total: 0,
                projects_searched: 0,
                project_stats: Vec::new(),
            });
        }

        let query_embedding = if request.mode.uses_vector() {
            Some(self.embedding.embed_text(&request.query).await?)
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(FANOUT_CONCURRENCY));
        let request = Arc::new(request);

        let mut tasks = Vec::with_capacity(all_projects.len());
        for project in &all_projects {
            let service = self.clone();
            let request = Arc::clone(&request);
            let embedding = query_embedding.clone();
            let semaphore = Arc::clone(&semaphore);
            let slug = project.slug.clone();
            let graph_name = project.graph_name.clone();

            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = (String, Vec<SearchResult>)> + Send>> = Box::pin(async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (slug, Vec::new()),
                };

                match service
                    .search(&slug, &graph_name, &request, embedding.as_deref())
                    .await
                {
                    Ok(mut response) => {
                        for result in &mut response.results {
                            result.project = Some(slug.clone());
                        }
                        (slug, response.results)
                    }
                    Err(e) => {
                        warn!(project = %slug, error = %e, "Fan-out search failed for project");
                        (slug, Vec::new())
                    }
                }
            });
            tasks.push(tokio::spawn(fut));
        }

        let outcomes = futures::future::join_all(tasks).await;

        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut merged: Vec<SearchResult> = Vec::new();
        let mut project_stats: Vec<ProjectSearchStats> = Vec::new();

        for outcome in outcomes {
            let (slug, results) = match outcome {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "Fan-out subquery task failed");
                    continue;
                }
            };

            let mut count = 0;
            for result in results {
                if seen_ids.insert(result.id.clone()) {
                    merged.push(result);
                    count += 1;
                }
            }
            project_stats.push(ProjectSearchStats {
                project: slug,
                result_count: count,
            });
        }

        merged.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged.truncate(request.limit);

        Ok(FanoutSearchResponse {
            total: merged.len(),
            projects_searched: all_projects.len(),
            project_stats,
            results: merged,
        })
    }
}

fn field_str(row: &JsonMap, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn field_id(row: &JsonMap, key: &str) -> String {
    match row.get(key) {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => String::new(),
    }
}

/// Deterministic merge: score descending (stable), first occurrence of each
/// id wins, truncated to the requested limit.
fn merge_results(results: Vec<SearchResult>, limit: usize) -> Vec<SearchResult> {
    let mut sorted = results;
    sorted.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut seen: HashSet<String> = HashSet::new();
    let mut unique = Vec::new();
    for result in sorted {
        if seen.insert(result.id.clone()) {
            unique.push(result);
        }
    }
    unique.truncate(limit);
    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, score: f32, source: &str) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            result_type: "entity".to_string(),
            label: "Concept".to_string(),
            name: id.to_string(),
            content: String::new(),
            score,
            source: source.to_string(),
            connections: Vec::new(),
            project: None,
        }
    }

    #[test]
    fn merge_sorts_by_score_descending() {
        let merged = merge_results(
            vec![
                result("a", 0.2, "vector"),
                result("b", 0.9, "vector"),
                result("c", 0.5, "graph"),
            ],
            10,
        );
        let ids: Vec<&str> = merged.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn merge_dedups_by_id_keeping_first() {
        let merged = merge_results(
            vec![
                result("x", 1.0, "graph"),
                result("x", 0.4, "vector"),
                result("y", 0.8, "vector"),
            ],
            10,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].id, "x");
        assert_eq!(merged[0].source, "graph");
    }

    #[test]
    fn merge_truncates_to_limit() {
        let results = (0..10)
            .map(|i| result(&format!("r{i}"), i as f32 / 10.0, "vector"))
            .collect();
        let merged = merge_results(results, 3);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].id, "r9");
    }

    #[test]
    fn merge_is_stable_for_equal_scores() {
        let merged = merge_results(
            vec![
                result("first", 1.0, "graph"),
                result("second", 1.0, "graph"),
            ],
            10,
        );
        assert_eq!(merged[0].id, "first");
        assert_eq!(merged[1].id, "second");
    }
}
