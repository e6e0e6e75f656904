// PostgreSQL + AGE gateway: bounded connection pool, embedded migrations,
// and the typed named-graph query wrapper.

pub mod models;
pub mod queries;

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{error, info};

use crate::config::Settings;
use crate::error::{ServiceError, ServiceResult};

pub type JsonMap = serde_json::Map<String, Value>;

// AGE requires loading the extension and the catalog search path per session.
const SESSION_PREAMBLE: &str = "LOAD 'age'; SET search_path = ag_catalog, public;";

static RETURN_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\bRETURN\b\s+(.+?)(?:\bORDER\b|\bLIMIT\b|\bSKIP\b|$)").unwrap());
static AS_ALIAS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\s+as\s+(\w+)\s*$").unwrap());
static NON_IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").unwrap());

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open the pool and run pending migrations.
    pub async fn connect(settings: &Settings) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .min_connections(2)
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&settings.postgres_dsn())
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        info!(host = %settings.postgres_host, "Database pool opened");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }

    /// Execute a Cypher query on a named AGE graph.
    ///
    /// AGE demands an explicit typed column list for the result relation, so
    /// the RETURN clause is inspected to synthesise one (`data` when the
    /// query has no RETURN). Each `agtype` cell is fetched as text and
    /// decoded into a native JSON value where possible.
    pub async fn execute_cypher(
        &self,
        graph_name: &str,
        cypher: &str,
    ) -> ServiceResult<Vec<JsonMap>> {
        let columns = parse_return_columns(cypher);
        let column_defs = columns
            .iter()
            .map(|c| format!("{c} agtype"))
            .collect::<Vec<_>>()
            .join(", ");
        let select_list = columns
            .iter()
            .map(|c| format!("{c}::text AS {c}"))
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!(
            "SELECT {select_list} FROM cypher('{graph_name}', $cypher$ {cypher} $cypher$) AS result({column_defs});"
        );

        let mut conn = self.pool.acquire().await?;
        sqlx::raw_sql(SESSION_PREAMBLE).execute(&mut *conn).await?;

        let rows = sqlx::query(&sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| {
                let preview: String = cypher.chars().take(200).collect();
                error!(query = %preview, error = %e, "Cypher execution failed");
                ServiceError::Graph(e.to_string())
            })?;

        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let mut parsed = JsonMap::new();
            for (i, column) in columns.iter().enumerate() {
                let raw: Option<String> = row.try_get(i)?;
                parsed.insert(column.clone(), parse_agtype(raw));
            }
            results.push(parsed);
        }
        Ok(results)
    }
}

/// Extract result column names from a Cypher RETURN clause.
///
/// Splits the clause on top-level commas only, so map and list literals do
/// not break apart, and prefers `as` aliases over raw expressions.
pub fn parse_return_columns(cypher: &str) -> Vec<String> {
    let Some(caps) = RETURN_CLAUSE.captures(cypher) else {
        return vec!["data".to_string()];
    };
    let clause = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");

    let mut columns = Vec::new();
    for item in split_top_level(clause) {
        let column = match AS_ALIAS.captures(&item) {
            Some(alias) => alias[1].to_string(),
            None => {
                let last = item.rsplit('.').next().unwrap_or(&item);
                NON_IDENTIFIER.replace_all(last, "_").to_string()
            }
        };
        columns.push(column);
    }

    if columns.is_empty() {
        vec!["data".to_string()]
    } else {
        columns
    }
}

/// Split on commas that sit outside any parenthesis, brace or bracket.
fn split_top_level(clause: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth: i32 = 0;

    for ch in clause.chars() {
        match ch {
            '(' | '{' | '[' => {
                depth += 1;
                current.push(ch);
            }
            ')' | '}' | ']' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                if !current.trim().is_empty() {
                    items.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        items.push(current.trim().to_string());
    }
    items
}

/// Decode a single agtype cell.
///
/// Tagged literals (`{...}::vertex`, `{...}::edge`) and plain JSON payloads
/// become native values; anything unparseable is returned verbatim.
pub fn parse_agtype(value: Option<String>) -> Value {
    let Some(text) = value else {
        return Value::Null;
    };
    let clean = match text.split_once("::") {
        Some((head, _)) => head,
        None => text.as_str(),
    };
    serde_json::from_str(clean).unwrap_or(Value::String(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn return_columns_with_aliases() {
        let cypher = "MATCH (n) RETURN id(n) as id, n.name as name, labels(n) as type";
        assert_eq!(parse_return_columns(cypher), vec!["id", "name", "type"]);
    }

    #[test]
    fn return_columns_respect_nested_literals() {
        let cypher = "MATCH (n) OPTIONAL MATCH (n)-[r]-(c) RETURN id(n) as id, collect({id: id(c), name: c.name, direction: 'out'}) as connections";
        assert_eq!(parse_return_columns(cypher), vec!["id", "connections"]);
    }

    #[test]
    fn return_columns_stop_at_order_and_limit() {
        let cypher = "MATCH (n) RETURN id(n) as id, n.name as name ORDER BY n.name LIMIT 10";
        assert_eq!(parse_return_columns(cypher), vec!["id", "name"]);
    }

    #[test]
    fn return_columns_sanitise_bare_expressions() {
        let cypher = "MATCH (n) RETURN n.name, count(*)";
        assert_eq!(parse_return_columns(cypher), vec!["name", "count___"]);
    }

    #[test]
    fn return_columns_default_to_data() {
        assert_eq!(parse_return_columns("CREATE (n:Concept)"), vec!["data"]);
    }

    #[test]
    fn agtype_strips_vertex_suffix() {
        let cell = r#"{"id": 844424930131969, "label": "Component", "properties": {"name": "Alpha"}}::vertex"#;
        let parsed = parse_agtype(Some(cell.to_string()));
        assert_eq!(parsed["id"], json!(844424930131969i64));
        assert_eq!(parsed["label"], json!("Component"));
        assert_eq!(parsed["properties"]["name"], json!("Alpha"));
    }

    #[test]
    fn agtype_parses_scalars() {
        assert_eq!(parse_agtype(Some("42".to_string())), json!(42));
        assert_eq!(parse_agtype(Some("\"hello\"".to_string())), json!("hello"));
        assert_eq!(parse_agtype(Some("[1, 2]".to_string())), json!([1, 2]));
        assert_eq!(parse_agtype(None), Value::Null);
    }

    #[test]
    fn agtype_falls_back_to_raw_string() {
        let raw = "not json at all";
        assert_eq!(
            parse_agtype(Some(raw.to_string())),
            Value::String(raw.to_string())
        );
    }
}
