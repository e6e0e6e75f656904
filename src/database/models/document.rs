use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Closed set of document content types; each one selects an extraction
/// prompt specialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    DesignToken,
    Contract,
    Component,
    Spec,
    Note,
    #[default]
    General,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::DesignToken => "design_token",
            ContentType::Contract => "contract",
            ContentType::Component => "component",
            ContentType::Spec => "spec",
            ContentType::Note => "note",
            ContentType::General => "general",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "design_token" => Some(ContentType::DesignToken),
            "contract" => Some(ContentType::Contract),
            "component" => Some(ContentType::Component),
            "spec" => Some(ContentType::Spec),
            "note" => Some(ContentType::Note),
            "general" => Some(ContentType::General),
            _ => None,
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DocumentRow {
    pub id: Uuid,
    pub project_id: Uuid,
    pub filename: Option<String>,
    pub content_type: String,
    pub source_url: Option<String>,
    pub raw_content: String,
    pub metadata: Option<Value>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

// Request/Response structures
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateDocumentRequest {
    pub filename: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    pub source_url: Option<String>,
    pub raw_content: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub filename: Option<String>,
    pub content_type: ContentType,
    pub source_url: Option<String>,
    pub metadata: Value,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<i64>,
}

impl DocumentResponse {
    pub fn from_row(row: DocumentRow, chunk_count: Option<i64>) -> Self {
        Self {
            id: row.id,
            filename: row.filename,
            content_type: ContentType::from_str(&row.content_type).unwrap_or_default(),
            source_url: row.source_url,
            metadata: row.metadata.unwrap_or_else(|| Value::Object(Default::default())),
            processed: row.processed,
            processed_at: row.processed_at,
            error_message: row.error_message,
            created_at: row.created_at,
            chunk_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentResponse>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProcessDocumentResponse {
    pub document_id: Uuid,
    pub chunks_created: usize,
    pub entities_extracted: usize,
    pub relationships_created: usize,
    pub duration_ms: u64,
}
