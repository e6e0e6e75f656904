// Environment-driven configuration, loaded once at startup.

use once_cell::sync::Lazy;
use rand::Rng;

use crate::services::chunking::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};

// Fallback secret for the session lifetime when JWT_SECRET is not set.
static GENERATED_JWT_SECRET: Lazy<String> = Lazy::new(|| {
    let mut rng = rand::thread_rng();
    let secret: Vec<u8> = (0..32).map(|_| rng.gen()).collect();
    hex::encode(secret)
});

#[derive(Debug, Clone)]
pub struct Settings {
    pub app_name: String,

    // HTTP server
    pub host: String,
    pub port: u16,

    // PostgreSQL + AGE
    pub postgres_host: String,
    pub postgres_port: u16,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,

    // Vector store
    pub qdrant_url: String,

    // LLM providers
    pub anthropic_api_key: String,
    pub openai_api_key: String,
    pub extraction_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,

    // Auth
    pub jwt_secret: String,

    // Chunking
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Knowledge Graph"),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 8000),
            postgres_host: env_or("POSTGRES_HOST", "localhost"),
            postgres_port: env_parse("POSTGRES_PORT", 5432),
            postgres_user: env_or("POSTGRES_USER", "knowledge"),
            postgres_password: env_or("POSTGRES_PASSWORD", ""),
            postgres_db: env_or("POSTGRES_DB", "knowledge"),
            qdrant_url: env_or("QDRANT_URL", "http://localhost:6334"),
            anthropic_api_key: env_or("ANTHROPIC_API_KEY", ""),
            openai_api_key: env_or("OPENAI_API_KEY", ""),
            extraction_model: env_or("EXTRACTION_MODEL", "claude-sonnet-4-20250514"),
            embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimensions: env_parse("EMBEDDING_DIMENSIONS", 1536),
            jwt_secret: jwt_secret(),
            chunk_size: env_parse("CHUNK_SIZE", DEFAULT_CHUNK_SIZE),
            chunk_overlap: env_parse("CHUNK_OVERLAP", DEFAULT_CHUNK_OVERLAP),
        }
    }

    pub fn postgres_dsn(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.postgres_user,
            self.postgres_password,
            self.postgres_host,
            self.postgres_port,
            self.postgres_db
        )
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// JWT secret from the environment, or a random per-process secret.
fn jwt_secret() -> String {
    std::env::var("JWT_SECRET").unwrap_or_else(|_| GENERATED_JWT_SECRET.clone())
}
