// Embedding gateway over the OpenAI embeddings API.

use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::config::Settings;
use crate::error::{ServiceError, ServiceResult};

const EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Text-to-vector calls, single and batched.
///
/// Without an API key both calls return zero vectors of the configured
/// dimension so downstream paths stay exercisable.
#[derive(Clone)]
pub struct EmbeddingService {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(settings: &Settings) -> Self {
        let api_key = if settings.openai_api_key.is_empty() {
            warn!("Embedding provider not configured, embeddings fall back to zero vectors");
            None
        } else {
            Some(settings.openai_api_key.clone())
        };

        Self {
            client: reqwest::Client::new(),
            api_key,
            model: settings.embedding_model.clone(),
            dimension: settings.embedding_dimensions,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub async fn embed_text(&self, text: &str) -> ServiceResult<Vec<f32>> {
        let Some(api_key) = &self.api_key else {
            warn!("Embedding provider not configured, returning zero vector");
            return Ok(vec![0.0; self.dimension]);
        };

        let body = self
            .request(api_key, serde_json::json!({ "model": self.model, "input": text }))
            .await?;

        body.data
            .into_iter()
            .next()
            .map(|item| item.embedding)
            .ok_or_else(|| ServiceError::Embedding("provider returned no embeddings".to_string()))
    }

    /// Batched embedding. The provider tags results with their input index;
    /// results are sorted by it so output order always matches input order.
    pub async fn embed_texts(&self, texts: &[String]) -> ServiceResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let Some(api_key) = &self.api_key else {
            warn!("Embedding provider not configured, returning zero vectors");
            return Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect());
        };

        let mut body = self
            .request(api_key, serde_json::json!({ "model": self.model, "input": texts }))
            .await?;

        body.data.sort_by_key(|item| item.index);
        Ok(body.data.into_iter().map(|item| item.embedding).collect())
    }

    async fn request(
        &self,
        api_key: &str,
        payload: serde_json::Value,
    ) -> ServiceResult<EmbeddingResponse> {
        let response = self
            .client
            .post(EMBEDDINGS_URL)
            .bearer_auth(api_key)
            .timeout(REQUEST_TIMEOUT)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ServiceError::Embedding(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::Embedding(format!(
                "provider returned status {}",
                response.status()
            )));
        }

        response
            .json::<EmbeddingResponse>()
            .await
            .map_err(|e| ServiceError::Embedding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> EmbeddingService {
        let mut settings = Settings::from_env();
        settings.openai_api_key = String::new();
        settings.embedding_dimensions = 8;
        EmbeddingService::new(&settings)
    }

    #[tokio::test]
    async fn zero_vector_fallback_for_single_text() {
        let service = unconfigured();
        let vector = service.embed_text("hello").await.unwrap();
        assert_eq!(vector.len(), 8);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn zero_vector_fallback_preserves_batch_shape() {
        let service = unconfigured();
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let vectors = service.embed_texts(&texts).await.unwrap();
        assert_eq!(vectors.len(), 3);
        assert!(vectors.iter().all(|v| v.len() == 8));
    }

    #[tokio::test]
    async fn empty_batch_returns_empty() {
        let service = unconfigured();
        assert!(service.embed_texts(&[]).await.unwrap().is_empty());
    }

    #[test]
    fn batch_results_sort_by_provider_index() {
        let mut response = EmbeddingResponse {
            data: vec![
                EmbeddingItem { index: 2, embedding: vec![2.0] },
                EmbeddingItem { index: 0, embedding: vec![0.0] },
                EmbeddingItem { index: 1, embedding: vec![1.0] },
            ],
        };
        response.data.sort_by_key(|item| item.index);
        let flat: Vec<f32> = response.data.iter().map(|i| i.embedding[0]).collect();
        assert_eq!(flat, vec![0.0, 1.0, 2.0]);
    }
}
