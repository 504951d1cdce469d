use std::time::Duration;

use async_trait::async_trait;
use rowsync_core::{Embeddings, RowsyncError};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct HttpEmbeddingsConfig {
    /// Full endpoint URL the texts are POSTed to.
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl HttpEmbeddingsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: String::new(),
            api_key: None,
            timeout: Some(Duration::from_secs(30)),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    texts: &'a [&'a str],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings served by a remote HTTP endpoint.
pub struct HttpEmbeddings {
    config: HttpEmbeddingsConfig,
    client: reqwest::Client,
}

impl HttpEmbeddings {
    pub fn new(config: HttpEmbeddingsConfig) -> Result<Self, RowsyncError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| RowsyncError::Config(format!("embedding client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn with_client(config: HttpEmbeddingsConfig, client: reqwest::Client) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &HttpEmbeddingsConfig {
        &self.config
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RowsyncError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = EmbedRequest {
            texts,
            model: &self.config.model,
        };
        let mut request = self.client.post(&self.config.url).json(&body);
        if let Some(ref key) = self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RowsyncError::Embedding(format!("embedding request: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(RowsyncError::Embedding(format!(
                "embedding service error ({code}): {text}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RowsyncError::Embedding(format!("embedding response: {e}")))?;
        if parsed.embeddings.len() != texts.len() {
            return Err(RowsyncError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }
        if parsed.embeddings.iter().any(Vec::is_empty) {
            return Err(RowsyncError::Embedding("empty embedding vector".to_string()));
        }
        debug!(count = texts.len(), "embedded texts");
        Ok(parsed.embeddings)
    }
}

#[async_trait]
impl Embeddings for HttpEmbeddings {
    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RowsyncError> {
        self.embed_batch(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, RowsyncError> {
        let mut results = self.embed_batch(&[text]).await?;
        results
            .pop()
            .ok_or_else(|| RowsyncError::Embedding("empty embedding response".to_string()))
    }
}
