//! Ollama client for embeddings and completion. Wraps ollama-rs behind the
//! crate's [`Embedder`] and [`CompletionBackend`] seams.

use std::time::Duration;

use async_trait::async_trait;
use ollama_rs::generation::completion::request::GenerationRequest;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use ollama_rs::models::ModelOptions;
use ollama_rs::Ollama;
use thiserror::Error;

use crate::config::OllamaConfig;
use crate::embed::{EmbedError, Embedder};
use crate::generation::{BackendError, Completion, CompletionBackend, DecodingParams};

/// Thin wrapper around Ollama: one model for embeddings, one for completion.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    inner: Ollama,
    embed_model: String,
    chat_model: String,
}

impl OllamaClient {
    /// Create from URL string, e.g. `http://localhost:11434`.
    pub fn from_url(url: &str) -> Result<Self, OllamaError> {
        let defaults = OllamaConfig::default();
        let inner = Ollama::try_new(url).map_err(OllamaError::ParseUrl)?;
        Ok(Self {
            inner,
            embed_model: defaults.embed_model,
            chat_model: defaults.chat_model,
        })
    }

    pub fn from_config(cfg: &OllamaConfig) -> Result<Self, OllamaError> {
        Ok(Self::from_url(&cfg.url)?
            .with_embed_model(&cfg.embed_model)
            .with_chat_model(&cfg.chat_model))
    }

    /// Set the embedding model (e.g. `all-minilm`, `nomic-embed-text`).
    pub fn with_embed_model(mut self, model: impl Into<String>) -> Self {
        self.embed_model = model.into();
        self
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn embed_model(&self) -> &str {
        &self.embed_model
    }

    async fn embeddings(&self, input: EmbeddingsInput) -> Result<Vec<Vec<f32>>, OllamaError> {
        let req = GenerateEmbeddingsRequest::new(self.embed_model.clone(), input);
        let res = self
            .inner
            .generate_embeddings(req)
            .await
            .map_err(OllamaError::Request)?;
        Ok(res.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vectors = self
            .embeddings(EmbeddingsInput::Single(text.to_string()))
            .await
            .map_err(|e| EmbedError::Backend(e.to_string()))?;
        if vectors.is_empty() {
            return Err(EmbedError::Empty);
        }
        Ok(vectors.swap_remove(0))
    }

    /// One request for the whole slice.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self
            .embeddings(EmbeddingsInput::Multiple(texts.to_vec()))
            .await
            .map_err(|e| EmbedError::Backend(e.to_string()))?;
        if vectors.len() != texts.len() {
            return Err(EmbedError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }
}

#[async_trait]
impl CompletionBackend for OllamaClient {
    fn model(&self) -> &str {
        &self.chat_model
    }

    async fn complete(
        &self,
        prompt: &str,
        params: &DecodingParams,
    ) -> Result<Completion, BackendError> {
        let options = ModelOptions::default()
            .temperature(params.temperature)
            .top_p(params.top_p)
            .top_k(params.top_k)
            .num_predict(i32::try_from(params.max_tokens).unwrap_or(i32::MAX))
            .num_ctx(u64::from(params.context_window));
        let req = GenerationRequest::new(self.chat_model.clone(), prompt.to_string()).options(options);
        let res = self
            .inner
            .generate(req)
            .await
            .map_err(|e| BackendError(OllamaError::Request(e).to_string()))?;
        Ok(Completion {
            text: res.response,
            eval_count: res.eval_count.map(u64::from),
            eval_duration: res.eval_duration.map(Duration::from_nanos),
            total_duration: res.total_duration.map(Duration::from_nanos),
        })
    }
}

#[derive(Debug, Error)]
pub enum OllamaError {
    #[error("invalid Ollama URL: {0}")]
    ParseUrl(#[from] url::ParseError),
    #[error("Ollama request failed: {0}")]
    Request(#[from] ollama_rs::error::OllamaError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::{GenerationClient, GenerationFailure};

    #[test]
    fn config_models_are_applied() {
        let cfg = OllamaConfig {
            embed_model: "nomic-embed-text".into(),
            chat_model: "qwen2.5:3b".into(),
            ..OllamaConfig::default()
        };
        let client = OllamaClient::from_config(&cfg).unwrap();
        assert_eq!(client.embed_model(), "nomic-embed-text");
        assert_eq!(CompletionBackend::model(&client), "qwen2.5:3b");
    }

    #[test]
    fn bad_url_is_rejected() {
        assert!(matches!(
            OllamaClient::from_url("not a url"),
            Err(OllamaError::ParseUrl(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_service_is_a_generation_failure() {
        let client = OllamaClient::from_url("http://127.0.0.1:1").unwrap();
        let gen = GenerationClient::new(client, Duration::from_secs(10));
        let out = gen.generate("hello", &DecodingParams::default()).await;
        assert!(matches!(out, Err(GenerationFailure::GenerationFailed(_))), "{out:?}");
    }
}
