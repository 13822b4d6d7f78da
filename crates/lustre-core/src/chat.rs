//! One chat request end to end: retrieve → filter → context → prompt → generate.
//!
//! Every stage before generation is local and bounded. Generation failures are
//! turned into a fixed fallback answer; only invalid input and retrieval faults
//! (dimension mismatch, embedding errors) come back as [`ChatError`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::ContextBuilder;
use crate::embed::Embedder;
use crate::filter::{filter, FilterConstraints};
use crate::generation::{
    CompletionBackend, DecodingParams, GenerationClient, GenerationFailure, GenerationMetrics,
};
use crate::prompt::{ConversationTurn, PromptComposer};
use crate::retriever::{RetrievalResult, RetrieveError, Retriever};
use crate::snapshot::SnapshotHandle;

/// Shown to the user whenever generation does not produce an answer.
pub const FALLBACK_MESSAGE: &str =
    "Sorry, our advisor is having trouble right now. Please try again later.";

pub const MAX_QUERY_CHARS: usize = 500;

/// Product summaries attached to an answer.
pub const MAX_SUMMARIES: usize = 3;

/// Pipeline position of a request. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChatStage {
    Idle,
    Retrieving,
    Filtering,
    BuildingContext,
    ComposingPrompt,
    Generating,
    Succeeded,
    Failed,
}

struct StageTracker {
    stage: ChatStage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: ChatStage::Idle,
        }
    }

    fn advance(&mut self, next: ChatStage) {
        debug_assert!(next > self.stage, "{:?} -> {:?}", self.stage, next);
        debug!(target: "lustre::chat", from = ?self.stage, to = ?next, "stage");
        self.stage = next;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatRequest {
    #[serde(alias = "message")]
    pub query: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub min_price: Option<f64>,
    #[serde(default)]
    pub max_price: Option<f64>,
    /// Prior turns, oldest first. Only the most recent few reach the prompt.
    #[serde(default, alias = "conversation_history")]
    pub history: Vec<ConversationTurn>,
    /// Products wanted; the configured default when absent.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Bound on the generation call; the client's default when absent.
    #[serde(skip)]
    pub timeout: Option<Duration>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ChatError> {
        validate_query(&self.query)?;
        for (name, price) in [("min_price", self.min_price), ("max_price", self.max_price)] {
            if let Some(p) = price {
                if !p.is_finite() || p < 0.0 {
                    return Err(ChatError::InvalidRequest(format!(
                        "{name} must be a non-negative number"
                    )));
                }
            }
        }
        Ok(())
    }

    fn constraints(&self, min_score: f32) -> FilterConstraints {
        FilterConstraints {
            min_score: Some(min_score),
            category: self.category.clone().filter(|c| !c.trim().is_empty()),
            min_price: self.min_price,
            max_price: self.max_price,
        }
    }
}

fn validate_query(query: &str) -> Result<(), ChatError> {
    if query.trim().is_empty() {
        return Err(ChatError::InvalidRequest("query must not be empty".to_string()));
    }
    let chars = query.chars().count();
    if chars > MAX_QUERY_CHARS {
        return Err(ChatError::InvalidRequest(format!(
            "query is {chars} characters, limit is {MAX_QUERY_CHARS}"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSummary {
    pub id: i64,
    pub name: String,
    pub price: f64,
    pub category: Option<String>,
    pub image: Option<String>,
    pub score: f32,
}

impl From<&RetrievalResult> for ProductSummary {
    fn from(r: &RetrievalResult) -> Self {
        Self {
            id: r.record.id,
            name: r.record.name.clone(),
            price: r.record.min_price,
            category: r.record.category.clone(),
            image: r.record.image_url.clone(),
            score: r.score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    GenerationFailed,
}

impl From<&GenerationFailure> for FailureReason {
    fn from(f: &GenerationFailure) -> Self {
        match f {
            GenerationFailure::Timeout(_) => Self::Timeout,
            GenerationFailure::GenerationFailed(_) => Self::GenerationFailed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub success: bool,
    /// Generated answer, or [`FALLBACK_MESSAGE`].
    pub message: String,
    pub products: Vec<ProductSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<GenerationMetrics>,
}

impl ChatResponse {
    fn fallback(reason: FailureReason) -> Self {
        Self {
            success: false,
            message: FALLBACK_MESSAGE.to_string(),
            products: Vec::new(),
            failure: Some(reason),
            metrics: None,
        }
    }
}

/// Health summary of the live snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status {
    pub index_loaded: bool,
    pub total_products: usize,
    pub build_id: u64,
    pub model: String,
}

pub struct ChatOrchestrator<E, B> {
    snapshots: Arc<SnapshotHandle>,
    retriever: Retriever<E>,
    context: ContextBuilder,
    prompt: PromptComposer,
    generation: GenerationClient<B>,
    decoding: DecodingParams,
    min_score: f32,
    default_limit: usize,
}

impl<E: Embedder, B: CompletionBackend> ChatOrchestrator<E, B> {
    pub fn new(snapshots: Arc<SnapshotHandle>, embedder: E, backend: B, cfg: &Config) -> Self {
        Self {
            snapshots,
            retriever: Retriever::new(embedder, &cfg.retrieval),
            context: ContextBuilder::new(&cfg.context),
            prompt: PromptComposer::new(&cfg.prompt),
            generation: GenerationClient::new(
                backend,
                Duration::from_secs(cfg.ollama.timeout_secs),
            ),
            decoding: cfg.generation,
            min_score: cfg.retrieval.min_score,
            default_limit: cfg.retrieval.default_limit,
        }
    }

    pub fn snapshots(&self) -> &Arc<SnapshotHandle> {
        &self.snapshots
    }

    pub fn retriever(&self) -> &Retriever<E> {
        &self.retriever
    }

    pub fn generation(&self) -> &GenerationClient<B> {
        &self.generation
    }

    pub fn status(&self) -> Status {
        let snapshot = self.snapshots.load();
        Status {
            index_loaded: !snapshot.is_empty(),
            total_products: snapshot.len(),
            build_id: snapshot.build_id(),
            model: self.generation.backend().model().to_string(),
        }
    }

    /// Retrieval and filtering only, no generation.
    pub async fn search(
        &self,
        query: &str,
        constraints: &FilterConstraints,
        limit: usize,
    ) -> Result<Vec<RetrievalResult>, ChatError> {
        validate_query(query)?;
        let snapshot = self.snapshots.load();
        let candidates = self.retriever.retrieve(&snapshot, query, limit).await?;
        Ok(filter(candidates, constraints, limit))
    }

    /// Runs the whole pipeline against the snapshot live at call time. A
    /// rebuild published mid-request does not affect this request.
    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, ChatError> {
        request.validate()?;
        let snapshot = self.snapshots.load();
        let limit = request.limit.unwrap_or(self.default_limit);
        let mut stage = StageTracker::new();

        stage.advance(ChatStage::Retrieving);
        let candidates = match self.retriever.retrieve(&snapshot, &request.query, limit).await {
            Ok(c) => c,
            Err(e) => {
                stage.advance(ChatStage::Failed);
                return Err(e.into());
            }
        };

        stage.advance(ChatStage::Filtering);
        let matches = filter(candidates, &request.constraints(self.min_score), limit);

        stage.advance(ChatStage::BuildingContext);
        let context = self.context.build(&matches);

        stage.advance(ChatStage::ComposingPrompt);
        let prompt = self.prompt.compose(&request.query, &context, &request.history);

        stage.advance(ChatStage::Generating);
        let timeout = request.timeout.unwrap_or(self.generation.timeout());
        match self
            .generation
            .generate_within(&prompt, &self.decoding, timeout)
            .await
        {
            Ok(generation) => {
                stage.advance(ChatStage::Succeeded);
                info!(
                    target: "lustre::chat",
                    build_id = snapshot.build_id(),
                    matches = matches.len(),
                    "chat answered"
                );
                Ok(ChatResponse {
                    success: true,
                    message: generation.text,
                    products: matches.iter().take(MAX_SUMMARIES).map(ProductSummary::from).collect(),
                    failure: None,
                    metrics: Some(generation.metrics),
                })
            }
            Err(failure) => {
                stage.advance(ChatStage::Failed);
                warn!(target: "lustre::chat", error = %failure, "answering with fallback");
                Ok(ChatResponse::fallback(FailureReason::from(&failure)))
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),
}
