//! Deterministic fakes shared by unit tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::catalog::ProductRecord;
use crate::embed::{EmbedError, Embedder};
use crate::generation::{BackendError, Completion, CompletionBackend, DecodingParams};
use crate::store::DEFAULT_DIMENSION;

/// In-stock product with a single price and nothing else filled in.
pub(crate) fn record(id: i64, name: &str, category: &str, price: f64) -> ProductRecord {
    ProductRecord {
        id,
        name: name.to_string(),
        category: Some(category.to_string()),
        description: None,
        min_price: price,
        max_price: None,
        total_stock: 5,
        materials: Vec::new(),
        review_count: 0,
        avg_rating: None,
        image_url: None,
    }
}

/// Bag-of-words embedder: each lowercase word bumps one hashed bucket. Texts
/// sharing words score high against each other; numbers are ignored.
#[derive(Debug)]
pub(crate) struct HashingEmbedder {
    dimension: usize,
    batches: AtomicUsize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

impl HashingEmbedder {
    pub(crate) fn new(dimension: usize) -> Self {
        Self {
            dimension,
            batches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn dimension(&self) -> usize {
        self.dimension
    }

    pub(crate) fn batch_calls(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0; self.dimension];
        let lower = text.to_lowercase();
        let words = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty() && !w.chars().all(|c| c.is_ascii_digit()));
        for word in words {
            let mut h = DefaultHasher::new();
            word.hash(&mut h);
            v[(h.finish() % self.dimension as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }
}

/// Completion backend with a canned reply, an optional delay, and a record of
/// every prompt it was sent.
#[derive(Debug)]
pub(crate) struct ScriptedBackend {
    reply: Result<Completion, String>,
    delay: Duration,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub(crate) fn replying(completion: Completion) -> Self {
        Self {
            reply: Ok(completion),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn text(text: &str) -> Self {
        Self::replying(Completion {
            text: text.to_string(),
            ..Completion::default()
        })
    }

    pub(crate) fn failing(detail: &str) -> Self {
        Self {
            reply: Err(detail.to_string()),
            ..Self::text("")
        }
    }

    pub(crate) fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        prompt: &str,
        _params: &DecodingParams,
    ) -> Result<Completion, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().map_err(BackendError)
    }
}
