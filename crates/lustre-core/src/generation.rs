//! Completion calls against the text-generation service.
//!
//! [`GenerationClient`] wraps a [`CompletionBackend`] with a hard timeout,
//! basic parameter sanity and throughput accounting. It makes exactly one
//! backend call per request and never retries; a failed or slow call comes
//! back as a [`GenerationFailure`] value.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use tracing::{info, warn};

/// Decoding parameters forwarded to the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    /// Context window (`num_ctx`) the model is asked to allocate.
    pub context_window: u32,
}

impl Default for DecodingParams {
    fn default() -> Self {
        Self {
            max_tokens: 800,
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
            context_window: 4096,
        }
    }
}

impl DecodingParams {
    /// Range sanity only; the service enforces its own limits.
    pub fn check(&self) -> Result<(), GenerationFailure> {
        let invalid = |detail: String| {
            Err(GenerationFailure::GenerationFailed(format!(
                "invalid decoding parameters: {detail}"
            )))
        };
        if !(0.0..=1.0).contains(&self.temperature) {
            return invalid(format!("temperature {} outside 0..=1", self.temperature));
        }
        if !(self.top_p > 0.0 && self.top_p <= 1.0) {
            return invalid(format!("top_p {} outside (0, 1]", self.top_p));
        }
        if self.max_tokens == 0 {
            return invalid("max_tokens must be greater than zero".to_string());
        }
        if self.context_window == 0 {
            return invalid("context_window must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Raw backend answer. Timing fields are whatever the service reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Tokens generated, as counted by the service.
    pub eval_count: Option<u64>,
    /// Time spent generating those tokens.
    pub eval_duration: Option<Duration>,
    /// Whole request time on the service side, including model load.
    pub total_duration: Option<Duration>,
}

/// One non-streaming completion request against a text-generation service.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Model identifier sent with each request.
    fn model(&self) -> &str;

    async fn complete(
        &self,
        prompt: &str,
        params: &DecodingParams,
    ) -> Result<Completion, BackendError>;
}

/// Transport or service-side failure reported by a backend.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct BackendError(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsSource {
    /// Counters taken from the service's own timing fields.
    Reported,
    /// Service gave no usable timing; derived from the wall clock around the call.
    WallClock,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationMetrics {
    pub tokens: u64,
    #[serde(rename = "generation_ms", serialize_with = "as_millis")]
    pub generation_time: Duration,
    #[serde(rename = "wall_ms", serialize_with = "as_millis")]
    pub wall_time: Duration,
    pub tokens_per_sec: f64,
    pub source: MetricsSource,
}

impl GenerationMetrics {
    fn measure(completion: &Completion, wall_time: Duration) -> Self {
        let reported = completion
            .eval_count
            .zip(completion.eval_duration)
            .filter(|(_, d)| !d.is_zero());
        let (tokens, generation_time, source) = match reported {
            Some((tokens, d)) => (tokens, d, MetricsSource::Reported),
            None => (
                completion
                    .eval_count
                    .unwrap_or_else(|| approx_tokens(&completion.text)),
                completion.total_duration.unwrap_or(wall_time),
                MetricsSource::WallClock,
            ),
        };
        let secs = generation_time.as_secs_f64();
        let tokens_per_sec = if secs > 0.0 { tokens as f64 / secs } else { 0.0 };
        Self {
            tokens,
            generation_time,
            wall_time,
            tokens_per_sec,
            source,
        }
    }
}

/// Rough token count when the service reports none: whitespace-separated words.
fn approx_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn as_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Generated text plus how long it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    pub text: String,
    pub metrics: GenerationMetrics,
}

/// Issues completion requests with a bounded wait.
#[derive(Debug)]
pub struct GenerationClient<B> {
    backend: B,
    timeout: Duration,
}

impl<B: CompletionBackend> GenerationClient<B> {
    pub fn new(backend: B, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Default bound applied by [`generate`](Self::generate).
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn generate(
        &self,
        prompt: &str,
        params: &DecodingParams,
    ) -> Result<Generation, GenerationFailure> {
        self.generate_within(prompt, params, self.timeout).await
    }

    /// Same as [`generate`](Self::generate) with a caller-chosen bound. The
    /// backend future is dropped when the bound elapses, which aborts the request.
    pub async fn generate_within(
        &self,
        prompt: &str,
        params: &DecodingParams,
        timeout: Duration,
    ) -> Result<Generation, GenerationFailure> {
        params.check()?;
        let model = self.backend.model();
        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.backend.complete(prompt, params)).await;
        let wall_time = started.elapsed();

        let completion = match outcome {
            Err(_) => {
                warn!(target: "lustre::generate", model, ?timeout, "generation timed out");
                return Err(GenerationFailure::Timeout(timeout));
            }
            Ok(Err(e)) => {
                warn!(target: "lustre::generate", model, error = %e, "generation failed");
                return Err(GenerationFailure::GenerationFailed(e.to_string()));
            }
            Ok(Ok(completion)) => completion,
        };
        if completion.text.trim().is_empty() {
            warn!(target: "lustre::generate", model, "generation returned no text");
            return Err(GenerationFailure::GenerationFailed(
                "service returned an empty response".to_string(),
            ));
        }

        let metrics = GenerationMetrics::measure(&completion, wall_time);
        info!(
            target: "lustre::generate",
            model,
            tokens = metrics.tokens,
            tokens_per_sec = format_args!("{:.1}", metrics.tokens_per_sec),
            wall_ms = wall_time.as_millis() as u64,
            source = ?metrics.source,
            "generation complete"
        );
        Ok(Generation {
            text: completion.text,
            metrics,
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GenerationFailure {
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
    #[error("generation failed: {0}")]
    GenerationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedBackend;

    fn client(backend: ScriptedBackend) -> GenerationClient<ScriptedBackend> {
        GenerationClient::new(backend, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn reported_timing_drives_metrics() {
        let c = client(ScriptedBackend::replying(Completion {
            text: "Try the Gold Ring.".into(),
            eval_count: Some(100),
            eval_duration: Some(Duration::from_secs(2)),
            total_duration: Some(Duration::from_secs(3)),
        }));
        let out = c.generate("prompt", &DecodingParams::default()).await.unwrap();
        assert_eq!(out.text, "Try the Gold Ring.");
        assert_eq!(out.metrics.tokens, 100);
        assert_eq!(out.metrics.source, MetricsSource::Reported);
        assert!((out.metrics.tokens_per_sec - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn missing_timing_falls_back_to_wall_clock() {
        let c = client(ScriptedBackend::text("one two three four"));
        let out = c.generate("prompt", &DecodingParams::default()).await.unwrap();
        assert_eq!(out.metrics.source, MetricsSource::WallClock);
        assert_eq!(out.metrics.tokens, 4);
        assert_eq!(out.metrics.generation_time, out.metrics.wall_time);
    }

    #[tokio::test]
    async fn slow_backend_times_out() {
        let c = GenerationClient::new(
            ScriptedBackend::text("late").delayed(Duration::from_secs(30)),
            Duration::from_millis(50),
        );
        let err = c.generate("prompt", &DecodingParams::default()).await.unwrap_err();
        assert_eq!(err, GenerationFailure::Timeout(Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn backend_error_is_reported_once_without_retry() {
        let c = client(ScriptedBackend::failing("connection refused"));
        let err = c.generate("prompt", &DecodingParams::default()).await.unwrap_err();
        assert!(matches!(err, GenerationFailure::GenerationFailed(ref d) if d.contains("connection refused")));
        assert_eq!(c.backend().calls(), 1);
    }

    #[tokio::test]
    async fn empty_text_is_a_failure() {
        let c = client(ScriptedBackend::text("   "));
        assert!(matches!(
            c.generate("prompt", &DecodingParams::default()).await,
            Err(GenerationFailure::GenerationFailed(_))
        ));
    }

    #[tokio::test]
    async fn out_of_range_temperature_never_reaches_backend() {
        let c = client(ScriptedBackend::text("unused"));
        let params = DecodingParams {
            temperature: 1.5,
            ..DecodingParams::default()
        };
        assert!(c.generate("prompt", &params).await.is_err());
        assert_eq!(c.backend().calls(), 0);
    }
}
