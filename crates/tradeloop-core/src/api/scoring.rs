//! Quality-scoring model client.
//!
//! Sends a candidate signal plus derived market context to a model gateway
//! and returns a structured bidirectional (long/short) evaluation, or a typed
//! failure. Decoding is two-stage: a strict schema first, then a separate
//! heuristic fallback (see [`decode`]).

pub mod decode;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration as StdDuration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ScoringConfig;
use crate::types::Side;

/// One side of a bidirectional evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEval {
    pub score: f64,
    pub grade: String,
    #[serde(default)]
    pub summary: String,
}

/// Structured model output: an evaluation of both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub long: SideEval,
    pub short: SideEval,
    /// Model's own qualification hint; policies may override it.
    #[serde(default)]
    pub qualified: Option<bool>,
}

impl Evaluation {
    pub fn side(&self, side: Side) -> &SideEval {
        match side {
            Side::Long => &self.long,
            Side::Short => &self.short,
        }
    }
}

/// Typed scoring failure. Retry policy branches on the variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreFailure {
    /// Model output could not be decoded by either stage.
    #[error("model output could not be parsed: {0}")]
    ParseFailed(String),
    /// Not enough market history to evaluate the candidate.
    #[error("insufficient bars for evaluation")]
    InsufficientBars,
    /// The call exceeded its deadline.
    #[error("scoring call timed out")]
    Timeout,
    /// Upstream rate limit.
    #[error("scoring rate limited")]
    RateLimited,
    #[error("scoring error: {0}")]
    Other(String),
}

impl ScoreFailure {
    /// Transient failures worth retrying; structural ones are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScoreFailure::Timeout | ScoreFailure::RateLimited | ScoreFailure::Other(_)
        )
    }

    /// Persistence error code for terminal failures.
    pub fn error_code(&self) -> &'static str {
        match self {
            ScoreFailure::ParseFailed(_) => "parse_failed",
            ScoreFailure::InsufficientBars => "insufficient_bars",
            ScoreFailure::Timeout => "timeout",
            ScoreFailure::RateLimited => "rate_limited",
            ScoreFailure::Other(_) => "scoring_error",
        }
    }
}

/// Candidate payload sent to the model.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreCandidate {
    pub ticker: String,
    pub side: Option<Side>,
    pub entry_price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub timeframe: Option<String>,
    /// Derived market context (recent-bar summary).
    pub context: String,
}

/// Scoring model surface used by the drain and the entry engine's rescoring.
#[cfg_attr(any(test, feature = "mocks"), mockall::automock)]
#[async_trait]
pub trait ScoringModel: Send + Sync {
    /// Score one candidate within `timeout`. The implementation must honor
    /// the caller-supplied timeout, not only its own configured one.
    async fn score(
        &self,
        candidate: &ScoreCandidate,
        timeout: StdDuration,
    ) -> std::result::Result<Evaluation, ScoreFailure>;
}

#[derive(Deserialize)]
struct GatewayEnvelope {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client against the model gateway.
pub struct HttpScoringClient {
    url: String,
    api_key: String,
    default_timeout: StdDuration,
    http_client: reqwest::Client,
}

impl HttpScoringClient {
    pub fn new(config: &ScoringConfig) -> Self {
        let default_timeout = StdDuration::from_millis(config.call_timeout_ms);
        let http_client = reqwest::Client::builder()
            .connect_timeout(StdDuration::from_secs(10))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            url: config.url.clone(),
            api_key: config.api_key.clone(),
            default_timeout,
            http_client,
        }
    }

    async fn call_gateway(
        &self,
        candidate: &ScoreCandidate,
        timeout: StdDuration,
    ) -> std::result::Result<String, ScoreFailure> {
        let request = self
            .http_client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(candidate);

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ScoreFailure::Timeout
            } else {
                ScoreFailure::Other(e.to_string())
            }
        })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ScoreFailure::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ScoreFailure::Other(format!("gateway error {}: {}", status, body)));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ScoreFailure::Other(e.to_string()))?;

        // The gateway may wrap model output in an envelope or return it raw.
        if let Ok(envelope) = serde_json::from_str::<GatewayEnvelope>(&text) {
            if let Some(error) = envelope.error {
                if error.contains("insufficient_bars") {
                    return Err(ScoreFailure::InsufficientBars);
                }
                return Err(ScoreFailure::Other(error));
            }
            if let Some(content) = envelope.content {
                return Ok(content);
            }
        }
        Ok(text)
    }
}

#[async_trait]
impl ScoringModel for HttpScoringClient {
    async fn score(
        &self,
        candidate: &ScoreCandidate,
        timeout: StdDuration,
    ) -> std::result::Result<Evaluation, ScoreFailure> {
        let effective = timeout.min(self.default_timeout);
        let content = self.call_gateway(candidate, effective).await?;

        match decode::decode_strict(&content) {
            Ok(evaluation) => {
                debug!(
                    ticker = %candidate.ticker,
                    long = evaluation.long.score,
                    short = evaluation.short.score,
                    "Decoded model evaluation"
                );
                Ok(evaluation)
            }
            Err(strict_err) => match decode::decode_lenient(&content) {
                Some(evaluation) => {
                    warn!(
                        ticker = %candidate.ticker,
                        error = %strict_err,
                        "Strict decode failed, heuristic fallback succeeded"
                    );
                    Ok(evaluation)
                }
                None => {
                    let preview: String = content.chars().take(200).collect();
                    Err(ScoreFailure::ParseFailed(preview))
                }
            },
        }
    }
}
