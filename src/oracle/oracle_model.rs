use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::normalize::step_url;
use crate::model::test_case::TestCase;

/// What the oracle suggests doing with a pair of test cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleRecommendation {
    KeepBoth,
    Merge,
    RemoveOne,
}

impl OracleRecommendation {
    /// Keyword scan of free text. Defaults to `KeepBoth`.
    pub fn from_text(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("keep both") || lower.contains("keep_both") {
            OracleRecommendation::KeepBoth
        } else if lower.contains("merge") {
            OracleRecommendation::Merge
        } else if lower.contains("remove") {
            OracleRecommendation::RemoveOne
        } else {
            OracleRecommendation::KeepBoth
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleVerdict {
    /// 0..1
    pub semantic_similarity: f64,
    pub recommendation: OracleRecommendation,
    pub reasoning: String,

    #[serde(default)]
    pub different_websites: bool,
}

impl OracleVerdict {
    pub fn new(similarity: f64, recommendation: OracleRecommendation) -> Self {
        Self {
            semantic_similarity: similarity.clamp(0.0, 1.0),
            recommendation,
            reasoning: String::new(),
            different_websites: false,
        }
    }

    pub fn with_reasoning(mut self, reasoning: &str) -> Self {
        self.reasoning = reasoning.to_string();
        self
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Oracle call failures. Always recoverable: the gateway turns these into
/// "no opinion" for the pair.
#[derive(Debug)]
pub enum OracleError {
    /// Transport failure (connection refused, timeout)
    Http(String),

    /// Non-success HTTP status
    Status(u16),

    /// The service asked us to slow down
    RateLimited,

    /// The response body could not be interpreted
    Parse(String),
}

impl fmt::Display for OracleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OracleError::Http(msg) => write!(f, "oracle request failed: {}", msg),
            OracleError::Status(code) => write!(f, "oracle returned HTTP {}", code),
            OracleError::RateLimited => write!(f, "oracle rate limit exceeded"),
            OracleError::Parse(msg) => write!(f, "oracle response unreadable: {}", msg),
        }
    }
}

impl std::error::Error for OracleError {}

// ============================================================================
// Trait
// ============================================================================

/// External semantic similarity judge for a pair of test cases.
pub trait SemanticOracle {
    fn name(&self) -> &str;

    fn assess(&self, a: &TestCase, b: &TestCase) -> Result<OracleVerdict, OracleError>;
}

/// Compact step listing used in prompts and cache content hashes.
pub fn steps_summary(case: &TestCase) -> String {
    case.ordered_steps()
        .iter()
        .map(|step| {
            let mut line = format!("{}. {}", step.position, step.action_name);
            if let Some(element) = &step.element {
                line.push_str(&format!(" [{}]", element));
            }
            if step.is_navigation() {
                if let Some(url) = step_url(step) {
                    line.push_str(&format!(" -> {}", url));
                }
            } else if let Some(description) = &step.description {
                line.push_str(&format!(": {}", description));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Algorithmic similarity band worth asking about: [low, high)
    #[serde(default = "default_band_low")]
    pub band_low: f64,
    #[serde(default = "default_band_high")]
    pub band_high: f64,

    /// Oracle similarity needed to add a duplicate edge
    #[serde(default = "default_acceptance")]
    pub acceptance_threshold: f64,

    /// Base number of pairs sent per run, scaled by suite size
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,

    #[serde(default = "default_backoff_attempts")]
    pub backoff_max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_delay_ms: u64,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    #[serde(default = "default_cache_expiry_days")]
    pub cache_expiry_days: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            model: default_model(),
            band_low: default_band_low(),
            band_high: default_band_high(),
            acceptance_threshold: default_acceptance(),
            candidate_limit: default_candidate_limit(),
            rate_limit_ms: default_rate_limit_ms(),
            backoff_max_attempts: default_backoff_attempts(),
            backoff_base_delay_ms: default_backoff_base_ms(),
            cache_enabled: true,
            cache_dir: default_cache_dir(),
            cache_expiry_days: default_cache_expiry_days(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_model() -> String {
    "qwen2.5:1.5b".to_string()
}

fn default_band_low() -> f64 { 0.30 }
fn default_band_high() -> f64 { 0.75 }
fn default_acceptance() -> f64 { 0.85 }
fn default_candidate_limit() -> usize { 30 }
fn default_rate_limit_ms() -> u64 { 12_000 }
fn default_backoff_attempts() -> u32 { 3 }
fn default_backoff_base_ms() -> u64 { 2_000 }
fn default_true() -> bool { true }
fn default_cache_expiry_days() -> u64 { 30 }

fn default_cache_dir() -> String {
    ".cache/suite-optimizer".to_string()
}
