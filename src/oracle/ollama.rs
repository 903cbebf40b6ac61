use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::test_case::TestCase;
use crate::oracle::oracle_model::{
    OracleError, OracleRecommendation, OracleVerdict, SemanticOracle, steps_summary,
};

// ============================================================================
// Ollama Backend
// ============================================================================

pub struct OllamaOracle {
    pub endpoint: String,
    pub model: String,
    client: reqwest::blocking::Client,
}

impl Default for OllamaOracle {
    fn default() -> Self {
        Self::new("http://localhost:11434/api/generate", "qwen2.5:1.5b")
    }
}

#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct DuplicateResponse {
    similarity: f64,
    #[serde(default)]
    recommendation: Option<String>,
    #[serde(default)]
    reasoning: Option<String>,
}

static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)similarity[:\s]+(\d+(?:\.\d+)?)\s*%",
        r"(?i)(\d+(?:\.\d+)?)\s*%\s+similar",
        r"(?i)(\d+(?:\.\d+)?)\s*%",
        r"(?i)similarity[:\s]+(\d+\.\d+)",
        r"(?i)(\d+\.\d+)\s+similarity",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("score regex"))
    .collect()
});

static BARE_DECIMAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(0?\.\d+)\b").expect("decimal regex"));

const DEFAULT_SCORE: f64 = 0.5;

impl OllamaOracle {
    pub fn new(endpoint: &str, model: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            model: model.to_string(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn build_prompt(&self, a: &TestCase, b: &TestCase) -> String {
        format!(
r#"You compare UI test cases and decide whether they are semantic duplicates.

TEST CASE {}: {}
Description: {}
Steps:
{}

TEST CASE {}: {}
Description: {}
Steps:
{}

Test cases that exercise different websites are never duplicates.

Respond with ONLY valid JSON:
{{"similarity": 0.0-1.0, "recommendation": "keep_both" | "merge" | "remove_one", "reasoning": "..."}}"#,
            a.id,
            a.name,
            a.description.as_deref().unwrap_or("No description"),
            steps_summary(a),
            b.id,
            b.name,
            b.description.as_deref().unwrap_or("No description"),
            steps_summary(b),
        )
    }

    pub fn parse_response(&self, response: &str) -> OracleVerdict {
        parse_verdict(response)
    }
}

/// Structured JSON first, then free-text score and keyword extraction.
pub fn parse_verdict(response: &str) -> OracleVerdict {
    if let Ok(parsed) = serde_json::from_str::<DuplicateResponse>(response) {
        let similarity = if parsed.similarity > 1.0 {
            parsed.similarity / 100.0
        } else {
            parsed.similarity
        };
        let recommendation = parsed
            .recommendation
            .as_deref()
            .map(OracleRecommendation::from_text)
            .unwrap_or(OracleRecommendation::KeepBoth);
        return OracleVerdict::new(similarity, recommendation)
            .with_reasoning(parsed.reasoning.as_deref().unwrap_or(response));
    }

    OracleVerdict::new(extract_score(response), OracleRecommendation::from_text(response))
        .with_reasoning(response)
}

pub fn extract_score(text: &str) -> f64 {
    for pattern in SCORE_PATTERNS.iter() {
        if let Some(cap) = pattern.captures(text) {
            if let Ok(score) = cap[1].parse::<f64>() {
                if score > 1.0 {
                    return (score / 100.0).min(1.0);
                }
                return score.clamp(0.0, 1.0);
            }
        }
    }

    if let Some(cap) = BARE_DECIMAL.captures(text) {
        if let Ok(score) = cap[1].parse::<f64>() {
            return score.clamp(0.0, 1.0);
        }
    }

    tracing::warn!("could not extract similarity score from oracle response, using {}", DEFAULT_SCORE);
    DEFAULT_SCORE
}

impl SemanticOracle for OllamaOracle {
    fn name(&self) -> &str {
        "ollama"
    }

    fn assess(&self, a: &TestCase, b: &TestCase) -> Result<OracleVerdict, OracleError> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: self.build_prompt(a, b),
            stream: false,
            format: "json",
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| OracleError::Http(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(OracleError::RateLimited);
        }
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        let body: OllamaResponse = response
            .json()
            .map_err(|e| OracleError::Parse(e.to_string()))?;

        Ok(parse_verdict(&body.response))
    }
}
