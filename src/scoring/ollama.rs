use serde::{Deserialize, Serialize};

use super::{clamp_unit, ScoringError, SentimentScorer, NEUTRAL_SCORE};

const SYSTEM_PROMPT: &str =
    "You are a sentiment analysis system that returns scores between 0 and 1.";

/// Minimal text-generation surface the model-backed scorer needs.
pub trait LlmClient: Send + Sync {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, ScoringError>;
}

/// Ollama HTTP client for local LLM inference.
pub struct OllamaClient {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ScoringError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ScoringError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }

    /// Default Ollama instance at localhost:11434 with a 30-second timeout.
    pub fn default_local() -> Result<Self, ScoringError> {
        Self::new("http://localhost:11434", 30)
    }
}

#[derive(Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaGenerateResponse {
    response: String,
}

impl LlmClient for OllamaClient {
    fn generate(&self, model: &str, prompt: &str, system: &str) -> Result<String, ScoringError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = OllamaGenerateRequest {
            model,
            prompt,
            system,
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_connect() {
                    ScoringError::OllamaConnection(self.base_url.clone())
                } else if e.is_timeout() {
                    ScoringError::HttpClient(format!(
                        "Request timed out after {}s",
                        self.timeout_secs
                    ))
                } else {
                    ScoringError::HttpClient(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ScoringError::OllamaError {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: OllamaGenerateResponse = response
            .json()
            .map_err(|e| ScoringError::ResponseParsing(e.to_string()))?;

        Ok(parsed.response)
    }
}

/// Mock LLM client for testing. Returns a fixed response or a fixed error.
pub struct MockLlmClient {
    response: Result<String, String>,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            response: Ok(response.to_string()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            response: Err(reason.to_string()),
        }
    }
}

impl LlmClient for MockLlmClient {
    fn generate(&self, _model: &str, _prompt: &str, _system: &str) -> Result<String, ScoringError> {
        self.response
            .clone()
            .map_err(ScoringError::HttpClient)
    }
}

/// Model-backed scorer. Asks the model for a bare number in [0,1].
pub struct OllamaScorer {
    client: Box<dyn LlmClient>,
    model: String,
}

impl OllamaScorer {
    pub fn new(client: Box<dyn LlmClient>, model: &str) -> Self {
        Self {
            client,
            model: model.to_string(),
        }
    }

    fn build_prompt(text: &str) -> String {
        format!(
            "Analyze the sentiment of the following text and return a score between 0 and 1, \
             where 0 is extremely negative and 1 is extremely positive: '{text}'. \
             Return only the numerical score without any explanation."
        )
    }
}

/// Pull the first decimal number out of a model reply ("0.7", "Score: 0.70.").
fn parse_score(raw: &str) -> Result<f64, ScoringError> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        return Ok(value);
    }
    trimmed
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .map(|piece| piece.trim_end_matches('.'))
        .find(|piece| !piece.is_empty())
        .and_then(|piece| piece.parse::<f64>().ok())
        .ok_or_else(|| ScoringError::ResponseParsing(trimmed.to_string()))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl SentimentScorer for OllamaScorer {
    fn score(&self, text: &str) -> f64 {
        if text.trim().is_empty() {
            return NEUTRAL_SCORE;
        }

        let result = self
            .client
            .generate(&self.model, &Self::build_prompt(text), SYSTEM_PROMPT)
            .and_then(|raw| parse_score(&raw));

        match result {
            Ok(value) => round2(clamp_unit(value)),
            Err(e) => {
                tracing::warn!(model = %self.model, error = %e, "Sentiment model failed, using neutral score");
                NEUTRAL_SCORE
            }
        }
    }

    fn name(&self) -> &'static str {
        "ollama"
    }
}
