//! Grounded answer generation.
//!
//! Builds a prompt from the retrieved chunks and the user's question, and
//! invokes the remote generative model once per query. There is no
//! streaming and no server-side conversation state; callers that want
//! multi-turn behavior fold history into the question themselves.
//!
//! A transient remote failure is retried exactly once; everything else
//! surfaces as [`WikiqaError::GenerationService`].

use async_trait::async_trait;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::embedding::{backoff_delay, is_retryable_status};
use crate::error::{Result, WikiqaError};
use crate::models::RetrievedChunk;

/// Instruction preamble placed in front of every prompt.
const PREAMBLE: &str = "You are a knowledge-base assistant. Answer the question using only \
the context passages below. If the context does not contain the answer, say so plainly \
instead of guessing.";

/// Separator placed between context passages.
const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Generation calls get exactly one retry on a transient failure.
const MAX_GENERATION_RETRIES: u32 = 1;

/// Assemble the grounded prompt: preamble, ranked passages, question.
pub fn build_prompt(question: &str, hits: &[RetrievedChunk]) -> String {
    let context: Vec<&str> = hits.iter().map(|hit| hit.text.as_str()).collect();
    format!(
        "{}\n\nContext:\n{}\n\nQuestion: {}",
        PREAMBLE,
        context.join(PASSAGE_SEPARATOR),
        question.trim()
    )
}

/// A remote generative model consumed as an opaque prompt → text service.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    fn model_name(&self) -> &str;

    /// Produce an answer for the prompt. The text is returned unmodified.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Build the configured generation client.
pub fn create_generation_client(config: &GenerationConfig) -> Result<Box<dyn GenerationClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => Err(WikiqaError::Config(format!(
            "unknown generation provider: '{}'",
            other
        ))),
    }
}

// ============ OpenAI ============

/// Generation via the OpenAI chat completions API.
///
/// Requires the `OPENAI_API_KEY` environment variable.
pub struct OpenAiGenerator {
    model: String,
    http: reqwest::Client,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        if std::env::var("OPENAI_API_KEY").is_err() {
            return Err(WikiqaError::Config(
                "OPENAI_API_KEY environment variable not set".into(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WikiqaError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            http,
        })
    }
}

#[async_trait]
impl GenerationClient for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            WikiqaError::Config("OPENAI_API_KEY environment variable not set".into())
        })?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=MAX_GENERATION_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .http
                .post("https://api.openai.com/v1/chat/completions")
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| WikiqaError::GenerationService(e.to_string()))?;
                        return parse_openai_answer(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if is_retryable_status(status.as_u16()) {
                        last_err = Some(format!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    return Err(WikiqaError::GenerationService(format!(
                        "OpenAI API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(e.to_string());
                    continue;
                }
            }
        }

        Err(WikiqaError::GenerationService(
            last_err.unwrap_or_else(|| "generation failed after retry".into()),
        ))
    }
}

fn parse_openai_answer(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| {
            WikiqaError::GenerationService("invalid response: missing message content".into())
        })
}

// ============ Ollama ============

/// Generation via a local Ollama instance (`POST /api/generate`).
pub struct OllamaGenerator {
    model: String,
    url: String,
    http: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WikiqaError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            http,
        })
    }
}

#[async_trait]
impl GenerationClient for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });

        let mut last_err: Option<String> = None;

        for attempt in 0..=MAX_GENERATION_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            let resp = self
                .http
                .post(format!("{}/api/generate", self.url))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| WikiqaError::GenerationService(e.to_string()))?;
                        return json
                            .get("response")
                            .and_then(|r| r.as_str())
                            .map(str::to_string)
                            .ok_or_else(|| {
                                WikiqaError::GenerationService(
                                    "invalid response: missing response field".into(),
                                )
                            });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if is_retryable_status(status.as_u16()) {
                        last_err = Some(format!("Ollama API error {}: {}", status, body_text));
                        continue;
                    }

                    return Err(WikiqaError::GenerationService(format!(
                        "Ollama API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    ));
                    continue;
                }
            }
        }

        Err(WikiqaError::GenerationService(
            last_err.unwrap_or_else(|| "generation failed after retry".into()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: "c".into(),
            document_id: "d".into(),
            chunk_index: 0,
            score: 1.0,
            text: text.to_string(),
            title: "t".into(),
            origin_url: None,
        }
    }

    #[test]
    fn prompt_contains_passages_in_rank_order() {
        let hits = vec![hit("first passage"), hit("second passage")];
        let prompt = build_prompt("What is X?", &hits);

        let first = prompt.find("first passage").unwrap();
        let second = prompt.find("second passage").unwrap();
        assert!(first < second);
        assert!(prompt.contains("---"));
        assert!(prompt.ends_with("Question: What is X?"));
    }

    #[test]
    fn prompt_starts_with_preamble() {
        let prompt = build_prompt("q", &[hit("some passage")]);
        assert!(prompt.starts_with(PREAMBLE));
    }

    #[test]
    fn openai_answer_parsed_from_first_choice() {
        let json = serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "The answer." } }
            ]
        });
        assert_eq!(parse_openai_answer(&json).unwrap(), "The answer.");
    }

    #[test]
    fn missing_content_is_a_generation_error() {
        let json = serde_json::json!({ "choices": [] });
        assert!(matches!(
            parse_openai_answer(&json).unwrap_err(),
            WikiqaError::GenerationService(_)
        ));
    }
}
