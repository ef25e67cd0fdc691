//! Gemini reply-model client.
//!
//! Non-streaming `generateContent`: one bounded request per generation, with
//! prior-turn history in `contents` and the persona preset as the system
//! instruction. Auth is via API key in query parameter.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use clarion_core::config::GenerationConfig;
use clarion_core::error::{PipelineError, Result};
use clarion_core::types::{AssistantMode, ChatMessage, ChatRole, Reply};

use crate::ReplyModel;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 200;

// Conversation analysis runs cooler and longer than live replies.
const ANALYSIS_TEMPERATURE: f64 = 0.5;
const ANALYSIS_MAX_OUTPUT_TOKENS: u32 = 300;

pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    temperature: f64,
    max_output_tokens: u32,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(config: &GenerationConfig, model: impl Into<String>) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            PipelineError::Config(
                "missing language-model API key (generation.api_key or GOOGLE_API_KEY)".into(),
            )
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.into(),
            api_key,
            temperature: config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_output_tokens: config.max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    async fn invoke(&self, request: &GeminiRequest) -> Result<GenerateResponse> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        debug!(model = %self.model, contents = request.contents.len(), "Calling Gemini API");

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::GenerationTimeout
                } else {
                    PipelineError::GenerationService(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::GenerationService(format!(
                "Gemini API error {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::GenerationService(format!("malformed response: {e}")))
    }

    /// Summarize a session's history: main issues, emotional state, key
    /// points, suggested follow-ups.
    pub async fn analyze_conversation(&self, history: &[ChatMessage]) -> Result<String> {
        let request = GeminiRequest {
            contents: vec![Content::user(build_analysis_prompt(history))],
            system_instruction: None,
            generation_config: GenerationParams {
                temperature: ANALYSIS_TEMPERATURE,
                max_output_tokens: ANALYSIS_MAX_OUTPUT_TOKENS,
            },
        };
        let response = self.invoke(&request).await?;
        reply_from_response(response).map(|r| r.text)
    }
}

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationParams,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

impl Content {
    fn user(text: String) -> Self {
        Self {
            role: Some("user".into()),
            parts: vec![Part { text }],
        }
    }

    fn system(text: &str) -> Self {
        Self {
            role: None,
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f64,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Build the `contents` array: prior history in order, then the new prompt.
/// Gemini uses "model" for the assistant role.
fn build_contents(history: &[ChatMessage], prompt: &str) -> Vec<Content> {
    let mut contents: Vec<Content> = history
        .iter()
        .map(|m| Content {
            role: Some(
                match m.role {
                    ChatRole::User => "user",
                    ChatRole::Assistant => "model",
                }
                .into(),
            ),
            parts: vec![Part {
                text: m.content.clone(),
            }],
        })
        .collect();
    contents.push(Content::user(prompt.to_string()));
    contents
}

/// Finish reasons that mean the provider declined to answer.
fn is_refusal_reason(reason: &str) -> bool {
    matches!(reason, "SAFETY" | "RECITATION" | "PROHIBITED_CONTENT" | "BLOCKLIST")
}

/// Map a generation response to a Reply. A refusal and an empty reply are
/// different failures: refusals are never retried, an empty reply is a
/// service error.
fn reply_from_response(response: GenerateResponse) -> Result<Reply> {
    if let Some(feedback) = &response.prompt_feedback {
        if let Some(reason) = &feedback.block_reason {
            return Err(PipelineError::GenerationRefused(reason.clone()));
        }
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| PipelineError::GenerationService("no candidates in response".into()))?;

    if let Some(reason) = &candidate.finish_reason {
        if is_refusal_reason(reason) {
            return Err(PipelineError::GenerationRefused(reason.clone()));
        }
    }

    let text = candidate
        .content
        .map(|c| {
            c.parts
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
        .trim()
        .to_string();

    if text.is_empty() {
        return Err(PipelineError::GenerationService(
            "provider returned an empty reply".into(),
        ));
    }

    Ok(Reply::new(text))
}

fn build_analysis_prompt(history: &[ChatMessage]) -> String {
    let mut prompt = String::from(
        "Analyze the following conversation and extract:\n\
         1. Customer's main issues\n\
         2. Customer's emotional state\n\
         3. Key information points\n\
         4. Suggested follow-up actions\n\n",
    );
    for m in history {
        let who = match m.role {
            ChatRole::User => "Customer",
            ChatRole::Assistant => "Assistant",
        };
        prompt.push_str(&format!("{who}: {}\n", m.content));
    }
    prompt
}

#[async_trait]
impl ReplyModel for GeminiClient {
    async fn generate(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        mode: AssistantMode,
    ) -> Result<Reply> {
        let request = GeminiRequest {
            contents: build_contents(history, prompt),
            system_instruction: Some(Content::system(mode.system_prompt())),
            generation_config: GenerationParams {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        };

        let response = self.invoke(&request).await?;
        reply_from_response(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_contents_roles_and_order() {
        let history = vec![
            ChatMessage::user("my invoice doubled"),
            ChatMessage::assistant("let me look into that"),
        ];
        let contents = build_contents(&history, "any update?");
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0].role.as_deref(), Some("user"));
        assert_eq!(contents[1].role.as_deref(), Some("model"));
        assert_eq!(contents[2].role.as_deref(), Some("user"));
        assert_eq!(contents[2].parts[0].text, "any update?");
    }

    #[test]
    fn test_request_serialization_is_camel_case() {
        let request = GeminiRequest {
            contents: build_contents(&[], "hi"),
            system_instruction: Some(Content::system("be brief")),
            generation_config: GenerationParams {
                temperature: 0.7,
                max_output_tokens: 200,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json["systemInstruction"].is_object());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 200);
        assert_eq!(json["generationConfig"]["temperature"], 0.7);
        // System instruction carries no role.
        assert!(json["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_reply_from_text_response() {
        let raw = r#"{
            "candidates": [{
                "content": {"parts": [{"text": "Your balance is "}, {"text": "$42."}]},
                "finishReason": "STOP"
            }]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        let reply = reply_from_response(parsed).unwrap();
        assert_eq!(reply.text, "Your balance is $42.");
    }

    #[test]
    fn test_blocked_prompt_is_refused() {
        let raw = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            reply_from_response(parsed),
            Err(PipelineError::GenerationRefused(_))
        ));
    }

    #[test]
    fn test_safety_finish_reason_is_refused() {
        let raw = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            reply_from_response(parsed),
            Err(PipelineError::GenerationRefused(_))
        ));
    }

    #[test]
    fn test_empty_reply_is_service_error() {
        let raw = r#"{
            "candidates": [{"content": {"parts": [{"text": "   "}]}, "finishReason": "STOP"}]
        }"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            reply_from_response(parsed),
            Err(PipelineError::GenerationService(_))
        ));
    }

    #[test]
    fn test_no_candidates_is_service_error() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            reply_from_response(parsed),
            Err(PipelineError::GenerationService(_))
        ));
    }

    #[test]
    fn test_analysis_prompt_includes_history() {
        let history = vec![
            ChatMessage::user("I was double charged"),
            ChatMessage::assistant("I can refund that"),
        ];
        let prompt = build_analysis_prompt(&history);
        assert!(prompt.contains("Customer: I was double charged"));
        assert!(prompt.contains("Assistant: I can refund that"));
        assert!(prompt.contains("emotional state"));
    }
}
