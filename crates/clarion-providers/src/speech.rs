//! Speech-to-Text v2 recognizer client.
//!
//! Uses the regional `recognize` endpoint with an ephemeral recognizer
//! resource: the resource path is built fresh for every call and never held
//! across turns, so no server-side handle can go stale between utterances.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use clarion_core::config::SpeechConfig;
use clarion_core::error::{PipelineError, Result};
use clarion_core::types::{AudioClip, Transcript};

use crate::SpeechToText;

pub struct GoogleSpeechClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    location: String,
    model: String,
    language_codes: Vec<String>,
    api_key: String,
    timeout: Duration,
}

impl GoogleSpeechClient {
    pub fn new(config: &SpeechConfig) -> Result<Self> {
        let project_id = config.resolve_project_id().ok_or_else(|| {
            PipelineError::Config(
                "missing cloud project for the recognizer (speech.project_id or \
                 GOOGLE_CLOUD_PROJECT)"
                    .into(),
            )
        })?;
        let api_key = config.resolve_api_key().ok_or_else(|| {
            PipelineError::Config("missing speech API key (speech.api_key or GOOGLE_API_KEY)".into())
        })?;
        let location = config.resolve_location();
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| format!("https://{location}-speech.googleapis.com"));

        Ok(Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project_id,
            location,
            model: config.model().to_string(),
            language_codes: config.language_codes(),
            api_key,
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    /// Ephemeral recognizer resource path, built per call and discarded
    /// after use.
    fn recognizer_path(&self) -> String {
        format!(
            "projects/{}/locations/{}/recognizers/_",
            self.project_id, self.location
        )
    }
}

// --- recognizer request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeRequest {
    config: RecognitionConfig,
    /// Base64-encoded audio payload.
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig {
    auto_decoding_config: AutoDetectDecodingConfig,
    model: String,
    language_codes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct AutoDetectDecodingConfig {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<SpeechAlternative>,
    #[serde(default)]
    language_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpeechAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: Option<f32>,
}

/// Map a recognizer response to a transcript. An empty result is
/// `NoSpeechDetected`, which the caller surfaces as "nothing heard" rather
/// than a system error.
fn transcript_from_response(response: RecognizeResponse) -> Result<Transcript> {
    let result = response
        .results
        .into_iter()
        .next()
        .ok_or(PipelineError::NoSpeechDetected)?;
    let language = result.language_code;
    let alternative = result
        .alternatives
        .into_iter()
        .next()
        .ok_or(PipelineError::NoSpeechDetected)?;

    let text = alternative.transcript.trim().to_string();
    if text.is_empty() {
        return Err(PipelineError::NoSpeechDetected);
    }

    Ok(Transcript {
        text,
        confidence: alternative.confidence,
        language,
    })
}

#[async_trait]
impl SpeechToText for GoogleSpeechClient {
    async fn transcribe(&self, audio: &AudioClip) -> Result<Transcript> {
        let recognizer = self.recognizer_path();
        let url = format!("{}/v2/{recognizer}:recognize", self.base_url);

        let body = RecognizeRequest {
            config: RecognitionConfig {
                auto_decoding_config: AutoDetectDecodingConfig {},
                model: self.model.clone(),
                language_codes: self.language_codes.clone(),
            },
            content: base64::engine::general_purpose::STANDARD.encode(&audio.data),
        };

        debug!(
            recognizer,
            model = %self.model,
            audio_bytes = audio.data.len(),
            "Sending audio for recognition"
        );

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::TranscriptionService {
                message: e.to_string(),
                transient: true,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            // 5xx is worth a bounded retry; quota (429) and auth (401/403)
            // failures are not.
            return Err(PipelineError::TranscriptionService {
                message: format!("recognizer error {status}: {body}"),
                transient: status.is_server_error(),
            });
        }

        let parsed: RecognizeResponse =
            response
                .json()
                .await
                .map_err(|e| PipelineError::TranscriptionService {
                    message: format!("malformed recognizer response: {e}"),
                    transient: true,
                })?;

        transcript_from_response(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleSpeechClient {
        let config = SpeechConfig {
            project_id: Some("demo-project".into()),
            location: Some("eu".into()),
            api_key: Some("test-key".into()),
            ..Default::default()
        };
        GoogleSpeechClient::new(&config).unwrap()
    }

    #[test]
    fn test_recognizer_path_is_ephemeral_wildcard() {
        let c = client();
        assert_eq!(
            c.recognizer_path(),
            "projects/demo-project/locations/eu/recognizers/_"
        );
    }

    #[test]
    fn test_regional_endpoint_from_location() {
        let c = client();
        assert_eq!(c.base_url, "https://eu-speech.googleapis.com");
    }

    #[test]
    fn test_new_requires_project() {
        // SAFETY: test-only, single-threaded test runner
        unsafe {
            std::env::remove_var("GOOGLE_CLOUD_PROJECT");
            std::env::remove_var("GCP_PROJECT");
            std::env::remove_var("PROJECT_ID");
        }
        let config = SpeechConfig {
            api_key: Some("k".into()),
            ..Default::default()
        };
        assert!(matches!(
            GoogleSpeechClient::new(&config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_request_serialization_shape() {
        let body = RecognizeRequest {
            config: RecognitionConfig {
                auto_decoding_config: AutoDetectDecodingConfig {},
                model: "chirp_3".into(),
                language_codes: vec!["en-US".into()],
            },
            content: "AAAA".into(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["config"]["autoDecodingConfig"], serde_json::json!({}));
        assert_eq!(json["config"]["model"], "chirp_3");
        assert_eq!(json["config"]["languageCodes"][0], "en-US");
        assert_eq!(json["content"], "AAAA");
    }

    #[test]
    fn test_transcript_from_full_response() {
        let raw = r#"{
            "results": [{
                "alternatives": [{"transcript": " hello there ", "confidence": 0.92}],
                "languageCode": "en-US"
            }]
        }"#;
        let parsed: RecognizeResponse = serde_json::from_str(raw).unwrap();
        let transcript = transcript_from_response(parsed).unwrap();
        assert_eq!(transcript.text, "hello there");
        assert_eq!(transcript.confidence, Some(0.92));
        assert_eq!(transcript.language.as_deref(), Some("en-US"));
    }

    #[test]
    fn test_empty_response_is_no_speech() {
        let parsed: RecognizeResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(
            transcript_from_response(parsed),
            Err(PipelineError::NoSpeechDetected)
        ));
    }

    #[test]
    fn test_blank_transcript_is_no_speech() {
        let raw = r#"{"results": [{"alternatives": [{"transcript": "   "}]}]}"#;
        let parsed: RecognizeResponse = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            transcript_from_response(parsed),
            Err(PipelineError::NoSpeechDetected)
        ));
    }
}
