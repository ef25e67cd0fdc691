//! Text-to-speech client producing compressed (MP3) audio.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::debug;

use clarion_core::config::SynthesisConfig;
use clarion_core::error::{PipelineError, Result};
use clarion_core::types::{AudioClip, AudioContainer, AudioFormat, Reply, SynthesizedAudio};

use crate::SpeechSynthesis;

const DEFAULT_BASE_URL: &str = "https://texttospeech.googleapis.com";

// MP3 output from the synthesis API is 24kHz mono.
const OUTPUT_SAMPLE_RATE_HZ: u32 = 24_000;

pub struct GoogleTtsClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    language_code: String,
    voice: Option<String>,
    timeout: Duration,
}

impl GoogleTtsClient {
    pub fn new(config: &SynthesisConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            PipelineError::Config(
                "missing synthesis API key (synthesis.api_key or GOOGLE_API_KEY)".into(),
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
            api_key,
            language_code: config.language_code().to_string(),
            voice: config.voice.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }
}

// --- synthesis request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeRequest {
    input: SynthesisInput,
    voice: VoiceSelection,
    audio_config: AudioConfigParams,
}

#[derive(Debug, Serialize)]
struct SynthesisInput {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceSelection {
    language_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AudioConfigParams {
    audio_encoding: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

#[async_trait]
impl SpeechSynthesis for GoogleTtsClient {
    async fn synthesize(&self, reply: &Reply) -> Result<SynthesizedAudio> {
        // Unreachable when the generator upholds its non-empty contract.
        if reply.text.trim().is_empty() {
            return Err(PipelineError::EmptyReply);
        }

        let url = format!("{}/v1/text:synthesize?key={}", self.base_url, self.api_key);
        let body = SynthesizeRequest {
            input: SynthesisInput {
                text: reply.text.clone(),
            },
            voice: VoiceSelection {
                language_code: self.language_code.clone(),
                name: self.voice.clone(),
            },
            audio_config: AudioConfigParams {
                audio_encoding: "MP3",
            },
        };

        debug!(
            language = %self.language_code,
            text_len = reply.text.len(),
            "Synthesizing reply audio"
        );

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::SynthesisService(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::SynthesisService(format!(
                "TTS API error {status}: {body}"
            )));
        }

        let parsed: SynthesizeResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::SynthesisService(format!("malformed response: {e}")))?;

        let data = base64::engine::general_purpose::STANDARD
            .decode(parsed.audio_content)
            .map_err(|e| PipelineError::SynthesisService(format!("bad audio payload: {e}")))?;

        if data.is_empty() {
            return Err(PipelineError::SynthesisService(
                "provider returned empty audio".into(),
            ));
        }

        Ok(SynthesizedAudio {
            clip: AudioClip::new(
                data,
                AudioFormat {
                    container: AudioContainer::Mp3,
                    sample_rate_hz: Some(OUTPUT_SAMPLE_RATE_HZ),
                    channels: Some(1),
                    duration_ms: None,
                },
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleTtsClient {
        let config = SynthesisConfig {
            api_key: Some("test-key".into()),
            voice: Some("en-US-Neural2-C".into()),
            ..Default::default()
        };
        GoogleTtsClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_empty_reply_guard_fires_before_any_request() {
        let c = client();
        let err = c.synthesize(&Reply::new("   ")).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyReply));
    }

    #[test]
    fn test_request_serialization_shape() {
        let body = SynthesizeRequest {
            input: SynthesisInput {
                text: "hello".into(),
            },
            voice: VoiceSelection {
                language_code: "en-US".into(),
                name: Some("en-US-Neural2-C".into()),
            },
            audio_config: AudioConfigParams {
                audio_encoding: "MP3",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["input"]["text"], "hello");
        assert_eq!(json["voice"]["languageCode"], "en-US");
        assert_eq!(json["voice"]["name"], "en-US-Neural2-C");
        assert_eq!(json["audioConfig"]["audioEncoding"], "MP3");
    }

    #[test]
    fn test_voice_name_omitted_when_unset() {
        let body = SynthesizeRequest {
            input: SynthesisInput { text: "hi".into() },
            voice: VoiceSelection {
                language_code: "en-US".into(),
                name: None,
            },
            audio_config: AudioConfigParams {
                audio_encoding: "MP3",
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json["voice"].get("name").is_none());
    }

    #[test]
    fn test_response_deserialization() {
        let raw = r#"{"audioContent": "aGVsbG8="}"#;
        let parsed: SynthesizeResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.audio_content, "aGVsbG8=");
    }
}
