//! Data model for one conversation turn: audio in, transcript, reply, audio out.

use serde::{Deserialize, Serialize};

/// Audio containers accepted at the input boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioContainer {
    Wav,
    Mp3,
    M4a,
    Webm,
    Ogg,
}

impl AudioContainer {
    /// Canonical file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Webm => "webm",
            Self::Ogg => "ogg",
        }
    }

    /// MIME type as reported by capture widgets and upload surfaces.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::M4a => "audio/mp4",
            Self::Webm => "audio/webm",
            Self::Ogg => "audio/ogg",
        }
    }

    /// Map a MIME essence string back to a container.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "audio/wav" | "audio/x-wav" | "audio/wave" => Some(Self::Wav),
            "audio/mpeg" | "audio/mp3" => Some(Self::Mp3),
            "audio/mp4" | "audio/m4a" | "audio/x-m4a" | "audio/aac" => Some(Self::M4a),
            "audio/webm" | "video/webm" => Some(Self::Webm),
            "audio/ogg" | "application/ogg" => Some(Self::Ogg),
            _ => None,
        }
    }
}

/// Format descriptor attached to every [`AudioClip`]. Rate and channel
/// count are `None` for uploads that haven't been probed yet; the normalizer
/// derives the real values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub container: AudioContainer,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate_hz: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl AudioFormat {
    /// The canonical format the recognizer expects: mono WAV at the
    /// configured rate.
    pub fn canonical(sample_rate_hz: u32) -> Self {
        Self {
            container: AudioContainer::Wav,
            sample_rate_hz: Some(sample_rate_hz),
            channels: Some(1),
            duration_ms: None,
        }
    }

    /// Descriptor for input whose container is known but whose audio
    /// parameters are not.
    pub fn declared(container: AudioContainer) -> Self {
        Self {
            container,
            sample_rate_hz: None,
            channels: None,
            duration_ms: None,
        }
    }

    pub fn is_canonical(&self, sample_rate_hz: u32) -> bool {
        self.container == AudioContainer::Wav
            && self.sample_rate_hz == Some(sample_rate_hz)
            && self.channels == Some(1)
    }
}

/// Raw audio payload plus its format descriptor. Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClip {
    pub data: Vec<u8>,
    pub format: AudioFormat,
}

impl AudioClip {
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Recognized text plus optional confidence/language from the recognizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Transcript {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
            language: None,
        }
    }
}

/// Model-generated reply text. Never empty once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub text: String,
}

impl Reply {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Playable audio produced from a [`Reply`]; the final artifact of a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizedAudio {
    pub clip: AudioClip,
}

/// Role of a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One prior exchange line fed back to the reply model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// System-instruction preset selecting the assistant's persona.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    #[default]
    CustomerService,
    CallCenter,
    LeadGeneration,
}

impl AssistantMode {
    /// Fixed system instruction sent with every generation request.
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Self::CustomerService => {
                "You are a professional customer service representative. Give \
                 concise, friendly, and accurate answers. If you are unsure, \
                 say you don't know."
            }
            Self::CallCenter => {
                "You are a professional call center agent. Guidelines:\n\
                 1. Be friendly, concise, and helpful.\n\
                 2. Ask for missing details politely.\n\
                 3. Provide clear answers without rambling.\n\
                 4. Offer escalation to a human agent when needed."
            }
            Self::LeadGeneration => {
                "You are a professional lead-generation assistant. Guidelines:\n\
                 1. Greet warmly.\n\
                 2. Ask about customer needs.\n\
                 3. Highlight value briefly.\n\
                 4. Collect key contact details.\n\
                 5. Suggest next steps."
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "customer_service" => Some(Self::CustomerService),
            "call_center" => Some(Self::CallCenter),
            "lead_generation" => Some(Self::LeadGeneration),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_mime_round_trip() {
        for c in [
            AudioContainer::Wav,
            AudioContainer::Mp3,
            AudioContainer::M4a,
            AudioContainer::Webm,
            AudioContainer::Ogg,
        ] {
            assert_eq!(AudioContainer::from_mime(c.mime_type()), Some(c));
        }
        assert_eq!(AudioContainer::from_mime("video/quicktime"), None);
    }

    #[test]
    fn test_canonical_format() {
        let f = AudioFormat::canonical(16_000);
        assert!(f.is_canonical(16_000));
        assert!(!f.is_canonical(44_100));

        let stereo = AudioFormat {
            container: AudioContainer::Wav,
            sample_rate_hz: Some(16_000),
            channels: Some(2),
            duration_ms: None,
        };
        assert!(!stereo.is_canonical(16_000));
        assert!(!AudioFormat::declared(AudioContainer::Webm).is_canonical(16_000));
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(
            AssistantMode::from_name("call_center"),
            Some(AssistantMode::CallCenter)
        );
        assert_eq!(AssistantMode::from_name("pirate"), None);
        assert_eq!(AssistantMode::default(), AssistantMode::CustomerService);
    }

    #[test]
    fn test_mode_prompts_differ() {
        let a = AssistantMode::CustomerService.system_prompt();
        let b = AssistantMode::CallCenter.system_prompt();
        let c = AssistantMode::LeadGeneration.system_prompt();
        assert_ne!(a, b);
        assert_ne!(b, c);
    }
}
