//! Provider abstraction for the three external services the pipeline calls.
//!
//! Each client is an injected collaborator with explicit lifecycle:
//! constructed once from config, passed into the orchestrator, and replaced
//! by mocks in tests. Endpoints, model ids, and credentials are opaque
//! strings passed through to the provider.

use async_trait::async_trait;

use clarion_core::error::Result;
use clarion_core::types::{AssistantMode, AudioClip, ChatMessage, Reply, SynthesizedAudio, Transcript};

pub mod gemini;
pub mod speech;
pub mod tts;

pub use gemini::GeminiClient;
pub use speech::GoogleSpeechClient;
pub use tts::GoogleTtsClient;

/// Speech recognition seam.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a normalized clip. An empty provider result surfaces as
    /// [`clarion_core::error::PipelineError::NoSpeechDetected`].
    async fn transcribe(&self, audio: &AudioClip) -> Result<Transcript>;
}

/// Reply generation seam.
#[async_trait]
pub trait ReplyModel: Send + Sync {
    /// Generate a non-empty reply for the transcript text, given prior-turn
    /// history and the session's persona.
    async fn generate(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        mode: AssistantMode,
    ) -> Result<Reply>;
}

/// Speech synthesis seam.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    async fn synthesize(&self, reply: &Reply) -> Result<SynthesizedAudio>;
}
