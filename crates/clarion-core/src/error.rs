//! Error taxonomy for the voice pipeline.
//!
//! Every failure carries its originating stage for logging, plus a
//! non-technical message suitable for the calling surface. No error here is
//! process-fatal; each is scoped to a single turn.

use thiserror::Error;

/// Pipeline stage an error originated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Normalizing,
    Transcribing,
    Generating,
    Synthesizing,
    Session,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input container/codec could not be identified or decoded.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The external transcode process exited non-zero or timed out.
    #[error("transcode failed: {0}")]
    Transcode(String),

    /// The recognizer returned an empty result. Distinct from a transport
    /// failure: the user gets "nothing heard", not a system error.
    #[error("no speech detected")]
    NoSpeechDetected,

    /// Recognition transport/quota/auth failure. Only transient network
    /// errors are eligible for retry; quota and auth errors are not.
    #[error("transcription service error: {message}")]
    TranscriptionService { message: String, transient: bool },

    #[error("reply generation timed out")]
    GenerationTimeout,

    /// The model declined to answer (safety or policy block).
    #[error("reply generation refused: {0}")]
    GenerationRefused(String),

    /// Other generation transport/auth failure, or an empty model response.
    #[error("reply generation failed: {0}")]
    GenerationService(String),

    #[error("speech synthesis failed: {0}")]
    SynthesisService(String),

    /// Synthesis invoked with empty text. Unreachable when the generator
    /// upholds its non-empty contract, but guarded regardless.
    #[error("cannot synthesize an empty reply")]
    EmptyReply,

    #[error("turn cancelled")]
    Cancelled,

    /// The session already has an unterminated turn.
    #[error("a turn is already in progress for this session")]
    TurnInProgress,

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stage this error originates in, where one applies.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::UnsupportedFormat(_) | Self::Transcode(_) => Some(Stage::Normalizing),
            Self::NoSpeechDetected | Self::TranscriptionService { .. } => {
                Some(Stage::Transcribing)
            }
            Self::GenerationTimeout | Self::GenerationRefused(_) | Self::GenerationService(_) => {
                Some(Stage::Generating)
            }
            Self::SynthesisService(_) | Self::EmptyReply => Some(Stage::Synthesizing),
            Self::Cancelled | Self::TurnInProgress => Some(Stage::Session),
            Self::Config(_) | Self::Io(_) => None,
        }
    }

    /// Whether a bounded retry is worth attempting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TranscriptionService { transient: true, .. } | Self::GenerationTimeout
        )
    }

    /// Non-technical summary shown to the caller. The technical detail stays
    /// in logs.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::UnsupportedFormat(_) | Self::Transcode(_) => {
                "We couldn't process that recording. Please try recording again."
            }
            Self::NoSpeechDetected => "We didn't hear anything. Please try speaking again.",
            Self::TranscriptionService { .. } => {
                "We couldn't understand the audio right now. Please try again in a moment."
            }
            Self::GenerationTimeout
            | Self::GenerationRefused(_)
            | Self::GenerationService(_)
            | Self::EmptyReply => "Sorry, I'm unable to answer that right now.",
            Self::SynthesisService(_) => {
                "Audio playback isn't available right now; here's the reply as text."
            }
            Self::Cancelled => "The request was cancelled.",
            Self::TurnInProgress => "Please wait for the current reply to finish.",
            Self::Config(_) | Self::Io(_) => "Something went wrong. Please try again.",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
