//! Turn state machine and the per-turn aggregate.
//!
//! One [`ConversationTurn`] is created per input utterance and destroyed when
//! its output has been delivered or it has failed terminally. State is never
//! shared or reused across turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::types::{AudioClip, Reply, SynthesizedAudio, Transcript};

/// Pipeline states for a single turn.
///
/// `Complete`, `PartialComplete`, and `Failed` are terminal; nothing
/// transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    Normalizing,
    Transcribing,
    Generating,
    Synthesizing,
    Complete,
    /// Text available, audio unavailable (synthesis failed).
    PartialComplete,
    Failed,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::PartialComplete | Self::Failed)
    }

    /// Legal edges of the state machine. Text-only turns enter the pipeline
    /// at `Generating`.
    pub fn can_transition_to(&self, next: TurnState) -> bool {
        use TurnState::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed) => true,
            (Idle, Normalizing) => true,
            (Idle, Generating) => true,
            (Normalizing, Transcribing) => true,
            (Transcribing, Generating) => true,
            (Generating, Synthesizing) => true,
            (Synthesizing, Complete) => true,
            (Synthesizing, PartialComplete) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Normalizing => "normalizing",
            Self::Transcribing => "transcribing",
            Self::Generating => "generating",
            Self::Synthesizing => "synthesizing",
            Self::Complete => "complete",
            Self::PartialComplete => "partial_complete",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Aggregate for one conversation turn.
///
/// Artifacts populate strictly in pipeline order: normalized audio, then
/// transcript, then reply, then synthesized audio. The recording methods
/// assert that ordering.
#[derive(Debug)]
pub struct ConversationTurn {
    id: Uuid,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    state: TurnState,
    audio: Option<AudioClip>,
    transcript: Option<Transcript>,
    reply: Option<Reply>,
    synthesized: Option<SynthesizedAudio>,
    error: Option<PipelineError>,
}

impl ConversationTurn {
    /// Fresh turn for a voice utterance.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            state: TurnState::Idle,
            audio: None,
            transcript: None,
            reply: None,
            synthesized: None,
            error: None,
        }
    }

    /// Turn for typed input: the text stands in for the transcript and the
    /// pipeline is entered at `Generating`.
    pub fn new_text(text: &str) -> Self {
        let mut turn = Self::new();
        turn.transcript = Some(Transcript::from_text(text));
        turn
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn audio(&self) -> Option<&AudioClip> {
        self.audio.as_ref()
    }

    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_ref()
    }

    pub fn reply(&self) -> Option<&Reply> {
        self.reply.as_ref()
    }

    pub fn synthesized(&self) -> Option<&SynthesizedAudio> {
        self.synthesized.as_ref()
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.error.as_ref()
    }

    /// Non-technical outcome message for the calling surface, if the turn
    /// ended with an error.
    pub fn user_message(&self) -> Option<&'static str> {
        self.error.as_ref().map(|e| e.user_message())
    }

    /// Advance the state machine. Illegal edges are a programming error.
    pub fn enter(&mut self, next: TurnState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal turn transition {} -> {}",
            self.state,
            next
        );
        self.state = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
    }

    pub fn record_audio(&mut self, clip: AudioClip) {
        debug_assert_eq!(self.state, TurnState::Normalizing);
        debug_assert!(self.transcript.is_none(), "audio must precede transcript");
        self.audio = Some(clip);
    }

    pub fn record_transcript(&mut self, transcript: Transcript) {
        debug_assert!(self.audio.is_some(), "transcript requires normalized audio");
        debug_assert!(self.reply.is_none(), "transcript must precede reply");
        self.transcript = Some(transcript);
    }

    pub fn record_reply(&mut self, reply: Reply) {
        debug_assert!(self.transcript.is_some(), "reply requires a transcript");
        debug_assert!(
            self.synthesized.is_none(),
            "reply must precede synthesized audio"
        );
        self.reply = Some(reply);
    }

    pub fn record_synthesis(&mut self, audio: SynthesizedAudio) {
        debug_assert!(self.reply.is_some(), "synthesis requires a reply");
        self.synthesized = Some(audio);
    }

    /// Terminate in `Failed`, keeping the originating error for logging.
    pub fn fail(&mut self, error: PipelineError) {
        self.error = Some(error);
        self.enter(TurnState::Failed);
    }

    /// Degrade to `PartialComplete`: reply text stands, audio does not.
    pub fn degrade(&mut self, error: PipelineError) {
        debug_assert!(self.reply.is_some(), "degraded turn still carries a reply");
        self.error = Some(error);
        self.enter(TurnState::PartialComplete);
    }
}

impl Default for ConversationTurn {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AudioFormat;

    fn wav_clip() -> AudioClip {
        AudioClip::new(vec![0u8; 64], AudioFormat::canonical(16_000))
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut turn = ConversationTurn::new();
        assert_eq!(turn.state(), TurnState::Idle);

        turn.enter(TurnState::Normalizing);
        turn.record_audio(wav_clip());
        turn.enter(TurnState::Transcribing);
        turn.record_transcript(Transcript::from_text("hello"));
        turn.enter(TurnState::Generating);
        turn.record_reply(Reply::new("hi there"));
        turn.enter(TurnState::Synthesizing);
        turn.record_synthesis(SynthesizedAudio { clip: wav_clip() });
        turn.enter(TurnState::Complete);

        assert!(turn.state().is_terminal());
        assert!(turn.finished_at().is_some());
        assert!(turn.error().is_none());
    }

    #[test]
    fn test_terminal_states_admit_no_transitions() {
        for terminal in [
            TurnState::Complete,
            TurnState::PartialComplete,
            TurnState::Failed,
        ] {
            for next in [
                TurnState::Idle,
                TurnState::Normalizing,
                TurnState::Transcribing,
                TurnState::Generating,
                TurnState::Synthesizing,
                TurnState::Complete,
                TurnState::PartialComplete,
                TurnState::Failed,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} should be illegal"
                );
            }
        }
    }

    #[test]
    fn test_any_active_state_can_fail() {
        for state in [
            TurnState::Idle,
            TurnState::Normalizing,
            TurnState::Transcribing,
            TurnState::Generating,
            TurnState::Synthesizing,
        ] {
            assert!(state.can_transition_to(TurnState::Failed));
        }
    }

    #[test]
    fn test_stage_skipping_is_illegal() {
        assert!(!TurnState::Normalizing.can_transition_to(TurnState::Generating));
        assert!(!TurnState::Idle.can_transition_to(TurnState::Transcribing));
        assert!(!TurnState::Transcribing.can_transition_to(TurnState::Synthesizing));
        assert!(!TurnState::Generating.can_transition_to(TurnState::Complete));
        // PartialComplete is reachable only from Synthesizing.
        assert!(!TurnState::Generating.can_transition_to(TurnState::PartialComplete));
    }

    #[test]
    fn test_text_turn_enters_at_generating() {
        let mut turn = ConversationTurn::new_text("what is my bill?");
        assert!(turn.transcript().is_some());
        assert!(turn.audio().is_none());
        turn.enter(TurnState::Generating);
        turn.record_reply(Reply::new("let me check"));
        assert_eq!(turn.state(), TurnState::Generating);
    }

    #[test]
    #[should_panic(expected = "reply requires a transcript")]
    fn test_reply_before_transcript_panics() {
        let mut turn = ConversationTurn::new();
        turn.enter(TurnState::Normalizing);
        turn.record_reply(Reply::new("out of order"));
    }

    #[test]
    #[should_panic(expected = "transcript requires normalized audio")]
    fn test_transcript_before_audio_panics() {
        let mut turn = ConversationTurn::new();
        turn.enter(TurnState::Normalizing);
        turn.record_transcript(Transcript::from_text("out of order"));
    }

    #[test]
    fn test_fail_records_error() {
        let mut turn = ConversationTurn::new();
        turn.enter(TurnState::Normalizing);
        turn.fail(PipelineError::NoSpeechDetected);
        assert_eq!(turn.state(), TurnState::Failed);
        assert!(matches!(
            turn.error(),
            Some(PipelineError::NoSpeechDetected)
        ));
        assert_eq!(
            turn.user_message(),
            Some("We didn't hear anything. Please try speaking again.")
        );
    }

    #[test]
    fn test_degrade_keeps_reply() {
        let mut turn = ConversationTurn::new();
        turn.enter(TurnState::Normalizing);
        turn.record_audio(wav_clip());
        turn.enter(TurnState::Transcribing);
        turn.record_transcript(Transcript::from_text("hello"));
        turn.enter(TurnState::Generating);
        turn.record_reply(Reply::new("hi"));
        turn.enter(TurnState::Synthesizing);
        turn.degrade(PipelineError::SynthesisService("tts down".into()));

        assert_eq!(turn.state(), TurnState::PartialComplete);
        assert!(turn.reply().is_some());
        assert!(turn.synthesized().is_none());
    }
}
