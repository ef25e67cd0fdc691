//! Pipeline orchestrator — one turn through normalize → transcribe →
//! generate → synthesize, with per-stage error policy.
//!
//! Stages run strictly sequentially; every external call is bounded by the
//! provider's own timeout and raced against the turn's cancellation token.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use clarion_core::config::{Config, RetryConfig};
use clarion_core::error::{PipelineError, Result};
use clarion_core::turn::{ConversationTurn, TurnState};
use clarion_core::types::{AudioClip, Reply, Transcript};
use clarion_media::Normalize;
use clarion_providers::{ReplyModel, SpeechSynthesis, SpeechToText};

use crate::session::Session;

pub struct PipelineOrchestrator {
    normalizer: Arc<dyn Normalize>,
    stt: Arc<dyn SpeechToText>,
    model: Arc<dyn ReplyModel>,
    tts: Arc<dyn SpeechSynthesis>,
    retry: RetryConfig,
    min_speech_bytes: usize,
}

/// Race a stage against cancellation. On cancel the in-flight stage future
/// is dropped; a late provider result never reaches the turn.
async fn guard<T, F>(cancel: &CancellationToken, stage: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(PipelineError::Cancelled),
        result = stage => result,
    }
}

impl PipelineOrchestrator {
    pub fn new(
        normalizer: Arc<dyn Normalize>,
        stt: Arc<dyn SpeechToText>,
        model: Arc<dyn ReplyModel>,
        tts: Arc<dyn SpeechSynthesis>,
        config: &Config,
    ) -> Self {
        Self {
            normalizer,
            stt,
            model,
            tts,
            retry: config.retry(),
            min_speech_bytes: config.audio().min_speech_bytes,
        }
    }

    /// Run one voice turn. Always returns a terminal turn and always leaves
    /// the session `Idle` for a fresh turn.
    pub async fn run_turn(
        &self,
        session: &mut Session,
        input: AudioClip,
        cancel: &CancellationToken,
    ) -> ConversationTurn {
        let mut turn = ConversationTurn::new();
        if let Err(e) = session.begin_turn() {
            warn!(session = %session.id(), "Rejected turn: one already in progress");
            turn.fail(e);
            return turn;
        }

        info!(
            turn = %turn.id(),
            session = %session.id(),
            input_bytes = input.len(),
            container = input.format.container.extension(),
            "Voice turn started"
        );

        if let Err(e) = self.drive_voice(&mut turn, session, input, cancel).await {
            error!(turn = %turn.id(), stage = ?e.stage(), %e, "Turn failed");
            turn.fail(e);
        }

        self.finish(&turn, session);
        turn
    }

    /// Run a typed-input turn: enters the pipeline at `Generating`, with the
    /// text standing in for the transcript. Downstream semantics are
    /// identical, including degradation to `PartialComplete`.
    pub async fn run_text_turn(
        &self,
        session: &mut Session,
        text: &str,
        cancel: &CancellationToken,
    ) -> ConversationTurn {
        let mut turn = ConversationTurn::new_text(text);
        if let Err(e) = session.begin_turn() {
            warn!(session = %session.id(), "Rejected turn: one already in progress");
            turn.fail(e);
            return turn;
        }

        info!(turn = %turn.id(), session = %session.id(), "Text turn started");

        if let Err(e) = self.drive_generation(&mut turn, session, text, cancel).await {
            error!(turn = %turn.id(), stage = ?e.stage(), %e, "Turn failed");
            turn.fail(e);
        }

        self.finish(&turn, session);
        turn
    }

    async fn drive_voice(
        &self,
        turn: &mut ConversationTurn,
        session: &Session,
        input: AudioClip,
        cancel: &CancellationToken,
    ) -> Result<()> {
        turn.enter(TurnState::Normalizing);
        // The normalized guard lives to the end of this function: its scoped
        // temp files are deleted when the turn ends, however it ends.
        let normalized = guard(cancel, self.normalizer.normalize(&input)).await?;

        if normalized.clip().len() < self.min_speech_bytes {
            warn!(
                bytes = normalized.clip().len(),
                min = self.min_speech_bytes,
                "Normalized audio too small; treating as silence"
            );
            return Err(PipelineError::NoSpeechDetected);
        }
        turn.record_audio(normalized.clip().clone());

        turn.enter(TurnState::Transcribing);
        let transcript = guard(cancel, self.transcribe_with_retry(normalized.clip())).await?;
        info!(turn = %turn.id(), chars = transcript.text.len(), "Transcription complete");
        let prompt = transcript.text.clone();
        turn.record_transcript(transcript);

        self.drive_generation(turn, session, &prompt, cancel).await
    }

    async fn drive_generation(
        &self,
        turn: &mut ConversationTurn,
        session: &Session,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        turn.enter(TurnState::Generating);
        let reply = guard(cancel, self.generate_with_retry(prompt, session)).await?;
        turn.record_reply(reply.clone());

        turn.enter(TurnState::Synthesizing);
        match guard(cancel, self.tts.synthesize(&reply)).await {
            Ok(audio) => {
                turn.record_synthesis(audio);
                turn.enter(TurnState::Complete);
            }
            // Synthesis failure degrades rather than aborts: the reply text
            // is still deliverable.
            Err(e @ PipelineError::SynthesisService(_)) => {
                warn!(turn = %turn.id(), %e, "Synthesis failed; delivering text only");
                turn.degrade(e);
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Bounded retry for transient recognizer failures only. Quota/auth
    /// errors and `NoSpeechDetected` pass straight through.
    async fn transcribe_with_retry(&self, clip: &AudioClip) -> Result<Transcript> {
        let mut attempt: u32 = 0;
        loop {
            match self.stt.transcribe(clip).await {
                Ok(transcript) => return Ok(transcript),
                Err(e @ PipelineError::TranscriptionService { transient: true, .. })
                    if attempt < self.retry.transcription_max_retries =>
                {
                    attempt += 1;
                    warn!(attempt, %e, "Transient transcription failure; retrying");
                    tokio::time::sleep(Duration::from_millis(
                        self.retry.transcription_backoff_ms * attempt as u64,
                    ))
                    .await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// At most one extra generation call, and only after a timeout.
    async fn generate_with_retry(&self, prompt: &str, session: &Session) -> Result<Reply> {
        match self
            .model
            .generate(prompt, session.history(), session.mode())
            .await
        {
            Err(PipelineError::GenerationTimeout) if self.retry.generation_retry_on_timeout => {
                warn!("Generation timed out; retrying once");
                self.model
                    .generate(prompt, session.history(), session.mode())
                    .await
            }
            result => result,
        }
    }

    fn finish(&self, turn: &ConversationTurn, session: &mut Session) {
        if matches!(
            turn.state(),
            TurnState::Complete | TurnState::PartialComplete
        ) {
            if let (Some(transcript), Some(reply)) = (turn.transcript(), turn.reply()) {
                session.push_exchange(&transcript.text, &reply.text);
            }
        }
        session.end_turn();
        info!(turn = %turn.id(), state = %turn.state(), "Turn finished");
    }
}
