//! Session model — one caller's conversation across turns.
//!
//! A session holds the cross-turn state the pipeline needs: persona mode,
//! prior exchanges for generation context, and a guard ensuring exactly one
//! active turn at a time. Turn artifacts themselves are transient and live on
//! the [`clarion_core::turn::ConversationTurn`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use clarion_core::error::{PipelineError, Result};
use clarion_core::types::{AssistantMode, ChatMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    InTurn,
}

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    mode: AssistantMode,
    history: Vec<ChatMessage>,
    created_at: DateTime<Utc>,
    last_active_at: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Idle,
            mode: AssistantMode::default(),
            history: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    pub fn with_mode(mode: AssistantMode) -> Self {
        Self {
            mode,
            ..Self::new()
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> AssistantMode {
        self.mode
    }

    /// Switch persona. History is kept; the new mode only affects future
    /// generations.
    pub fn set_mode(&mut self, mode: AssistantMode) {
        self.mode = mode;
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_active_at(&self) -> DateTime<Utc> {
        self.last_active_at
    }

    /// Claim the session for a new turn. Rejected while a prior turn is
    /// unterminated.
    pub(crate) fn begin_turn(&mut self) -> Result<()> {
        if self.state == SessionState::InTurn {
            return Err(PipelineError::TurnInProgress);
        }
        self.state = SessionState::InTurn;
        self.last_active_at = Utc::now();
        Ok(())
    }

    /// Release the session. Always called, whatever the turn's outcome, so
    /// the session is ready for a fresh turn.
    pub(crate) fn end_turn(&mut self) {
        self.state = SessionState::Idle;
        self.last_active_at = Utc::now();
    }

    /// Append a completed exchange to the generation context.
    pub(crate) fn push_exchange(&mut self, user: &str, assistant: &str) {
        self.history.push(ChatMessage::user(user));
        self.history.push(ChatMessage::assistant(assistant));
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_active_turn() {
        let mut session = Session::new();
        assert_eq!(session.state(), SessionState::Idle);

        session.begin_turn().unwrap();
        assert_eq!(session.state(), SessionState::InTurn);
        assert!(matches!(
            session.begin_turn(),
            Err(PipelineError::TurnInProgress)
        ));

        session.end_turn();
        assert_eq!(session.state(), SessionState::Idle);
        session.begin_turn().unwrap();
    }

    #[test]
    fn test_history_accumulates_in_order() {
        let mut session = Session::new();
        session.push_exchange("hello", "hi, how can I help?");
        session.push_exchange("my bill", "let me check");

        let history = session.history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "hello");
        assert_eq!(history[3].content, "let me check");

        session.clear_history();
        assert!(session.history().is_empty());
    }

    #[test]
    fn test_mode_switch_keeps_history() {
        let mut session = Session::new();
        session.push_exchange("hi", "hello");
        session.set_mode(AssistantMode::LeadGeneration);
        assert_eq!(session.mode(), AssistantMode::LeadGeneration);
        assert_eq!(session.history().len(), 2);
    }
}
