//! Session Management
//!
//! A session owns the chat transcript shown to the user. The agent never
//! touches it: the host appends the question, runs the agent, and appends
//! the answer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Conversation, Message, Role};

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Session metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Model used for the latest answer
    pub model: Option<String>,
}

/// One chat session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// User/assistant turns in display order
    pub transcript: Conversation,

    pub metadata: SessionMetadata,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    pub active: bool,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            transcript: Conversation::new(),
            metadata: SessionMetadata::default(),
            created_at: now,
            updated_at: now,
            active: true,
        }
    }

    pub fn with_id(id: SessionId) -> Self {
        let mut session = Self::new();
        session.id = id;
        session
    }

    /// Seed the transcript with an assistant greeting
    pub fn with_greeting(mut self, greeting: impl Into<String>) -> Self {
        self.transcript.push(Message::assistant(greeting));
        self
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn record_question(&mut self, question: impl Into<String>) {
        self.transcript.push(Message::user(question));
        self.touch();
    }

    pub fn record_answer(&mut self, answer: impl Into<String>, model: impl Into<String>) {
        let model = model.into();
        self.transcript
            .push(Message::assistant(answer).with_model(model.clone()));
        self.metadata.model = Some(model);
        self.touch();
    }

    /// Withdraw a question that will never be answered
    pub fn retract_question(&mut self) -> bool {
        let retracted = self.transcript.pop_question().is_some();
        if retracted {
            self.touch();
        }
        retracted
    }

    /// Preview of the first question, else a short form of the id
    pub fn title(&self) -> String {
        self.transcript
            .messages()
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| {
                let preview: String = m.content.chars().take(50).collect();
                if m.content.chars().count() > 50 {
                    format!("{}...", preview)
                } else {
                    preview
                }
            })
            .unwrap_or_else(|| {
                let short: String = self.id.as_str().chars().take(8).collect();
                format!("Session {}", short)
            })
    }

    pub fn end(&mut self) {
        self.active = false;
        self.touch();
    }

    pub fn message_count(&self) -> usize {
        self.transcript.len()
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
    fn test_session_creation() {
        let session = Session::new();
        assert!(session.active);
        assert_eq!(session.message_count(), 0);
        assert!(session.title().starts_with("Session "));
    }

    #[test]
    fn test_transcript_is_append_only_in_order() {
        let mut session = Session::new().with_greeting("Hi, ask me some math.");
        session.record_question("What is the square root of 144?");
        session.record_answer("12", "llama-3.3-70b-versatile");

        let roles: Vec<Role> = session.transcript.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(session.transcript.latest_question(), Some("What is the square root of 144?"));
        assert_eq!(session.metadata.model.as_deref(), Some("llama-3.3-70b-versatile"));
        assert_eq!(session.title(), "What is the square root of 144?");
    }

    #[test]
    fn test_retract_only_drops_unanswered_question() {
        let mut session = Session::new().with_greeting("Hi");
        session.record_question("2+2");
        session.record_answer("4", "m");
        assert!(!session.retract_question());
        assert_eq!(session.message_count(), 3);

        session.record_question("3+3");
        assert!(session.retract_question());
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.transcript.latest_question(), Some("2+2"));
    }

    #[test]
    fn test_end_marks_inactive() {
        let mut session = Session::with_id(SessionId::from_string("abc"));
        session.end();
        assert!(!session.active);
        assert_eq!(session.id.as_str(), "abc");
    }
}
