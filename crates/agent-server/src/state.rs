//! Application State

use std::collections::HashMap;
use std::sync::Arc;

use agent_core::{AgentConfig, CancellationToken, Session, SessionId};
use agent_runtime::ProviderSource;
use math_solver::{KnowledgeSource, GREETING};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Hands out a model provider per request (the caller's key may differ)
    pub providers: Arc<dyn ProviderSource>,

    /// Search backend for the Wikipedia tool
    pub knowledge: Arc<dyn KnowledgeSource>,

    pub agent_config: AgentConfig,

    pub sessions: SessionRegistry,
}

/// Sessions kept before idle ones are evicted
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Handle for one in-flight run
#[derive(Clone, Debug)]
pub struct RunTicket {
    pub session_id: SessionId,
    pub run_id: Uuid,
    pub cancel: CancellationToken,

    /// The session was opened by this run
    pub created: bool,
}

struct SessionSlot {
    session: Session,
    in_flight: Option<(Uuid, CancellationToken)>,
}

/// In-memory sessions; each holds at most one in-flight run.
///
/// Once `max_sessions` is reached, opening a new session evicts the idle
/// session that was updated least recently. Sessions with a run in flight
/// are never evicted.
#[derive(Clone)]
pub struct SessionRegistry {
    slots: Arc<Mutex<HashMap<SessionId, SessionSlot>>>,
    max_sessions: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_SESSIONS)
    }
}

impl SessionRegistry {
    pub fn with_capacity(max_sessions: usize) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            max_sessions: max_sessions.max(1),
        }
    }

    /// Record a question and start a run for it.
    ///
    /// Creates the session (greeting first) when the id is new, and cancels
    /// any run still working on an earlier question.
    pub async fn begin(&self, id: Option<SessionId>, question: &str) -> RunTicket {
        let id = id.unwrap_or_default();
        let mut slots = self.slots.lock().await;
        let created = !slots.contains_key(&id);
        if created && slots.len() >= self.max_sessions {
            Self::evict_idle(&mut slots);
        }
        let slot = slots.entry(id.clone()).or_insert_with(|| {
            tracing::info!(session = %id, "Session created");
            SessionSlot {
                session: Session::with_id(id.clone()).with_greeting(GREETING),
                in_flight: None,
            }
        });

        if let Some((previous, token)) = slot.in_flight.take() {
            tracing::info!(session = %id, run = %previous, "Superseding in-flight run");
            token.cancel();
        }

        slot.session.record_question(question);
        let ticket = RunTicket {
            session_id: id,
            run_id: Uuid::new_v4(),
            cancel: CancellationToken::new(),
            created,
        };
        slot.in_flight = Some((ticket.run_id, ticket.cancel.clone()));
        ticket
    }

    /// Close a run; the answer is kept only if the run is still current
    pub async fn finish(&self, ticket: &RunTicket, answer: Option<(&str, &str)>) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(&ticket.session_id) else {
            return false;
        };
        match &slot.in_flight {
            Some((run_id, _)) if *run_id == ticket.run_id => slot.in_flight = None,
            _ => return false,
        }
        if let Some((text, model)) = answer {
            slot.session.record_answer(text, model);
        }
        true
    }

    /// Undo a run whose credentials were refused upstream.
    ///
    /// A session opened by the run is dropped; an existing one loses the
    /// question again. No-op once a newer run took over.
    pub async fn abandon(&self, ticket: &RunTicket) -> bool {
        let mut slots = self.slots.lock().await;
        let Some(slot) = slots.get_mut(&ticket.session_id) else {
            return false;
        };
        match &slot.in_flight {
            Some((run_id, _)) if *run_id == ticket.run_id => slot.in_flight = None,
            _ => return false,
        }
        if ticket.created {
            slots.remove(&ticket.session_id);
            tracing::info!(session = %ticket.session_id, "Session dropped after rejected credentials");
        } else {
            slot.session.retract_question();
        }
        true
    }

    fn evict_idle(slots: &mut HashMap<SessionId, SessionSlot>) {
        let oldest = slots
            .iter()
            .filter(|(_, slot)| slot.in_flight.is_none())
            .min_by_key(|(_, slot)| slot.session.updated_at)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                slots.remove(&id);
                tracing::info!(session = %id, "Evicted idle session");
            }
            None => tracing::warn!(sessions = slots.len(), "Session limit reached with every session busy"),
        }
    }

    /// Cancel the run without touching the transcript
    pub async fn cancel(&self, ticket: &RunTicket) {
        ticket.cancel.cancel();
        self.finish(ticket, None).await;
    }

    pub async fn get(&self, id: &SessionId) -> Option<(Session, bool)> {
        let slots = self.slots.lock().await;
        slots
            .get(id)
            .map(|slot| (slot.session.clone(), slot.in_flight.is_some()))
    }

    /// Drop a session, cancelling its in-flight run
    pub async fn remove(&self, id: &SessionId) -> bool {
        let mut slots = self.slots.lock().await;
        match slots.remove(id) {
            Some(mut slot) => {
                if let Some((_, token)) = slot.in_flight.take() {
                    token.cancel();
                }
                slot.session.end();
                tracing::info!(session = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    pub async fn count(&self) -> usize {
        self.slots.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use agent_core::Role;

    async fn answered(sessions: &SessionRegistry, id: &str) -> RunTicket {
        let ticket = sessions.begin(Some(SessionId::from_string(id)), "q").await;
        sessions.finish(&ticket, Some(("a", "m"))).await;
        // keep updated_at strictly ordered
        tokio::time::sleep(Duration::from_millis(5)).await;
        ticket
    }

    #[tokio::test]
    async fn test_new_session_starts_with_greeting() {
        let sessions = SessionRegistry::default();
        let ticket = sessions.begin(None, "2+2").await;
        assert!(sessions.finish(&ticket, Some(("4", "test-model"))).await);

        let (session, running) = sessions.get(&ticket.session_id).await.unwrap();
        assert!(!running);
        let transcript = session.transcript.messages();
        assert_eq!(transcript[0].content, GREETING);
        assert_eq!(transcript[1].role, Role::User);
        assert_eq!(transcript[2].content, "4");
    }

    #[tokio::test]
    async fn test_new_question_supersedes_running_one() {
        let sessions = SessionRegistry::default();
        let first = sessions.begin(Some(SessionId::from_string("s1")), "first").await;
        let second = sessions.begin(Some(SessionId::from_string("s1")), "second").await;

        assert!(first.cancel.is_cancelled());
        assert!(!sessions.finish(&first, Some(("late", "m"))).await);
        assert!(sessions.finish(&second, Some(("on time", "m"))).await);

        let (session, _) = sessions.get(&second.session_id).await.unwrap();
        let contents: Vec<&str> = session
            .transcript
            .messages()
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec![GREETING, "first", "second", "on time"]);
    }

    #[tokio::test]
    async fn test_remove_cancels_in_flight() {
        let sessions = SessionRegistry::default();
        let ticket = sessions.begin(None, "q").await;
        assert!(sessions.remove(&ticket.session_id).await);
        assert!(ticket.cancel.is_cancelled());
        assert!(sessions.get(&ticket.session_id).await.is_none());
        assert!(!sessions.remove(&ticket.session_id).await);
        assert_eq!(sessions.count().await, 0);
    }

    #[tokio::test]
    async fn test_abandon_drops_new_session() {
        let sessions = SessionRegistry::default();
        let ticket = sessions.begin(None, "2+2").await;
        assert!(ticket.created);
        assert!(sessions.abandon(&ticket).await);
        assert_eq!(sessions.count().await, 0);
        assert!(!sessions.abandon(&ticket).await);
    }

    #[tokio::test]
    async fn test_abandon_retracts_question_on_existing_session() {
        let sessions = SessionRegistry::default();
        let first = answered(&sessions, "s1").await;
        assert!(first.created);

        let second = sessions.begin(Some(SessionId::from_string("s1")), "3+3").await;
        assert!(!second.created);
        assert!(sessions.abandon(&second).await);

        let (session, running) = sessions.get(&second.session_id).await.unwrap();
        assert!(!running);
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.transcript.latest_question(), Some("q"));
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent_idle_session() {
        let sessions = SessionRegistry::with_capacity(2);
        answered(&sessions, "old").await;
        answered(&sessions, "recent").await;
        // revisiting "old" makes "recent" the stalest
        answered(&sessions, "old").await;

        answered(&sessions, "new").await;
        assert_eq!(sessions.count().await, 2);
        assert!(sessions.get(&SessionId::from_string("recent")).await.is_none());
        assert!(sessions.get(&SessionId::from_string("old")).await.is_some());
    }

    #[tokio::test]
    async fn test_capacity_spares_busy_sessions() {
        let sessions = SessionRegistry::with_capacity(1);
        let busy = sessions.begin(Some(SessionId::from_string("busy")), "q").await;
        let other = sessions.begin(Some(SessionId::from_string("other")), "q").await;

        assert!(!busy.cancel.is_cancelled());
        assert!(sessions.get(&busy.session_id).await.is_some());
        assert!(sessions.get(&other.session_id).await.is_some());
    }
}
