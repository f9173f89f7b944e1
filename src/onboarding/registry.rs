//! Session registry: at most one live workflow per applicant.
//!
//! `claim` is the only way a session comes into being and is atomic under the
//! registry lock, so two concurrent triggers for the same applicant resolve to
//! exactly one winner. `end` is idempotent because the resolution and timeout
//! paths may race to call it.

use std::collections::HashMap;

use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::error::SessionError;
use crate::ids::UserId;

use super::events::StageEvent;
use super::stage::Stage;

/// Mailbox depth per session. Events beyond this are dropped rather than
/// blocking the router; a session that far behind is effectively dead anyway.
const MAILBOX_CAPACITY: usize = 32;

/// What `claim` hands the new session task.
pub struct SessionSlot {
    /// The session's event mailbox.
    pub events: mpsc::Receiver<StageEvent>,
    /// Sender clone for the timeout supervisor.
    pub mailbox: mpsc::Sender<StageEvent>,
    /// Publish stage changes here for external observers.
    pub stage_tx: watch::Sender<Stage>,
}

struct ActiveSession {
    mailbox: mpsc::Sender<StageEvent>,
    stage_rx: watch::Receiver<Stage>,
}

/// Tracks active sessions and routes events to their mailboxes.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: std::sync::Mutex<HashMap<UserId, ActiveSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claim the applicant key. Exactly one concurrent caller
    /// succeeds; the rest get `AlreadyInProgress`.
    pub fn claim(&self, applicant: UserId) -> Result<SessionSlot, SessionError> {
        let mut sessions = self.sessions.lock().expect("registry lock poisoned");
        if sessions.contains_key(&applicant) {
            return Err(SessionError::AlreadyInProgress(applicant));
        }

        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (stage_tx, stage_rx) = watch::channel(Stage::LanguageSelect);
        sessions.insert(
            applicant,
            ActiveSession {
                mailbox: tx.clone(),
                stage_rx,
            },
        );
        Ok(SessionSlot {
            events: rx,
            mailbox: tx,
            stage_tx,
        })
    }

    /// End a session. Idempotent: unknown or already-ended applicants are a
    /// no-op. Dropping the mailbox sender closes the session's event channel.
    pub fn end(&self, applicant: UserId) {
        let removed = self
            .sessions
            .lock()
            .expect("registry lock poisoned")
            .remove(&applicant)
            .is_some();
        if removed {
            debug!(%applicant, "Session ended");
        }
    }

    /// Deliver an event to the applicant's session, if one is live. Events
    /// for unknown applicants are dropped; stale interactions are expected,
    /// not errors.
    pub async fn route(&self, applicant: UserId, event: StageEvent) {
        let mailbox = {
            let sessions = self.sessions.lock().expect("registry lock poisoned");
            sessions.get(&applicant).map(|s| s.mailbox.clone())
        };
        match mailbox {
            Some(mailbox) => {
                if mailbox.send(event).await.is_err() {
                    debug!(%applicant, "Dropped event for closing session");
                }
            }
            None => debug!(%applicant, "Dropped event for unknown session"),
        }
    }

    /// Current stage of an in-flight session, if any.
    pub fn current_stage(&self, applicant: UserId) -> Option<Stage> {
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .get(&applicant)
            .map(|s| *s.stage_rx.borrow())
    }

    /// Watch an in-flight session's stage transitions.
    pub fn watch_stage(&self, applicant: UserId) -> Option<watch::Receiver<Stage>> {
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .get(&applicant)
            .map(|s| s.stage_rx.clone())
    }

    pub fn is_active(&self, applicant: UserId) -> bool {
        self.sessions
            .lock()
            .expect("registry lock poisoned")
            .contains_key(&applicant)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.lock().expect("registry lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn second_claim_for_same_applicant_is_rejected() {
        let registry = SessionRegistry::new();
        let _slot = registry.claim(UserId(1)).unwrap();
        assert!(matches!(
            registry.claim(UserId(1)),
            Err(SessionError::AlreadyInProgress(UserId(1)))
        ));
        // A different applicant is unaffected.
        assert!(registry.claim(UserId(2)).is_ok());
    }

    #[tokio::test]
    async fn concurrent_claims_yield_exactly_one_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            handles.push(tokio::spawn(async move {
                registry.claim(UserId(7)).is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(registry.active_count(), 1);
    }

    #[tokio::test]
    async fn end_is_idempotent_and_frees_the_key() {
        let registry = SessionRegistry::new();
        let _slot = registry.claim(UserId(1)).unwrap();
        registry.end(UserId(1));
        registry.end(UserId(1));
        registry.end(UserId(99));
        assert!(!registry.is_active(UserId(1)));
        // The key can be claimed again after ending.
        assert!(registry.claim(UserId(1)).is_ok());
    }

    #[tokio::test]
    async fn route_delivers_to_the_mailbox() {
        let registry = SessionRegistry::new();
        let mut slot = registry.claim(UserId(1)).unwrap();
        registry.route(UserId(1), StageEvent::ApplicantLeft).await;
        assert_eq!(slot.events.recv().await, Some(StageEvent::ApplicantLeft));
    }

    #[tokio::test]
    async fn route_to_unknown_applicant_is_dropped() {
        let registry = SessionRegistry::new();
        // Must not panic or block.
        registry.route(UserId(404), StageEvent::ApplicantLeft).await;
    }

    #[tokio::test]
    async fn ending_closes_the_event_channel() {
        let registry = SessionRegistry::new();
        let SessionSlot { mut events, mailbox, .. } = registry.claim(UserId(1)).unwrap();
        // The registry holds one sender, the slot another; both must go
        // before the mailbox reads as closed.
        registry.end(UserId(1));
        drop(mailbox);
        assert_eq!(events.recv().await, None);
    }

    #[tokio::test]
    async fn stage_watch_reflects_published_transitions() {
        let registry = SessionRegistry::new();
        let slot = registry.claim(UserId(1)).unwrap();
        assert_eq!(registry.current_stage(UserId(1)), Some(Stage::LanguageSelect));

        slot.stage_tx.send_replace(Stage::Intake);
        assert_eq!(registry.current_stage(UserId(1)), Some(Stage::Intake));
        assert_eq!(registry.current_stage(UserId(2)), None);
    }
}
