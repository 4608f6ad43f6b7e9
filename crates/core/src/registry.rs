//! Process-wide index of active call sessions.
//!
//! The registry never owns a session. Each session task owns its stream and
//! the registry only hands out cloned [`StreamHandle`]s. Entries carry a
//! generation token so a finishing task can only remove its own entry.

use serde::Serialize;
use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};
use voicenet_realtime::StreamHandle;

use crate::error::VoiceError;

/// Lifecycle of one orchestrated call.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    CreatingSession,
    Streaming,
    Ending,
    Ended,
    Failed,
}

impl SessionState {
    pub fn is_live(self) -> bool {
        matches!(
            self,
            SessionState::CreatingSession | SessionState::Streaming | SessionState::Ending
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::CreatingSession => "creatingSession",
            SessionState::Streaming => "streaming",
            SessionState::Ending => "ending",
            SessionState::Ended => "ended",
            SessionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Proof of a reservation; only its holder may release the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionToken(u64);

#[derive(Debug)]
struct Entry {
    token: SessionToken,
    state: SessionState,
    stream: Option<StreamHandle>,
}

/// A row of [`CallSessionRegistry::active`].
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub call_id: String,
    pub state: SessionState,
}

#[derive(Debug, Clone, Default)]
pub struct CallSessionRegistry {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    generation: Arc<AtomicU64>,
}

impl CallSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims `call_id` for a new session in `CreatingSession`.
    pub fn reserve(&self, call_id: &str) -> Result<SessionToken, VoiceError> {
        let mut entries = self.lock();
        if entries.contains_key(call_id) {
            return Err(VoiceError::SessionActive(call_id.to_string()));
        }
        let token = SessionToken(self.generation.fetch_add(1, Ordering::Relaxed));
        entries.insert(
            call_id.to_string(),
            Entry {
                token,
                state: SessionState::CreatingSession,
                stream: None,
            },
        );
        Ok(token)
    }

    /// Publishes the open stream for a reserved call and marks it `Streaming`.
    pub fn attach(&self, call_id: &str, token: SessionToken, stream: StreamHandle) -> bool {
        match self.lock().get_mut(call_id) {
            Some(entry) if entry.token == token => {
                entry.stream = Some(stream);
                entry.state = SessionState::Streaming;
                true
            }
            _ => false,
        }
    }

    pub fn set_state(&self, call_id: &str, token: SessionToken, state: SessionState) {
        if let Some(entry) = self.lock().get_mut(call_id) {
            if entry.token == token {
                entry.state = state;
            }
        }
    }

    /// Removes the entry if it still belongs to `token`.
    pub fn release(&self, call_id: &str, token: SessionToken) -> bool {
        let mut entries = self.lock();
        match entries.get(call_id) {
            Some(entry) if entry.token == token => {
                entries.remove(call_id);
                true
            }
            _ => false,
        }
    }

    /// Stream of a session that has finished creation.
    pub fn stream(&self, call_id: &str) -> Option<StreamHandle> {
        self.lock().get(call_id).and_then(|e| e.stream.clone())
    }

    pub fn state(&self, call_id: &str) -> Option<SessionState> {
        self.lock().get(call_id).map(|e| e.state)
    }

    pub fn contains(&self, call_id: &str) -> bool {
        self.lock().contains_key(call_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every registered call, sorted by call id.
    pub fn active(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<_> = self
            .lock()
            .iter()
            .map(|(call_id, e)| SessionSummary {
                call_id: call_id.clone(),
                state: e.state,
            })
            .collect();
        sessions.sort_by(|a, b| a.call_id.cmp(&b.call_id));
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserve_is_exclusive_per_call() {
        let registry = CallSessionRegistry::new();
        let token = registry.reserve("c1").unwrap();
        assert!(matches!(
            registry.reserve("c1"),
            Err(VoiceError::SessionActive(id)) if id == "c1"
        ));
        assert!(registry.reserve("c2").is_ok());
        assert_eq!(registry.state("c1"), Some(SessionState::CreatingSession));
        assert!(registry.stream("c1").is_none());

        assert!(registry.release("c1", token));
        assert!(!registry.contains("c1"));
        assert!(registry.reserve("c1").is_ok());
    }

    #[test]
    fn test_stale_token_cannot_touch_newer_entry() {
        let registry = CallSessionRegistry::new();
        let old = registry.reserve("c1").unwrap();
        assert!(registry.release("c1", old));
        let new = registry.reserve("c1").unwrap();

        assert!(!registry.release("c1", old));
        registry.set_state("c1", old, SessionState::Failed);
        assert_eq!(registry.state("c1"), Some(SessionState::CreatingSession));

        registry.set_state("c1", new, SessionState::Ending);
        assert_eq!(registry.state("c1"), Some(SessionState::Ending));
    }

    #[test]
    fn test_active_lists_sorted_snapshot() {
        let registry = CallSessionRegistry::new();
        registry.reserve("b").unwrap();
        registry.reserve("a").unwrap();
        assert_eq!(registry.len(), 2);
        let ids: Vec<_> = registry.active().into_iter().map(|s| s.call_id).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(
            serde_json::to_value(&registry.active()[0]).unwrap(),
            serde_json::json!({"callId": "a", "state": "creatingSession"})
        );
    }
}
