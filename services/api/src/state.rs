//! Shared Application State
//!
//! `AppState` holds the command client, the session orchestrator and the
//! webhook bookkeeping shared by every handler.

use crate::config::Config;
use std::{
    collections::{HashSet, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::mpsc;
use voicenet_core::{
    CommandClient, OrchestratorConfig, SessionOrchestrator, SessionOutput, ToolRegistry,
};

const OUTPUT_CAPACITY: usize = 256;
const SEEN_EVENTS_CAPACITY: usize = 1024;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub commands: Arc<dyn CommandClient>,
    pub orchestrator: Arc<SessionOrchestrator>,
    pub config: Arc<Config>,
    pub seen_events: Arc<SeenEvents>,
}

impl AppState {
    /// Wires the orchestrator, returning the receiving end of its outputs.
    pub fn new(
        config: Config,
        commands: Arc<dyn CommandClient>,
        tools: ToolRegistry,
    ) -> (Self, mpsc::Receiver<SessionOutput>) {
        let (outputs_tx, outputs_rx) = mpsc::channel(OUTPUT_CAPACITY);
        let mut orchestrator_config =
            OrchestratorConfig::new(config.base_url.clone(), config.api_key.clone());
        orchestrator_config.runtime_url = config.runtime_url.clone();
        orchestrator_config.connect_timeout = config.connect_timeout;
        orchestrator_config.keepalive_interval = config.keepalive_interval;

        let orchestrator = SessionOrchestrator::new(
            commands.clone(),
            Arc::new(tools),
            orchestrator_config,
            outputs_tx,
        );
        let state = Self {
            commands,
            orchestrator: Arc::new(orchestrator),
            config: Arc::new(config),
            seen_events: Arc::new(SeenEvents::new(SEEN_EVENTS_CAPACITY)),
        };
        (state, outputs_rx)
    }
}

/// Bounded memory of webhook event ids, oldest forgotten first.
#[derive(Debug)]
pub struct SeenEvents {
    capacity: usize,
    inner: Mutex<(VecDeque<String>, HashSet<String>)>,
}

impl SeenEvents {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new((VecDeque::new(), HashSet::new())),
        }
    }

    /// Records `event_id`; `false` if it was already recorded.
    pub fn insert(&self, event_id: &str) -> bool {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let (order, ids) = &mut *guard;
        if !ids.insert(event_id.to_string()) {
            return false;
        }
        order.push_back(event_id.to_string());
        if order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                ids.remove(&oldest);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seen_events_detects_duplicates() {
        let seen = SeenEvents::new(8);
        assert!(seen.insert("e1"));
        assert!(!seen.insert("e1"));
        assert!(seen.insert("e2"));
    }

    #[test]
    fn test_seen_events_forgets_oldest() {
        let seen = SeenEvents::new(2);
        assert!(seen.insert("e1"));
        assert!(seen.insert("e2"));
        assert!(seen.insert("e3"));
        assert!(seen.insert("e1"));
        assert!(!seen.insert("e3"));
    }
}
