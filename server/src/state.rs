use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use beacon_core::config::ApiConfig;

/// Shared transport state: the injected API configuration and the registry
/// of live SSE sessions. Each session owns one outbound channel; responses
/// to posted messages are routed through it.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    sessions: Arc<Mutex<HashMap<String, mpsc::Sender<Value>>>>,
}

impl AppState {
    pub fn new(config: ApiConfig) -> Self {
        Self {
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn register_session(&self, session_id: String, sender: mpsc::Sender<Value>) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id, sender);
    }

    pub fn remove_session(&self, session_id: &str) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id);
    }

    pub fn sender_for(&self, session_id: &str) -> Option<mpsc::Sender<Value>> {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.get(session_id).cloned()
    }

    pub fn session_count(&self) -> usize {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use beacon_core::config::ApiConfig;
    use tokio::sync::mpsc;

    use super::AppState;

    #[test]
    fn sessions_register_resolve_and_remove() {
        let state = AppState::new(ApiConfig::new(None, "http://127.0.0.1:9"));
        let (tx, _rx) = mpsc::channel(1);

        state.register_session("s1".to_string(), tx);
        assert_eq!(state.session_count(), 1);
        assert!(state.sender_for("s1").is_some());
        assert!(state.sender_for("s2").is_none());

        state.remove_session("s1");
        assert_eq!(state.session_count(), 0);
        assert!(state.sender_for("s1").is_none());
    }
}
