use axum::extract::FromRef;
use std::sync::Arc;

use crate::config::Settings;
use crate::security::ApiKeyValidator;
use crate::services::{ChatOrchestrator, EventBus, SessionManager};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub sessions: Arc<SessionManager>,
    pub orchestrator: Arc<ChatOrchestrator>,
    pub event_bus: Arc<EventBus>,
    pub api_keys: Arc<ApiKeyValidator>,
}

impl FromRef<AppState> for Arc<SessionManager> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

impl FromRef<AppState> for Arc<ChatOrchestrator> {
    fn from_ref(state: &AppState) -> Self {
        state.orchestrator.clone()
    }
}

impl FromRef<AppState> for Arc<EventBus> {
    fn from_ref(state: &AppState) -> Self {
        state.event_bus.clone()
    }
}

impl FromRef<AppState> for Arc<Settings> {
    fn from_ref(state: &AppState) -> Self {
        state.settings.clone()
    }
}
