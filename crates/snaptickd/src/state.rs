use crate::auth::{TokenIssuer, UserStore};
use crate::engine::EngineHandle;
use snaptick_core::{ManifestEntry, Roster};
use std::sync::Arc;

/// Shared application state. The roster and manifest are read-only after startup.
#[derive(Clone)]
pub struct AppState {
    pub roster: Arc<Roster>,
    /// Manifest records as loaded, served back by `/students`.
    pub students: Arc<Vec<ManifestEntry>>,
    pub engine: EngineHandle,
    pub users: Arc<UserStore>,
    pub tokens: Arc<TokenIssuer>,
    pub match_threshold: f32,
}
