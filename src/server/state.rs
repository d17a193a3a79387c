use std::sync::Arc;

use crate::dispatch::SpeechService;
use crate::server::assembler::GapPolicy;
use crate::server::registry::SessionManager;
use crate::server::store::ChunkStore;

/// Shared application state for HTTP and WebSocket handlers
#[derive(Clone)]
pub struct AppState {
    /// All live sessions
    pub sessions: Arc<SessionManager>,
    /// Durable chunk storage
    pub store: Arc<ChunkStore>,
    /// How sequence gaps appear in merged output
    pub gap_policy: GapPolicy,
    /// Optional downstream transcription collaborator
    pub speech: Option<Arc<dyn SpeechService>>,
}

impl AppState {
    pub fn new(store: Arc<ChunkStore>, gap_policy: GapPolicy) -> Self {
        Self {
            sessions: Arc::new(SessionManager::with_uuid_ids()),
            store,
            gap_policy,
            speech: None,
        }
    }

    pub fn with_speech(mut self, speech: Arc<dyn SpeechService>) -> Self {
        self.speech = Some(speech);
        self
    }
}
