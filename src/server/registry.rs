use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::transport::messages::WireFormat;

/// Sample rate assumed for sessions that never declare one.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Identity generation is injected so tests can run multiple managers
/// with deterministic ids.
pub trait IdProvider: Send + Sync {
    fn next_id(&self) -> String;
}

pub struct UuidIds;

impl IdProvider for UuidIds {
    fn next_id(&self) -> String {
        format!("rec-{}", Uuid::new_v4())
    }
}

/// Session ids become path components on disk; anything outside the
/// safe alphabet is replaced.
pub fn sanitize_id(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned
    }
}

/// The audio format a session's chunks share. Fixed once declared (by
/// registration or by the first chunk's headers); later chunks must
/// match.
#[derive(Debug, Clone)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: WireFormat,
    /// Samples per full chunk when the client segments uniformly
    pub chunk_samples: Option<usize>,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: 1,
            format: WireFormat::F32,
            chunk_samples: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session declared {expected} Hz but chunk carries {got} Hz")]
    SampleRateMismatch { expected: u32, got: u32 },
    #[error("session declared {expected} channels but chunk carries {got}")]
    ChannelMismatch { expected: u16, got: u16 },
    #[error("session declared {expected} samples but chunk carries {got} samples")]
    FormatMismatch { expected: WireFormat, got: WireFormat },
}

/// The single merged artifact produced for a session.
#[derive(Debug, Clone, Serialize)]
pub struct MergedRecording {
    pub session_id: String,
    pub total_samples: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub path: PathBuf,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub transcript: Option<String>,
}

/// Bookkeeping snapshot for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub sample_rate: u32,
    pub channels: u16,
    pub chunks_stored: u64,
    pub highest_seq: Option<u64>,
    pub merged: bool,
}

#[derive(Debug, Default)]
struct Counters {
    chunks_stored: u64,
    highest_seq: Option<u64>,
}

#[derive(Debug)]
struct FormatState {
    declared: bool,
    format: AudioFormat,
}

/// Server-side state for one recording attempt. Owned by the session
/// manager for the lifetime of the connection (or until explicit
/// teardown); chunks written for it outlive the session on disk.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    format: Mutex<FormatState>,
    counters: Mutex<Counters>,
    merged: Mutex<Option<MergedRecording>>,
    finish_gate: tokio::sync::Mutex<()>,
}

impl Session {
    fn new(id: String) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            format: Mutex::new(FormatState {
                declared: false,
                format: AudioFormat::default(),
            }),
            counters: Mutex::new(Counters::default()),
            merged: Mutex::new(None),
            finish_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format.lock().unwrap().format.clone()
    }

    /// Adopt `declared` as the session format if none was declared yet,
    /// otherwise verify the incoming chunk matches what the session is
    /// fixed to.
    pub fn ensure_format(&self, declared: &AudioFormat) -> Result<(), RegistryError> {
        let mut state = self.format.lock().unwrap();
        if !state.declared {
            state.declared = true;
            state.format = declared.clone();
            return Ok(());
        }
        let current = &mut state.format;
        if current.sample_rate != declared.sample_rate {
            return Err(RegistryError::SampleRateMismatch {
                expected: current.sample_rate,
                got: declared.sample_rate,
            });
        }
        if current.channels != declared.channels {
            return Err(RegistryError::ChannelMismatch {
                expected: current.channels,
                got: declared.channels,
            });
        }
        if current.format != declared.format {
            return Err(RegistryError::FormatMismatch {
                expected: current.format,
                got: declared.format,
            });
        }
        if current.chunk_samples.is_none() {
            current.chunk_samples = declared.chunk_samples;
        }
        Ok(())
    }

    /// Record a durably written chunk. Sequence numbers are assigned by
    /// the sender and need not arrive contiguously.
    pub fn note_chunk(&self, seq: u64) {
        let mut counters = self.counters.lock().unwrap();
        counters.chunks_stored += 1;
        counters.highest_seq = Some(counters.highest_seq.map_or(seq, |h| h.max(seq)));
    }

    pub fn merged(&self) -> Option<MergedRecording> {
        self.merged.lock().unwrap().clone()
    }

    pub fn set_merged(&self, recording: MergedRecording) {
        *self.merged.lock().unwrap() = Some(recording);
    }

    /// At most one merge may be in flight per session.
    pub fn try_lock_finish(
        &self,
    ) -> Result<tokio::sync::MutexGuard<'_, ()>, tokio::sync::TryLockError> {
        self.finish_gate.try_lock()
    }

    pub fn status(&self) -> SessionStatus {
        let format = self.format.lock().unwrap().format.clone();
        let counters = self.counters.lock().unwrap();
        SessionStatus {
            session_id: self.id.clone(),
            created_at: self.created_at,
            sample_rate: format.sample_rate,
            channels: format.channels,
            chunks_stored: counters.chunks_stored,
            highest_seq: counters.highest_seq,
            merged: self.merged.lock().unwrap().is_some(),
        }
    }
}

/// Owns every live session and all session counters. Sessions are fully
/// independent; the map lock is only held for lookups, never across a
/// session's own work.
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    ids: Box<dyn IdProvider>,
}

impl SessionManager {
    pub fn new(ids: Box<dyn IdProvider>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ids,
        }
    }

    pub fn with_uuid_ids() -> Self {
        Self::new(Box::new(UuidIds))
    }

    /// Explicit registration: allocate (or adopt) a session and declare
    /// its format.
    pub async fn register(
        &self,
        requested_id: Option<String>,
        format: AudioFormat,
    ) -> Result<Arc<Session>, RegistryError> {
        let id = match requested_id.filter(|v| !v.trim().is_empty()) {
            Some(v) => sanitize_id(&v),
            None => sanitize_id(&self.ids.next_id()),
        };
        let session = self.get_or_create(&id).await;
        session.ensure_format(&format)?;
        Ok(session)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Implicit registration: the first chunk for an unseen identifier
    /// creates the session.
    pub async fn get_or_create(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(id) {
            return session.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(id.to_string())
            .or_insert_with(|| {
                info!(session = id, "session created");
                Arc::new(Session::new(id.to_string()))
            })
            .clone()
    }

    /// Tear down a session. Chunks already written stay on disk and
    /// become eligible for orphan collection if never merged.
    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        let removed = self.sessions.write().await.remove(id);
        if removed.is_some() {
            info!(session = id, "session removed");
        }
        removed
    }

    pub async fn session_ids(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
