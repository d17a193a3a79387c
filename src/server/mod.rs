//! Chunk ingestion, session bookkeeping and ordered reassembly
//!
//! This module is the server half of the pipeline:
//! - POST /api/recorder/chunks - upload one self-describing binary chunk
//! - POST /api/recorder/finish - assemble a session into one WAV
//! - GET  /api/recorder/sessions/:id/status - session bookkeeping
//! - DELETE /api/recorder/sessions/:id - explicit teardown
//! - GET  /ws - persistent duplex carrier
//! - GET  /recordings/* - merged artifacts
//! - GET  /health - health check

pub mod assembler;
pub mod handlers;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;
pub mod ws;

pub use assembler::{AssembleError, AssembleOptions, GapPolicy, MergedArtifact};
pub use registry::{
    AudioFormat, IdProvider, MergedRecording, RegistryError, Session, SessionManager,
    SessionStatus, UuidIds,
};
pub use routes::create_router;
pub use state::AppState;
pub use store::{ChunkStore, StoreError};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum FinishError {
    #[error("a finish request is already in flight for session {0}")]
    Busy(String),
    #[error(transparent)]
    Assemble(#[from] AssembleError),
    #[error("assembler task failed: {0}")]
    Task(String),
}

/// Produce (or return) the session's single merged recording.
///
/// The first successful finish assembles and records the artifact; any
/// later finish is idempotent and returns the same artifact (the bool is
/// false for replays). A finish racing an in-flight merge gets `Busy`.
pub async fn finish_session(
    state: &AppState,
    session: &Arc<Session>,
    last_seq: Option<u64>,
    target_sample_rate: Option<u32>,
) -> Result<(MergedRecording, bool), FinishError> {
    if let Some(existing) = session.merged() {
        return Ok((existing, false));
    }

    let _guard = session
        .try_lock_finish()
        .map_err(|_| FinishError::Busy(session.id.clone()))?;

    // a racing finish may have completed between the check and the gate
    if let Some(existing) = session.merged() {
        return Ok((existing, false));
    }

    let format = session.format();
    let opts = AssembleOptions {
        target_sample_rate,
        gap_policy: state.gap_policy,
        expected_last_seq: last_seq,
    };

    let store = Arc::clone(&state.store);
    let session_id = session.id.clone();
    let artifact = tokio::task::spawn_blocking(move || {
        assembler::assemble(&store, &session_id, &format, &opts)
    })
    .await
    .map_err(|err| FinishError::Task(err.to_string()))??;

    let transcript = match &state.speech {
        Some(speech) => match std::fs::read(&artifact.path) {
            Ok(wav_bytes) => match speech.transcribe(wav_bytes).await {
                Ok(transcription) => Some(transcription.text),
                Err(err) => {
                    warn!(session = %session.id, error = %err, "transcription failed");
                    None
                }
            },
            Err(err) => {
                warn!(session = %session.id, error = %err, "could not read merged file for transcription");
                None
            }
        },
        None => None,
    };

    let merged = MergedRecording {
        session_id: session.id.clone(),
        total_samples: artifact.total_samples,
        sample_rate: artifact.sample_rate,
        channels: artifact.channels,
        url: state.store.public_url(&session.id, &artifact.file_name),
        path: artifact.path,
        created_at: Utc::now(),
        transcript,
    };
    session.set_merged(merged.clone());

    Ok((merged, true))
}

/// Periodically collect sessions that were torn down without a merge.
pub async fn run_gc(state: AppState, every: Duration, max_age: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        ticker.tick().await;
        let live = state.sessions.session_ids().await;
        match state.store.gc_orphans(&live, max_age) {
            Ok(0) => {}
            Ok(purged) => info!(purged, "collected orphaned sessions"),
            Err(err) => warn!(error = %err, "orphan collection failed"),
        }
    }
}
