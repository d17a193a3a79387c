use super::state::AppState;
use super::{finish_session, FinishError};
use crate::server::assembler::AssembleError;
use crate::server::registry::{sanitize_id, AudioFormat, DEFAULT_SAMPLE_RATE};
use crate::server::store::StoreError;
use crate::transport::messages::{FinishResponse, WireFormat};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct FinishRequest {
    pub session_id: String,

    /// Last sequence number the client sent (pads trailing gaps)
    pub last_seq: Option<u64>,

    /// Resample the merged recording to this rate
    pub target_sample_rate: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub session_id: String,
    pub seq: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(ErrorResponse { error: message })).into_response()
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/recorder/chunks
/// Accept one self-describing binary chunk. The first chunk for an
/// unseen session id registers the session implicitly.
pub async fn upload_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(raw_id) = header_value(&headers, "x-session-id") else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "missing x-session-id header".to_string(),
        );
    };
    let session_id = sanitize_id(&raw_id);

    let seq: u64 = match header_value(&headers, "x-seq").map(|v| v.parse()) {
        Some(Ok(seq)) => seq,
        _ => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "missing or invalid x-seq header".to_string(),
            )
        }
    };

    let declared = AudioFormat {
        sample_rate: header_value(&headers, "x-sample-rate")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SAMPLE_RATE),
        channels: header_value(&headers, "x-channels")
            .and_then(|v| v.parse().ok())
            .unwrap_or(1),
        format: header_value(&headers, "x-format")
            .and_then(|v| v.parse().ok())
            .unwrap_or(WireFormat::F32),
        chunk_samples: header_value(&headers, "x-chunk-samples").and_then(|v| v.parse().ok()),
    };
    if declared.sample_rate == 0 || declared.channels == 0 {
        return error_response(
            StatusCode::BAD_REQUEST,
            "sample rate and channel count must be positive".to_string(),
        );
    }

    let session = state.sessions.get_or_create(&session_id).await;
    if let Err(err) = session.ensure_format(&declared) {
        warn!(session = %session.id, seq, error = %err, "chunk format mismatch, dropped");
        return error_response(StatusCode::BAD_REQUEST, err.to_string());
    }

    match state.store.put(&session.id, seq, declared.format, &body) {
        Ok(_) => {
            session.note_chunk(seq);
            (
                StatusCode::OK,
                Json(UploadResponse {
                    session_id: session.id.clone(),
                    seq,
                }),
            )
                .into_response()
        }
        Err(err @ (StoreError::Misaligned { .. } | StoreError::Empty)) => {
            // malformed payload: drop this chunk, keep the session alive
            warn!(session = %session.id, seq, error = %err, "rejected malformed chunk");
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
        Err(err) => {
            error!(session = %session.id, seq, error = %err, "failed to persist chunk");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to persist chunk: {err}"),
            )
        }
    }
}

/// POST /api/recorder/finish
/// Assemble every stored chunk of a session into one WAV. Idempotent:
/// repeating the request returns the artifact of the first merge.
pub async fn finish_recording(
    State(state): State<AppState>,
    Json(req): Json<FinishRequest>,
) -> Response {
    let session_id = sanitize_id(&req.session_id);

    let Some(session) = state.sessions.get(&session_id).await else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("no such session: {session_id}"),
        );
    };

    match finish_session(&state, &session, req.last_seq, req.target_sample_rate).await {
        Ok((merged, fresh)) => {
            info!(session = %session_id, fresh, "finish request served");
            (
                StatusCode::OK,
                Json(FinishResponse {
                    session_id: merged.session_id,
                    url: merged.url,
                    total_samples: merged.total_samples,
                    sample_rate: merged.sample_rate,
                    channels: merged.channels,
                    transcript: merged.transcript,
                }),
            )
                .into_response()
        }
        Err(err @ FinishError::Busy(_)) => {
            warn!(session = %session_id, "finish already in flight");
            error_response(StatusCode::CONFLICT, err.to_string())
        }
        Err(FinishError::Assemble(err)) => {
            let status = match &err {
                AssembleError::NoChunks(_) => StatusCode::NOT_FOUND,
                AssembleError::InvalidSampleRate(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                error!(session = %session_id, error = %err, "assembly failed");
            } else {
                warn!(session = %session_id, error = %err, "finish rejected");
            }
            error_response(status, err.to_string())
        }
        Err(err @ FinishError::Task(_)) => {
            error!(session = %session_id, error = %err, "assembly task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// GET /api/recorder/sessions/:session_id/status
pub async fn session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = sanitize_id(&session_id);
    match state.sessions.get(&session_id).await {
        Some(session) => (StatusCode::OK, Json(session.status())).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("no such session: {session_id}"),
        ),
    }
}

/// DELETE /api/recorder/sessions/:session_id
/// Explicit teardown. Stored chunks stay on disk and become eligible
/// for orphan collection if the session was never merged.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let session_id = sanitize_id(&session_id);
    match state.sessions.remove(&session_id).await {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("no such session: {session_id}"),
        ),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
