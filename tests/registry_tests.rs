// Integration tests for session management and the finish flow
//
// These tests verify injected identity generation, implicit session
// creation, format pinning, and the idempotent at-most-one-merge
// finish semantics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tempfile::TempDir;
use voicepipe::server::registry::{AudioFormat, IdProvider, SessionManager};
use voicepipe::server::store::ChunkStore;
use voicepipe::server::{finish_session, AppState, FinishError, GapPolicy};
use voicepipe::transport::messages::WireFormat;

/// Deterministic ids for tests.
struct SeqIds(AtomicU64);

impl SeqIds {
    fn new() -> Self {
        Self(AtomicU64::new(0))
    }
}

impl IdProvider for SeqIds {
    fn next_id(&self) -> String {
        format!("s-{}", self.0.fetch_add(1, Ordering::SeqCst))
    }
}

fn f32_format(sample_rate: u32) -> AudioFormat {
    AudioFormat {
        sample_rate,
        channels: 1,
        format: WireFormat::F32,
        chunk_samples: None,
    }
}

fn f32_bytes(samples: &[f32]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

#[tokio::test]
async fn managers_use_their_injected_id_provider() -> Result<()> {
    let first = SessionManager::new(Box::new(SeqIds::new()));
    let second = SessionManager::new(Box::new(SeqIds::new()));

    let a = first.register(None, f32_format(48_000)).await?;
    let b = first.register(None, f32_format(48_000)).await?;
    assert_eq!(a.id, "s-0");
    assert_eq!(b.id, "s-1");

    // independent managers do not share counters
    let c = second.register(None, f32_format(48_000)).await?;
    assert_eq!(c.id, "s-0");
    Ok(())
}

#[tokio::test]
async fn requested_ids_are_sanitized_for_storage() -> Result<()> {
    let manager = SessionManager::new(Box::new(SeqIds::new()));
    let session = manager
        .register(Some("../evil id!".to_string()), f32_format(48_000))
        .await?;
    assert_eq!(session.id, "___evil_id_");
    Ok(())
}

#[tokio::test]
async fn first_chunk_registers_implicitly() -> Result<()> {
    let manager = SessionManager::new(Box::new(SeqIds::new()));
    assert!(manager.get("take-1").await.is_none());

    let session = manager.get_or_create("take-1").await;
    session.note_chunk(0);
    session.note_chunk(4);

    let found = manager.get("take-1").await.expect("session should exist");
    assert!(Arc::ptr_eq(&session, &found));

    let status = found.status();
    assert_eq!(status.chunks_stored, 2);
    assert_eq!(status.highest_seq, Some(4));
    assert!(!status.merged);
    Ok(())
}

#[tokio::test]
async fn session_format_is_fixed_once_declared() -> Result<()> {
    let manager = SessionManager::new(Box::new(SeqIds::new()));
    let session = manager.get_or_create("take-1").await;

    session.ensure_format(&f32_format(48_000))?;
    // same format again is fine
    session.ensure_format(&f32_format(48_000))?;
    // a different rate is not
    assert!(session.ensure_format(&f32_format(44_100)).is_err());
    // and neither is a different sample encoding
    let mut other = f32_format(48_000);
    other.format = WireFormat::I16;
    assert!(session.ensure_format(&other).is_err());
    Ok(())
}

#[tokio::test]
async fn finish_is_idempotent() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = Arc::new(ChunkStore::new(temp_dir.path())?);
    let state = AppState::new(Arc::clone(&store), GapPolicy::FillSilence);

    let session = state.sessions.get_or_create("take-1").await;
    session.ensure_format(&f32_format(8_000))?;
    store.put("take-1", 0, WireFormat::F32, &f32_bytes(&[0.5f32; 8]))?;
    store.put("take-1", 1, WireFormat::F32, &f32_bytes(&[0.25f32; 8]))?;

    let (first, fresh) = finish_session(&state, &session, None, None).await?;
    assert!(fresh);
    assert_eq!(first.total_samples, 16);
    assert!(first.path.exists());
    assert_eq!(first.url, "/recordings/take-1/final/take-1.wav");

    // a replayed finish returns the same artifact without remerging
    let bytes_before = std::fs::read(&first.path)?;
    let (second, fresh) = finish_session(&state, &session, None, None).await?;
    assert!(!fresh);
    assert_eq!(second.url, first.url);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(std::fs::read(&second.path)?, bytes_before);

    // source chunks survive the merge
    assert_eq!(store.chunk_count("take-1"), 2);
    Ok(())
}

#[tokio::test]
async fn finish_without_chunks_reports_no_data() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = Arc::new(ChunkStore::new(temp_dir.path())?);
    let state = AppState::new(store, GapPolicy::FillSilence);

    let session = state.sessions.get_or_create("take-1").await;
    let err = finish_session(&state, &session, None, None).await.unwrap_err();
    assert!(matches!(
        err,
        FinishError::Assemble(voicepipe::AssembleError::NoChunks(_))
    ));
    Ok(())
}

#[tokio::test]
async fn removed_sessions_leave_orphaned_chunks_for_gc() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = Arc::new(ChunkStore::new(temp_dir.path())?);
    let state = AppState::new(Arc::clone(&store), GapPolicy::FillSilence);

    let session = state.sessions.get_or_create("take-1").await;
    session.ensure_format(&f32_format(8_000))?;
    store.put("take-1", 0, WireFormat::F32, &f32_bytes(&[0.5f32; 4]))?;

    state.sessions.remove("take-1").await;
    assert!(state.sessions.get("take-1").await.is_none());
    // the chunk is orphaned, not deleted
    assert_eq!(store.chunk_count("take-1"), 1);

    let purged = store.gc_orphans(&[], std::time::Duration::ZERO)?;
    assert_eq!(purged, 1);
    assert_eq!(store.chunk_count("take-1"), 0);
    Ok(())
}
