use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::transport::messages::WireFormat;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chunk payload of {len} bytes is not a multiple of the {width}-byte sample width")]
    Misaligned { len: usize, width: usize },
    #[error("empty chunk payload")]
    Empty,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Persists chunks as individually addressable files under
/// `<root>/<session>/parts/part_NNNNNN.pcm` and keeps an explicit
/// in-memory index mapping `(session, seq) -> path`. Ordering for
/// reassembly comes from the index, never from directory listings or
/// filename parsing.
///
/// Writes to distinct sequence numbers never share a key, so concurrent
/// uploads within one session are safe without a lock around the file
/// write itself; a duplicate sequence number is resolved last-write-wins.
pub struct ChunkStore {
    root: PathBuf,
    index: RwLock<HashMap<String, BTreeMap<u64, PathBuf>>>,
}

impl ChunkStore {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        info!(root = %root.display(), "chunk store initialized");
        Ok(Self {
            root,
            index: RwLock::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn parts_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id).join("parts")
    }

    pub fn final_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id).join("final")
    }

    /// URL path a merged artifact is served under (the store root is
    /// mounted at /recordings).
    pub fn public_url(&self, session_id: &str, file_name: &str) -> String {
        format!("/recordings/{session_id}/final/{file_name}")
    }

    /// Persist one chunk. Rejects payloads that do not hold a whole
    /// number of samples; the caller logs and drops the chunk while the
    /// session keeps going.
    pub fn put(
        &self,
        session_id: &str,
        seq: u64,
        format: WireFormat,
        payload: &[u8],
    ) -> Result<PathBuf, StoreError> {
        if payload.is_empty() {
            return Err(StoreError::Empty);
        }
        let width = format.sample_width();
        if payload.len() % width != 0 {
            return Err(StoreError::Misaligned {
                len: payload.len(),
                width,
            });
        }

        let dir = self.parts_dir(session_id);
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("part_{seq:06}.pcm"));
        fs::write(&path, payload)?;

        let mut index = self.index.write().unwrap();
        let replaced = index
            .entry(session_id.to_string())
            .or_default()
            .insert(seq, path.clone());
        if replaced.is_some() {
            warn!(session = session_id, seq, "duplicate sequence overwritten");
        }
        debug!(
            session = session_id,
            seq,
            bytes = payload.len(),
            "chunk stored"
        );
        Ok(path)
    }

    /// All chunks of a session in ascending sequence order, independent
    /// of the order they were written in.
    pub fn list(&self, session_id: &str) -> Vec<(u64, PathBuf)> {
        self.index
            .read()
            .unwrap()
            .get(session_id)
            .map(|chunks| chunks.iter().map(|(&seq, path)| (seq, path.clone())).collect())
            .unwrap_or_default()
    }

    pub fn chunk_count(&self, session_id: &str) -> usize {
        self.index
            .read()
            .unwrap()
            .get(session_id)
            .map(|chunks| chunks.len())
            .unwrap_or(0)
    }

    /// Drop a session's chunks and merged artifacts from disk and from
    /// the index.
    pub fn purge_session(&self, session_id: &str) -> io::Result<()> {
        self.index.write().unwrap().remove(session_id);
        match fs::remove_dir_all(self.root.join(session_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Collect sessions that were torn down without a merge: on-disk
    /// session directories that are not in `live`, have produced no
    /// merged artifact, and are older than `max_age`.
    pub fn gc_orphans(&self, live: &[String], max_age: Duration) -> io::Result<usize> {
        let mut purged = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if live.iter().any(|s| s == &name) {
                continue;
            }
            let final_dir = entry.path().join("final");
            if final_dir.is_dir() && fs::read_dir(&final_dir)?.next().is_some() {
                continue;
            }
            let modified = entry.metadata()?.modified()?;
            if modified.elapsed().unwrap_or_default() < max_age {
                continue;
            }
            self.purge_session(&name)?;
            info!(session = %name, "orphaned session purged");
            purged += 1;
        }
        Ok(purged)
    }
}
