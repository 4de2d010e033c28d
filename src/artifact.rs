//! Ephemeral audio file bookkeeping
//!
//! Every recording and synthesized reply is registered here under the turn
//! that created it. Releasing a handle deletes the file and unregisters it,
//! so a second release of the same handle is a no-op: each artifact is
//! deleted exactly once no matter which exit path gets there first.

use crate::types::{ArtifactHandle, AudioEncoding, TurnSequenceId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// What produced an artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// Microphone recording of the user's utterance
    Utterance,
    /// Synthesized reply audio
    Reply,
}

impl ArtifactKind {
    fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::Utterance => "utterance",
            ArtifactKind::Reply => "reply",
        }
    }
}

/// Registry of live artifacts in one directory
///
/// Cheap to clone; clones share the same registry and counters.
#[derive(Clone)]
pub struct ArtifactStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    dir: PathBuf,
    live: Mutex<HashMap<Uuid, ArtifactHandle>>,
    created: AtomicUsize,
    deleted: AtomicUsize,
}

impl ArtifactStore {
    /// Create a store rooted at `dir`, creating the directory if needed
    pub fn new(dir: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!("Artifact store at {}", dir.display());

        Ok(Self {
            inner: Arc::new(StoreInner {
                dir,
                live: Mutex::new(HashMap::new()),
                created: AtomicUsize::new(0),
                deleted: AtomicUsize::new(0),
            }),
        })
    }

    /// Create a store under the system temp directory
    pub fn in_temp_dir() -> io::Result<Self> {
        Self::new(std::env::temp_dir().join("wellspoken"))
    }

    /// Use the configured directory, or the temp directory when unset
    pub fn from_config(config: &crate::config::RecordingConfig) -> io::Result<Self> {
        match &config.artifact_dir {
            Some(dir) => Self::new(dir.clone()),
            None => Self::in_temp_dir(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Reserve a path for a new artifact and register it under `sequence`
    ///
    /// The file itself is created by the caller.
    pub fn allocate(
        &self,
        sequence: TurnSequenceId,
        kind: ArtifactKind,
        encoding: AudioEncoding,
    ) -> ArtifactHandle {
        let id = Uuid::new_v4();
        let filename = format!(
            "{}_{}_{}_{}.{}",
            kind.prefix(),
            sequence.0,
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            &id.simple().to_string()[..8],
            encoding.extension()
        );
        let handle = ArtifactHandle {
            id,
            path: self.inner.dir.join(filename),
            sequence,
        };

        self.inner.live.lock().insert(id, handle.clone());
        self.inner.created.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Allocated artifact {}", handle.path.display());
        handle
    }

    /// Allocate an artifact and write `bytes` to it
    ///
    /// On write failure the artifact is released before returning the error.
    pub fn persist(
        &self,
        sequence: TurnSequenceId,
        kind: ArtifactKind,
        encoding: AudioEncoding,
        bytes: &[u8],
    ) -> io::Result<ArtifactHandle> {
        let handle = self.allocate(sequence, kind, encoding);
        if let Err(e) = fs::write(&handle.path, bytes) {
            self.release(&handle);
            return Err(e);
        }
        Ok(handle)
    }

    /// Delete an artifact's file and unregister it
    ///
    /// Returns false if the handle was already released.
    pub fn release(&self, handle: &ArtifactHandle) -> bool {
        let removed = self.inner.live.lock().remove(&handle.id);
        match removed {
            Some(handle) => {
                self.delete_file(&handle);
                true
            }
            None => false,
        }
    }

    /// Release every artifact registered under `sequence`
    pub fn release_sequence(&self, sequence: TurnSequenceId) -> usize {
        let handles: Vec<ArtifactHandle> = {
            let mut live = self.inner.live.lock();
            let ids: Vec<Uuid> = live
                .values()
                .filter(|h| h.sequence == sequence)
                .map(|h| h.id)
                .collect();
            ids.iter().filter_map(|id| live.remove(id)).collect()
        };

        for handle in &handles {
            self.delete_file(handle);
        }

        if !handles.is_empty() {
            tracing::debug!(
                "Released {} artifact(s) for turn {}",
                handles.len(),
                sequence
            );
        }
        handles.len()
    }

    fn delete_file(&self, handle: &ArtifactHandle) {
        match fs::remove_file(&handle.path) {
            Ok(()) => {}
            // Allocated but never written (e.g. device failed to open)
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    "Failed to delete artifact {}: {}",
                    handle.path.display(),
                    e
                );
            }
        }
        self.inner.deleted.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of artifacts currently registered
    pub fn live_count(&self) -> usize {
        self.inner.live.lock().len()
    }

    /// Number of artifacts registered under `sequence`
    pub fn live_for(&self, sequence: TurnSequenceId) -> usize {
        self.inner
            .live
            .lock()
            .values()
            .filter(|h| h.sequence == sequence)
            .count()
    }

    /// Total artifacts ever allocated by this store
    pub fn created_count(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    /// Total artifacts released by this store
    pub fn deleted_count(&self) -> usize {
        self.inner.deleted.load(Ordering::SeqCst)
    }
}
