//! Artifact cache with single-flight coalescing.
//!
//! A source path is in exactly one of three states:
//!
//! ```text
//! absent ──acquire/reserve──► pending (waiters) ──fulfil──► cached
//!   ▲                              │                          │
//!   └───────────reject─────────────┘◄─────invalidate──────────┘
//! ```
//!
//! Both maps sit behind one lock, so the check-then-act sequence of an
//! import (hit? join? lead?) is atomic and a path can never be pending and
//! cached at the same time.

mod artifact;

pub use artifact::Artifact;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;

use crate::error::Error;
use crate::loader::Module;

/// Outcome delivered to every waiter of one build.
pub type Outcome = Result<Arc<Module>, Error>;

type Waiter = oneshot::Sender<Outcome>;

/// What an import should do next.
#[derive(Debug)]
pub enum Acquire {
    /// Cached module, no build needed.
    Hit(Arc<Module>),
    /// A build is already in flight; await its outcome.
    Join(oneshot::Receiver<Outcome>),
    /// A new queue was created; the caller must start the build.
    Lead(oneshot::Receiver<Outcome>),
}

#[derive(Default)]
struct State {
    artifacts: FxHashMap<PathBuf, Artifact>,
    pending: FxHashMap<PathBuf, Vec<Waiter>>,
}

/// Process-lifetime map of source paths to loaded modules, plus the waiter
/// queues of in-flight builds.
#[derive(Default)]
pub struct ArtifactCache {
    state: Mutex<State>,
}

impl ArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide atomically whether `path` is served from cache, joins an
    /// in-flight build, or leads a new one.
    ///
    /// With `use_cache` off an existing artifact is dropped and rebuilt, but
    /// concurrent imports still coalesce on one build.
    pub fn acquire(&self, path: &Path, use_cache: bool) -> Acquire {
        let mut state = self.state.lock();

        if use_cache && let Some(artifact) = state.artifacts.get(path) {
            return Acquire::Hit(artifact.module.clone());
        }

        let (tx, rx) = oneshot::channel();
        if let Some(waiters) = state.pending.get_mut(path) {
            waiters.push(tx);
            return Acquire::Join(rx);
        }

        state.artifacts.remove(path);
        state.pending.insert(path.to_path_buf(), vec![tx]);
        Acquire::Lead(rx)
    }

    /// Make sure a waiter queue exists for every path of a batch.
    ///
    /// Reserving a cached path evicts its artifact: the batch is about to
    /// replace it.
    pub fn reserve(&self, paths: &[PathBuf]) {
        let mut state = self.state.lock();
        for path in paths {
            state.artifacts.remove(path);
            state.pending.entry(path.clone()).or_default();
        }
    }

    /// Store the artifact and resolve every waiter on `path` with it.
    pub fn fulfil(&self, path: &Path, artifact: Artifact) {
        let module = artifact.module.clone();
        let waiters = {
            let mut state = self.state.lock();
            let waiters = state.pending.remove(path).unwrap_or_default();
            state.artifacts.insert(path.to_path_buf(), artifact);
            waiters
        };
        crate::debug!("cache"; "{} ready ({} waiters)", path.display(), waiters.len());
        for tx in waiters {
            let _ = tx.send(Ok(module.clone()));
        }
    }

    /// Reject every waiter on `path` and clear its queue.
    pub fn reject(&self, path: &Path, error: &Error) {
        let waiters = self.state.lock().pending.remove(path).unwrap_or_default();
        for tx in waiters {
            let _ = tx.send(Err(error.clone()));
        }
    }

    pub fn get(&self, path: &Path) -> Option<Artifact> {
        self.state.lock().artifacts.get(path).cloned()
    }

    /// Insert an artifact directly. Refused while a build for `path` is in
    /// flight; returns whether it was stored.
    pub fn put(&self, path: &Path, artifact: Artifact) -> bool {
        let mut state = self.state.lock();
        if state.pending.contains_key(path) {
            return false;
        }
        state.artifacts.insert(path.to_path_buf(), artifact);
        true
    }

    /// Swap in a rebuilt artifact, only if `path` is currently cached.
    pub fn replace(&self, path: &Path, artifact: Artifact) -> bool {
        let mut state = self.state.lock();
        match state.artifacts.get_mut(path) {
            Some(slot) => {
                *slot = artifact;
                true
            }
            None => false,
        }
    }

    pub fn invalidate(&self, path: &Path) -> Option<Artifact> {
        self.state.lock().artifacts.remove(path)
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.state.lock().artifacts.contains_key(path)
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.state.lock().pending.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.state.lock().artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
