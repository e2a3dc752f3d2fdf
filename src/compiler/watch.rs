//! Watch sessions owned by the compiler.
//!
//! One session runs at a time, keyed by its sorted entry set. The session
//! thread publishes its progress into a `tokio::sync::watch` channel; a
//! compile of the same set waits there until the session has settled and
//! reuses that outcome.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use tokio::sync::watch as state;

use super::{Compiler, Inner, WatchReport};
use crate::backend::{self, BuildReport, BuildRequest, WatchEvent, WatchHandle};
use crate::error::{BuildError, Error, Result};

pub(super) struct WatchSession {
    key: Vec<PathBuf>,
    handle: WatchHandle,
    state: state::Receiver<SessionState>,
}

#[derive(Debug, Default)]
struct SessionState {
    generation: u64,
    building: bool,
    last: Option<Result<BuildReport, BuildError>>,
}

impl SessionState {
    fn is_settled(&self) -> bool {
        !self.building && self.last.is_some()
    }
}

impl Compiler {
    /// Build `request` through the watch session for its entry set.
    pub(super) async fn watch_compile(&self, request: BuildRequest) -> Result<BuildReport> {
        let key = request.entry_set();

        let mut rx = {
            let mut session = self.inner.session.lock().await;
            let reuse = session
                .as_ref()
                .filter(|active| active.key == key)
                .map(|active| active.state.clone());
            match reuse {
                Some(rx) => rx,
                None => {
                    if let Some(previous) = session.take() {
                        self.close_session(previous).await;
                    }
                    let started = self.start_session(request)?;
                    let rx = started.state.clone();
                    *session = Some(started);
                    rx
                }
            }
        };

        let last = {
            let settled = rx
                .wait_for(SessionState::is_settled)
                .await
                .map_err(|_| BuildError::new("watch session closed"))?;
            crate::debug!("watch"; "using build #{}", settled.generation);
            settled.last.clone()
        };
        let last = last.ok_or_else(|| BuildError::new("watch session closed"))?;
        Ok(last?)
    }

    /// Stop the active session, if any.
    pub async fn close(&self) {
        let session = self.inner.session.lock().await.take();
        if let Some(session) = session {
            self.close_session(session).await;
        }
    }

    /// Entry set of the active session.
    pub async fn watched_entries(&self) -> Option<Vec<PathBuf>> {
        self.inner.session.lock().await.as_ref().map(|s| s.key.clone())
    }

    fn start_session(&self, request: BuildRequest) -> Result<WatchSession> {
        let key = request.entry_set();
        let (tx, rx) = state::channel(SessionState::default());
        let compiler: Weak<Inner> = Arc::downgrade(&self.inner);
        let batch = request.clone();

        crate::debug!("watch"; "starting session for {} entries", key.len());
        let handle = backend::watch::spawn(
            self.inner.backend.clone(),
            request,
            self.inner.sink.clone(),
            move |event| match event {
                WatchEvent::Started { generation } => tx.send_modify(|s| {
                    s.generation = generation;
                    s.building = true;
                }),
                WatchEvent::Completed { generation, result } => {
                    if let Some(inner) = compiler.upgrade() {
                        Compiler { inner }.settle(&batch, generation, &result);
                    }
                    tx.send_modify(|s| {
                        s.building = false;
                        s.last = Some(result);
                    });
                }
            },
        )?;

        Ok(WatchSession {
            key,
            handle,
            state: rx,
        })
    }

    /// Close `session`: flush (wait for its thread) when cleanup is on,
    /// otherwise detach it.
    async fn close_session(&self, session: WatchSession) {
        crate::debug!("watch"; "closing session for {} entries", session.key.len());
        if self.inner.options.watch_cleanup {
            let handle = session.handle;
            if let Err(e) = tokio::task::spawn_blocking(move || handle.close(true)).await {
                crate::log!("watch"; "failed to close session: {}", e);
            }
        } else {
            session.handle.close(false);
        }
    }

    /// Completion of a session build, on the session thread.
    ///
    /// The initial build is settled by the `load` that started the session;
    /// later ones refresh the style side channel and every cached entry
    /// before the watch hook hears about them.
    fn settle(
        &self,
        request: &BuildRequest,
        generation: u64,
        result: &Result<BuildReport, BuildError>,
    ) {
        if generation > 1 {
            self.refresh(request, result);
        }
        self.report_watch(&WatchReport::new(generation, request.len(), result));
    }

    /// Swap in the artifacts of a background build. A failed build keeps the
    /// previous ones.
    fn refresh(&self, request: &BuildRequest, result: &Result<BuildReport, BuildError>) {
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                self.report_error(&Error::Build(e.clone()));
                return;
            }
        };

        let stylesheet = self.absorb_styles(report);
        for path in request.sources() {
            if !self.inner.cache.is_cached(path) {
                continue;
            }
            match self.load_artifact(path, request, report, stylesheet.clone()) {
                Ok(artifact) => {
                    self.inner.cache.replace(path, artifact);
                    crate::debug!("watch"; "reloaded {}", path.display());
                }
                Err(e) => self.report_error(&e),
            }
        }
    }
}
