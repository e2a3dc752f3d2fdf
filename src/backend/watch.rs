//! Continuous builds.
//!
//! A session builds its entry set once, then rebuilds the same set whenever
//! one of the entries changes on disk.
//!
//! ```text
//! notify ──Signal::Fs──► session thread ──► Debouncer ──► backend.build
//!                              ▲                               │
//! WatchHandle ──Signal::Stop───┘              listener ◄── WatchEvent
//! ```
//!
//! The watcher is created before the initial build so that an edit made
//! while the first build runs still triggers a rebuild.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use super::debouncer::Debouncer;
use super::{BuildBackend, BuildReport, BuildRequest};
use crate::error::{BuildError, Error};
use crate::sink::SinkFs;

/// Progress of a watch session, delivered to the session listener.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A build of the entry set began. Generation 1 is the initial build.
    Started { generation: u64 },
    Completed {
        generation: u64,
        result: Result<BuildReport, BuildError>,
    },
}

enum Signal {
    Fs(notify::Event),
    Stop,
}

/// Owner of a running session. Dropping it stops the session without
/// waiting for an in-progress build.
pub struct WatchHandle {
    tx: Sender<Signal>,
    thread: Option<JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop the session. With `flush` this blocks until the session thread
    /// has finished its current build and exited.
    pub fn close(mut self, flush: bool) {
        let _ = self.tx.send(Signal::Stop);
        if let Some(thread) = self.thread.take()
            && flush
            && thread.join().is_err()
        {
            crate::log!("watch"; "session thread panicked");
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.tx.send(Signal::Stop);
    }
}

/// Start a watch session for `request`.
pub fn spawn<F>(
    backend: Arc<dyn BuildBackend>,
    request: BuildRequest,
    sink: Arc<dyn SinkFs>,
    listener: F,
) -> Result<WatchHandle, Error>
where
    F: Fn(WatchEvent) + Send + 'static,
{
    let (tx, rx) = channel::unbounded();

    let notify_tx = tx.clone();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| match res {
        Ok(event) => {
            let _ = notify_tx.send(Signal::Fs(event));
        }
        Err(e) => crate::log!("watch"; "notify error: {}", e),
    })
    .map_err(|e| Error::io("start watcher", std::io::Error::other(e)))?;

    // Skip missing roots so a deleted directory does not abort the session
    for root in backend.watch_roots(&request) {
        if root.exists() {
            watcher
                .watch(&root, RecursiveMode::NonRecursive)
                .map_err(|e| Error::io(format!("watch {}", root.display()), std::io::Error::other(e)))?;
        }
    }

    let entries: FxHashSet<PathBuf> = request.sources().map(PathBuf::from).collect();

    let thread = std::thread::Builder::new()
        .name("pronto-watch".into())
        .spawn(move || {
            let _watcher = watcher;
            let mut debouncer = Debouncer::new();
            let mut generation = 0;

            let run = |generation: u64| {
                listener(WatchEvent::Started { generation });
                let result = backend.build(&request, sink.as_ref());
                listener(WatchEvent::Completed { generation, result });
            };

            generation += 1;
            run(generation);

            loop {
                match rx.recv_timeout(debouncer.sleep_duration()) {
                    Ok(Signal::Fs(event)) => debouncer.add_event(&event),
                    Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let Some(changes) = debouncer.take_if_ready() else {
                            continue;
                        };
                        let touched: Vec<_> = changes
                            .iter()
                            .filter(|(path, _)| entries.contains(*path))
                            .collect();
                        if touched.is_empty() {
                            continue;
                        }
                        for (path, kind) in &touched {
                            crate::debug!("watch"; "{}: {}", kind.label(), path.display());
                        }
                        generation += 1;
                        run(generation);
                    }
                }
            }
            crate::debug!("watch"; "session closed after {} builds", generation);
        })
        .map_err(|e| Error::io("spawn watch thread", e))?;

    Ok(WatchHandle {
        tx,
        thread: Some(thread),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MemoryFs;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Counting(AtomicUsize);

    impl BuildBackend for Counting {
        fn build(&self, _: &BuildRequest, _: &dyn SinkFs) -> Result<BuildReport, BuildError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(BuildReport::default())
        }
    }

    #[test]
    fn test_initial_build_then_close() {
        let dir = tempfile::TempDir::new().unwrap();
        let entry = dir.path().join("a.view");
        std::fs::write(&entry, "<script>return {}</script>").unwrap();

        let backend = Arc::new(Counting(AtomicUsize::new(0)));
        let request = BuildRequest::new(&[entry], Path::new("/out")).unwrap();
        let (events_tx, events_rx) = channel::unbounded();

        let handle = spawn(
            backend.clone(),
            request,
            Arc::new(MemoryFs::new()),
            move |event| {
                let _ = events_tx.send(event);
            },
        )
        .unwrap();

        let started = events_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(started, WatchEvent::Started { generation: 1 }));
        let completed = events_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            completed,
            WatchEvent::Completed { generation: 1, result: Ok(_) }
        ));

        handle.close(true);
        assert_eq!(backend.0.load(Ordering::SeqCst), 1);
    }
}
