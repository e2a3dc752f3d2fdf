//! Build orchestration: source path in, loaded module out.
//!
//! ```text
//! import(p) ──► ArtifactCache::acquire
//!                 ├─ Hit  ─────────────────────────────────────► module
//!                 ├─ Join ──────────── await outcome ──────────► module
//!                 └─ Lead ──► load([p]) ──► backend ──► loader ─► fulfil
//! ```
//!
//! `load` is also the batch entry point used for pre-compilation: the whole
//! batch goes to the backend in one call and every reserved waiter is
//! settled on every exit path.

mod style;
mod watch;


use std::path::{Path, PathBuf};
use std::sync::Arc;

use jwalk::WalkDir;
use parking_lot::RwLock;
use rustc_hash::FxHashSet;

use crate::backend::{BuildBackend, BuildReport, BuildRequest, entry_name};
use crate::cache::{Acquire, Artifact, ArtifactCache};
use crate::error::{BuildError, Diagnostic, Error, LoadError, Result};
use crate::loader::{Module, ModuleLoader};
use crate::meta::MetaInfo;
use crate::sink::SinkFs;
use crate::utils::path::normalize_path;

use style::StyleState;
use watch::WatchSession;

/// Called after every watch build, including background rebuilds.
pub type WatchHook = Arc<dyn Fn(&WatchReport) + Send + Sync>;

/// Called with errors that have no caller to propagate to.
pub type ErrorHook = Arc<dyn Fn(&Error) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Keep a backend session running and rebuild on change.
    pub watch: bool,
    /// Wait for a replaced watch session to exit before starting the next.
    pub watch_cleanup: bool,
    /// Serve repeated imports from the artifact cache.
    pub cache: bool,
    /// Publish the stylesheet to `public_path` and link it, instead of
    /// inlining it.
    pub extract_css: bool,
    /// Backend output directory inside the sink.
    pub output_path: PathBuf,
    /// Stylesheet location relative to `public_path`.
    pub css_output_path: PathBuf,
    pub public_path: PathBuf,
    /// Initial global metadata.
    pub meta: MetaInfo,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            watch: false,
            watch_cleanup: true,
            cache: true,
            extract_css: true,
            output_path: PathBuf::from("/tmp/pronto_ssr"),
            css_output_path: PathBuf::from("css/style.css"),
            public_path: PathBuf::from("./public"),
            meta: MetaInfo::default(),
        }
    }
}

/// Summary of one watch build.
#[derive(Debug, Clone)]
pub struct WatchReport {
    pub generation: u64,
    pub entries: usize,
    pub diagnostics: Vec<Diagnostic>,
    pub error: Option<BuildError>,
}

impl WatchReport {
    fn new(generation: u64, entries: usize, result: &Result<BuildReport, BuildError>) -> Self {
        let (diagnostics, error) = match result {
            Ok(report) => (report.diagnostics.clone(), None),
            Err(e) => (e.diagnostics.clone(), Some(e.clone())),
        };
        Self {
            generation,
            entries,
            diagnostics,
            error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Default, Clone)]
struct Hooks {
    watch: Option<WatchHook>,
    error: Option<ErrorHook>,
}

/// A built batch: the request and what the backend reported.
struct Build {
    request: BuildRequest,
    report: BuildReport,
}

/// The build orchestrator. Cheap to clone.
#[derive(Clone)]
pub struct Compiler {
    inner: Arc<Inner>,
}

struct Inner {
    options: CompilerOptions,
    backend: Arc<dyn BuildBackend>,
    sink: Arc<dyn SinkFs>,
    loader: ModuleLoader,
    cache: Arc<ArtifactCache>,
    style: StyleState,
    session: tokio::sync::Mutex<Option<WatchSession>>,
    hooks: RwLock<Hooks>,
}

impl Compiler {
    pub fn new(
        backend: Arc<dyn BuildBackend>,
        sink: Arc<dyn SinkFs>,
        loader: ModuleLoader,
        cache: Arc<ArtifactCache>,
        options: CompilerOptions,
    ) -> Self {
        let style = StyleState::new(options.meta.clone());
        Self {
            inner: Arc::new(Inner {
                options,
                backend,
                sink,
                loader,
                cache,
                style,
                session: tokio::sync::Mutex::new(None),
                hooks: RwLock::new(Hooks::default()),
            }),
        }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.inner.options
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.inner.cache
    }

    pub fn on_watch(&self, hook: WatchHook) {
        self.inner.hooks.write().watch = Some(hook);
    }

    pub fn on_error(&self, hook: ErrorHook) {
        self.inner.hooks.write().error = Some(hook);
    }

    /// Resolve `path` to its loaded module, building it at most once no
    /// matter how many imports arrive while the build is in flight.
    pub async fn import(&self, path: &Path) -> Result<Arc<Module>> {
        let path = normalize_path(path);
        let rx = match self.inner.cache.acquire(&path, self.inner.options.cache) {
            Acquire::Hit(module) => {
                crate::debug!("cache"; "hit: {}", path.display());
                return Ok(module);
            }
            Acquire::Join(rx) => rx,
            Acquire::Lead(rx) => {
                // The outcome reaches us through `rx` like every other waiter
                let _ = self.load(std::slice::from_ref(&path)).await;
                rx
            }
        };
        rx.await
            .unwrap_or_else(|_| Err(BuildError::new("build abandoned").into()))
    }

    /// Build `paths` as one batch and settle every waiter registered on them.
    ///
    /// A backend failure rejects every path of the batch. After a successful
    /// build, a path whose artifact fails to load rejects only its own
    /// waiters; the first such error is returned.
    pub async fn load(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        let mut seen = FxHashSet::default();
        let paths: Vec<PathBuf> = paths
            .iter()
            .map(|p| normalize_path(p))
            .filter(|p| seen.insert(p.clone()))
            .collect();

        self.inner.cache.reserve(&paths);

        let build = match self.compile(&paths).await {
            Ok(build) => build,
            Err(err) => {
                for path in &paths {
                    self.inner.cache.reject(path, &err);
                }
                return Err(err);
            }
        };

        let stylesheet = self.absorb_styles(&build.report);

        let mut first_error = None;
        for path in &paths {
            match self.load_artifact(path, &build.request, &build.report, stylesheet.clone()) {
                Ok(artifact) => self.inner.cache.fulfil(path, artifact),
                Err(err) => {
                    self.inner.cache.reject(path, &err);
                    first_error.get_or_insert(err);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Run the backend over `paths`, one-shot or through the watch session.
    async fn compile(&self, paths: &[PathBuf]) -> Result<Build> {
        let request = BuildRequest::new(paths, &self.inner.options.output_path)?;

        if self.inner.options.watch {
            let report = self.watch_compile(request.clone()).await?;
            return Ok(Build { request, report });
        }

        let backend = self.inner.backend.clone();
        let sink = self.inner.sink.clone();
        let batch = request.clone();
        crate::debug!("build"; "building {} entries", batch.len());
        let report = tokio::task::spawn_blocking(move || backend.build(&batch, sink.as_ref()))
            .await
            .map_err(|e| BuildError::new(format!("build task failed: {e}")))??;

        for diagnostic in &report.diagnostics {
            crate::log!("build"; "{}", diagnostic);
        }
        Ok(Build { request, report })
    }

    /// Read one entry's artifact from the sink and evaluate it.
    fn load_artifact(
        &self,
        path: &Path,
        request: &BuildRequest,
        report: &BuildReport,
        stylesheet: Option<Arc<str>>,
    ) -> Result<Artifact> {
        let name = entry_name(path);
        let target = report
            .artifact(&name)
            .map_or_else(|| request.artifact_path(&name), Path::to_path_buf);
        let source = self.inner.sink.read(&target).map_err(|e| {
            LoadError::new(path, format!("artifact {}: {e}", target.display()))
        })?;
        let module = self.inner.loader.load(path, &source)?;
        Ok(Artifact::new(module, stylesheet))
    }

    fn absorb_styles(&self, report: &BuildReport) -> Option<Arc<str>> {
        self.inner
            .style
            .absorb(&self.inner.options, self.inner.sink.as_ref(), report)
    }

    pub fn invalidate(&self, path: &Path) -> bool {
        self.inner.cache.invalidate(&normalize_path(path)).is_some()
    }

    pub fn is_cached(&self, path: &Path) -> bool {
        self.inner.cache.is_cached(&normalize_path(path))
    }

    /// Stylesheet text of the last batch that produced one.
    pub fn compiled_css(&self) -> Arc<String> {
        self.inner.style.css()
    }

    /// Global metadata, including the stylesheet link or inline style.
    pub fn meta(&self) -> Arc<MetaInfo> {
        self.inner.style.meta()
    }

    pub(crate) fn report_error(&self, error: &Error) {
        let hook = self.inner.hooks.read().error.clone();
        match hook {
            Some(hook) => hook(error),
            None => crate::log!("error"; "{}", error),
        }
    }

    fn report_watch(&self, report: &WatchReport) {
        let hook = self.inner.hooks.read().watch.clone();
        if let Some(hook) = hook {
            hook(report);
            return;
        }
        match &report.error {
            None => crate::logger::status_success(&format!(
                "built {} entries (#{})",
                report.entries, report.generation
            )),
            Some(e) => {
                let detail: Vec<String> = e.diagnostics.iter().map(ToString::to_string).collect();
                crate::logger::status_error(&e.to_string(), &detail.join("\n"));
            }
        }
    }
}

/// Every file under `dir` whose extension is one of `extensions`.
pub fn collect_sources(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let mut sources: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path())
        .filter(|p| {
            p.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|e| e == ext))
        })
        .collect();
    sources.sort();
    sources
}
