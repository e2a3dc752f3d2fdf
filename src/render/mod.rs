//! Stream composition: component in, page out.
//!
//! ```text
//! render(path, state, options)
//!   ├─ compiler.import(path)              (cached / coalesced)
//!   ├─ framework (plugins, installed once)
//!   ├─ engine.create_instance + meta      (blocking worker)
//!   └─ body ──► Scaffolded(head, tail) ──► page
//! ```

mod engine;
mod lua;
mod plugin;
pub mod transform;

pub use engine::{BodyStream, RenderContext, RenderEngine, RenderOptions};
pub use lua::{LuaEngine, LuaInstance};
pub use plugin::{Framework, ModulePlugin, Plugin, PluginRef};
pub use transform::Scaffolded;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::compiler::{Compiler, ErrorHook};
use crate::error::{Error, RenderError, Result};
use crate::meta::Scaffold;
use crate::utils::html::guard_raw_text;

/// Called once pre-compilation and plugin installation succeeded.
pub type ReadyHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct RendererOptions {
    /// Sources built in one batch by [`Renderer::init`].
    pub pre_compile: Vec<PathBuf>,
    pub plugins: Vec<PluginRef>,
    /// Modules applied to every component, in order. See [`Framework::add_mixin`].
    pub mixins: Vec<PathBuf>,
    /// Default for [`RenderOptions::inline_css`].
    pub inline_css: bool,
}

#[derive(Default, Clone)]
struct Hooks {
    ready: Option<ReadyHook>,
    error: Option<ErrorHook>,
}

/// Body plus the markup that goes around it.
struct Prepared<I> {
    instance: I,
    head: String,
    tail: String,
}

pub struct Renderer<E: RenderEngine = LuaEngine> {
    inner: Arc<Inner<E>>,
}

impl<E: RenderEngine> Clone for Renderer<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<E> {
    compiler: Compiler,
    engine: Arc<E>,
    options: RendererOptions,
    framework: OnceCell<Arc<Framework>>,
    hooks: RwLock<Hooks>,
}

impl<E: RenderEngine> Renderer<E> {
    pub fn new(compiler: Compiler, engine: E, options: RendererOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                compiler,
                engine: Arc::new(engine),
                options,
                framework: OnceCell::new(),
                hooks: RwLock::new(Hooks::default()),
            }),
        }
    }

    pub fn compiler(&self) -> &Compiler {
        &self.inner.compiler
    }

    pub fn options(&self) -> &RendererOptions {
        &self.inner.options
    }

    /// Render options carrying this renderer's defaults.
    pub fn default_options(&self) -> RenderOptions {
        RenderOptions {
            inline_css: self.inner.options.inline_css,
            ..RenderOptions::default()
        }
    }

    pub fn on_ready(&self, hook: ReadyHook) {
        self.inner.hooks.write().ready = Some(hook);
    }

    /// Handle render failures and the compiler's own (background watch
    /// builds, reloads) with one hook.
    pub fn on_error(&self, hook: ErrorHook) {
        self.inner.compiler.on_error(hook.clone());
        self.inner.hooks.write().error = Some(hook);
    }

    /// Pre-compile the configured sources, path plugins and mixins in one batch,
    /// install the plugins, then fire the ready hook. A failure goes to the
    /// error hook and is returned.
    pub async fn init(&self) -> Result<()> {
        let mut batch = self.inner.options.pre_compile.clone();
        batch.extend(self.inner.options.plugins.iter().filter_map(|p| match p {
            PluginRef::Path(path) => Some(path.clone()),
            PluginRef::Instance(_) => None,
        }));
        batch.extend(self.inner.options.mixins.iter().cloned());

        crate::debug!("render"; "pre-compiling {} sources", batch.len());
        let outcome = match self.inner.compiler.load(&batch).await {
            Ok(()) => self.framework().await.map(|_| ()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(()) => {
                let hook = self.inner.hooks.read().ready.clone();
                if let Some(hook) = hook {
                    hook();
                }
                Ok(())
            }
            Err(e) => {
                self.report_error(&e);
                Err(e)
            }
        }
    }

    /// The shared framework, with every configured plugin installed.
    /// Built on first use.
    pub async fn framework(&self) -> Result<Arc<Framework>> {
        self.inner
            .framework
            .get_or_try_init(|| async {
                let mut framework = Framework::default();
                for plugin in &self.inner.options.plugins {
                    match plugin {
                        PluginRef::Path(path) => {
                            let module = self.inner.compiler.import(path).await?;
                            framework.install(&ModulePlugin::from_module(&module)?);
                        }
                        PluginRef::Instance(plugin) => {
                            framework.install(plugin.as_ref());
                        }
                    }
                }
                for path in &self.inner.options.mixins {
                    framework.add_mixin(self.inner.compiler.import(path).await?);
                }
                crate::debug!(
                    "render";
                    "framework ready ({} plugins, {} mixins)",
                    framework.installed().len(),
                    framework.mixins().len()
                );
                Ok::<_, Error>(Arc::new(framework))
            })
            .await
            .cloned()
    }

    /// Render `path` as a stream of page chunks.
    ///
    /// Failures before the stream exists are returned; failures while
    /// streaming arrive as error items. Both are wrapped in `RenderError`
    /// and reported to the error hook.
    pub async fn render_to_stream(
        &self,
        path: &Path,
        state: Value,
        options: &RenderOptions,
    ) -> Result<BodyStream> {
        let prepared = match self.prepare(path, &state, options).await {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.fail(path, &state, e)),
        };

        let body = self.inner.engine.render_to_stream(prepared.instance);
        let body: BodyStream = if prepared.head.is_empty() && prepared.tail.is_empty() {
            body
        } else {
            Box::pin(Scaffolded::new(
                body,
                Bytes::from(prepared.head),
                Bytes::from(prepared.tail),
            ))
        };

        let renderer = self.clone();
        let component = path.to_path_buf();
        Ok(Box::pin(body.map(move |item| {
            item.map_err(|e| renderer.fail(&component, &state, e))
        })))
    }

    /// Render `path` to a complete page (or bare body with `plain`).
    pub async fn render_to_string(
        &self,
        path: &Path,
        state: Value,
        options: &RenderOptions,
    ) -> Result<String> {
        let rendered = async {
            let prepared = self.prepare(path, &state, options).await?;
            let body = self.inner.engine.render_to_string(prepared.instance).await?;
            Ok::<_, Error>(format!("{}{body}{}", prepared.head, prepared.tail))
        };
        rendered.await.map_err(|e| self.fail(path, &state, e))
    }

    async fn prepare(
        &self,
        path: &Path,
        state: &Value,
        options: &RenderOptions,
    ) -> Result<Prepared<E::Instance>> {
        let module = self.inner.compiler.import(path).await?;
        let framework = self.framework().await?;
        let context = RenderContext::new(state.clone(), options.url.clone());

        let engine = self.inner.engine.clone();
        let plain = options.plain;
        let component = path.to_path_buf();
        let shared = framework.clone();
        let (instance, component_meta) = tokio::task::spawn_blocking(move || {
            let instance = engine.create_instance(module, &context, &shared)?;
            let meta = if plain {
                None
            } else {
                Some(engine.meta(&instance)?)
            };
            Ok::<_, Error>((instance, meta))
        })
        .await
        .map_err(|e| RenderError::engine(&component, format!("render task failed: {e}")))??;

        let mut head = String::new();
        let mut tail = String::new();

        if let Some(component_meta) = component_meta {
            let meta = self
                .inner
                .compiler
                .meta()
                .merge(framework.meta())
                .merge(&component_meta);
            let scaffold = Scaffold::from_meta(&meta);
            head = scaffold.head;
            tail = scaffold.tail;
        }

        if options.inline_css {
            let css = self.inner.compiler.compiled_css();
            head.push_str(&format!(
                "<style type=\"text/css\">{}</style>",
                guard_raw_text(&css, "style")
            ));
        }

        Ok(Prepared {
            instance,
            head,
            tail,
        })
    }

    /// Wrap `error` for `path`, report it, and hand it back.
    fn fail(&self, path: &Path, state: &Value, error: Error) -> Error {
        let error = RenderError::wrap(path, state, error);
        self.report_error(&error);
        error
    }

    pub(crate) fn report_error(&self, error: &Error) {
        let hook = self.inner.hooks.read().error.clone();
        match hook {
            Some(hook) => hook(error),
            None => crate::log!("error"; "{}", error),
        }
    }
}

#[cfg(test)]
mod tests;
