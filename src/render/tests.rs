use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::stream;
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use super::*;
use crate::backend::LuaBackend;
use crate::cache::ArtifactCache;
use crate::compiler::CompilerOptions;
use crate::error::ErrorKind;
use crate::loader::{Module, ModuleLoader};
use crate::meta::MetaInfo;
use crate::sink::MemoryFs;

const PAGE: &str = r#"
<script>
return {
  data = function() return { greeting = "Hello" } end,
  meta = function(vm) return { title = vm.greeting .. " page" } end,
  render = function(vm, emit)
    emit("<h1>" .. pronto.escape(vm.greeting .. ", " .. (vm.user or "nobody")) .. "</h1>")
    if vm.plugin_flag then emit("<p>plugin</p>") end
  end,
}
</script>
<style>h1 { color: teal; }</style>
"#;

struct Site {
    dir: TempDir,
    public: PathBuf,
}

impl Site {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let public = dir.path().join("public");
        Self { dir, public }
    }

    fn view(&self, name: &str, source: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, source).unwrap();
        path
    }

    fn compiler(&self, configure: impl FnOnce(&mut CompilerOptions)) -> Compiler {
        let mut options = CompilerOptions {
            public_path: self.public.clone(),
            output_path: PathBuf::from("/out"),
            ..CompilerOptions::default()
        };
        configure(&mut options);
        Compiler::new(
            Arc::new(LuaBackend),
            Arc::new(MemoryFs::new()),
            ModuleLoader::default(),
            Arc::new(ArtifactCache::new()),
            options,
        )
    }

    fn renderer(&self, options: RendererOptions) -> Renderer {
        let renderer = Renderer::new(self.compiler(|_| {}), LuaEngine, options);
        renderer.on_error(Arc::new(|_: &Error| {}));
        renderer
    }
}

async fn collect(stream: BodyStream) -> Result<String> {
    let chunks: Vec<_> = stream.collect().await;
    let mut out = String::new();
    for chunk in chunks {
        out.push_str(std::str::from_utf8(&chunk?).unwrap());
    }
    Ok(out)
}

#[tokio::test]
async fn test_render_to_string_full_page() {
    let site = Site::new();
    let page = site.view("index.view", PAGE);
    let renderer = site.renderer(RendererOptions::default());

    let html = renderer
        .render_to_string(&page, json!({"user": "<ada>"}), &RenderOptions::default())
        .await
        .unwrap();

    assert!(html.starts_with("<!DOCTYPE html>\n<html >\n<head>\n"));
    assert!(html.contains("<title>Hello page</title>"));
    assert!(html.contains("<link href=\"/css/style.css\" rel=\"stylesheet\">"));
    assert!(html.contains("<h1>Hello, &lt;ada&gt;</h1>"));
    assert!(html.ends_with("\n</body>\n</html>"));
    assert!(site.public.join("css/style.css").exists());
}

#[tokio::test]
async fn test_stream_matches_string() {
    let site = Site::new();
    let page = site.view("index.view", PAGE);
    let renderer = site.renderer(RendererOptions::default());
    let options = RenderOptions::default();

    let streamed = collect(
        renderer
            .render_to_stream(&page, json!({"user": "x"}), &options)
            .await
            .unwrap(),
    )
    .await
    .unwrap();
    let string = renderer
        .render_to_string(&page, json!({"user": "x"}), &options)
        .await
        .unwrap();
    assert_eq!(streamed, string);
}

#[tokio::test]
async fn test_plain_is_body_only() {
    let site = Site::new();
    let page = site.view("index.view", PAGE);
    let renderer = site.renderer(RendererOptions::default());
    let options = RenderOptions {
        plain: true,
        ..RenderOptions::default()
    };

    let html = renderer
        .render_to_string(&page, json!({"user": "x"}), &options)
        .await
        .unwrap();
    assert_eq!(html, "<h1>Hello, x</h1>");

    let streamed = collect(renderer.render_to_stream(&page, json!({"user": "x"}), &options).await.unwrap())
        .await
        .unwrap();
    assert_eq!(streamed, "<h1>Hello, x</h1>");
}

#[tokio::test]
async fn test_inline_css_prefixes_body() {
    let site = Site::new();
    let page = site.view("index.view", PAGE);
    let renderer = site.renderer(RendererOptions::default());
    let options = RenderOptions {
        plain: true,
        inline_css: true,
        ..RenderOptions::default()
    };

    let html = renderer
        .render_to_string(&page, json!({}), &options)
        .await
        .unwrap();
    assert!(html.starts_with("<style type=\"text/css\">"));
    assert!(html.contains("h1 { color: teal; }"));
    assert!(html.ends_with("<h1>Hello, nobody</h1>"));
}

#[tokio::test]
async fn test_missing_view_is_render_error() {
    let site = Site::new();
    let renderer = site.renderer(RendererOptions::default());
    let reported = Arc::new(AtomicUsize::new(0));
    let counter = reported.clone();
    renderer.on_error(Arc::new(move |_: &Error| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let missing = site.dir.path().join("missing.view");
    let err = renderer
        .render_to_string(&missing, json!({"id": 7}), &RenderOptions::default())
        .await
        .unwrap_err();

    let Error::Render(render) = &err else {
        panic!("expected render error, got {err:?}");
    };
    assert!(render.component.ends_with("missing.view"));
    assert_eq!(render.state, json!({"id": 7}));
    assert_eq!(render.cause.as_ref().map(|c| c.kind()), Some(ErrorKind::Build));
    assert_eq!(reported.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_error_hook_covers_compiler_errors() {
    let site = Site::new();
    let renderer = site.renderer(RendererOptions::default());
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    renderer.on_error(Arc::new(move |e: &Error| sink.lock().push(e.kind())));

    // What a failed background rebuild reports
    let background = Error::Build(crate::error::BuildError::new("rebuild failed"));
    renderer.compiler().report_error(&background);
    assert_eq!(errors.lock().as_slice(), &[ErrorKind::Build]);
}

#[tokio::test]
async fn test_mid_stream_error_is_wrapped() {
    let site = Site::new();
    let page = site.view(
        "broken.view",
        "<script>return { render = function(vm, emit) emit('a') error('kaput') end }</script>",
    );
    let renderer = site.renderer(RendererOptions::default());

    let err = collect(
        renderer
            .render_to_stream(&page, json!({"k": 1}), &RenderOptions::default())
            .await
            .unwrap(),
    )
    .await
    .unwrap_err();
    let Error::Render(render) = err else {
        panic!("expected render error");
    };
    assert_eq!(render.state, json!({"k": 1}));
    assert!(render.message.contains("kaput"));
}

struct Flag(AtomicUsize);

impl Plugin for Flag {
    fn name(&self) -> &str {
        "flag"
    }

    fn install(&self, framework: &mut Framework) {
        self.0.fetch_add(1, Ordering::SeqCst);
        let mut state = serde_json::Map::new();
        state.insert("plugin_flag".into(), json!(true));
        framework.extend_state(&state);
    }
}

#[tokio::test]
async fn test_plugins_installed_once() {
    let site = Site::new();
    let page = site.view("index.view", PAGE);
    let plugin_path = site.view(
        "seo.lua",
        "return { name = 'seo', meta = { meta = { { name = 'robots', content = 'all' } } } }",
    );
    let flag = Arc::new(Flag(AtomicUsize::new(0)));
    let renderer = site.renderer(RendererOptions {
        plugins: vec![
            PluginRef::Path(plugin_path),
            PluginRef::Instance(flag.clone()),
            PluginRef::Instance(flag.clone()),
        ],
        ..RendererOptions::default()
    });

    let options = RenderOptions::default();
    let renders = futures::future::join_all(
        (0..4).map(|_| renderer.render_to_string(&page, json!({}), &options)),
    )
    .await;

    for html in renders {
        let html = html.unwrap();
        assert!(html.contains("<p>plugin</p>"));
        assert!(html.contains("<meta name=\"robots\" content=\"all\">"));
    }
    assert_eq!(flag.0.load(Ordering::SeqCst), 1);
    let framework = renderer.framework().await.unwrap();
    assert_eq!(framework.installed(), ["seo".to_string(), "flag".to_string()]);
}

#[tokio::test]
async fn test_mixins_apply_to_every_view() {
    let site = Site::new();
    let page = site.view("index.view", PAGE);
    let bare = site.view("bare.view", "<script>return { data = { user = 'Bo' } }</script>");
    let mixin = site.view(
        "guest.lua",
        "return { data = { user = 'guest' }, render = function(vm) return 'mixed ' .. vm.user end }",
    );
    let renderer = site.renderer(RendererOptions {
        mixins: vec![mixin.clone()],
        ..RendererOptions::default()
    });
    renderer.init().await.unwrap();
    assert!(renderer.compiler().is_cached(&mixin));

    let options = RenderOptions {
        plain: true,
        ..RenderOptions::default()
    };
    let html = renderer.render_to_string(&page, json!({}), &options).await.unwrap();
    assert_eq!(html, "<h1>Hello, guest</h1>");
    let html = renderer.render_to_string(&bare, json!({}), &options).await.unwrap();
    assert_eq!(html, "mixed Bo");
    assert_eq!(renderer.framework().await.unwrap().mixins().len(), 1);
}

#[tokio::test]
async fn test_init_precompiles_and_fires_ready() {
    let site = Site::new();
    let page = site.view("index.view", PAGE);
    let renderer = site.renderer(RendererOptions {
        pre_compile: vec![page.clone()],
        ..RendererOptions::default()
    });
    let ready = Arc::new(AtomicUsize::new(0));
    let counter = ready.clone();
    renderer.on_ready(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    renderer.init().await.unwrap();
    assert_eq!(ready.load(Ordering::SeqCst), 1);
    assert!(renderer.compiler().is_cached(&page));
}

#[tokio::test]
async fn test_init_failure_fires_error() {
    let site = Site::new();
    let broken = site.view("broken.view", "<script>return {</script>");
    let renderer = site.renderer(RendererOptions {
        pre_compile: vec![broken],
        ..RendererOptions::default()
    });
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = errors.clone();
    renderer.on_error(Arc::new(move |e: &Error| sink.lock().push(e.kind())));
    renderer.on_ready(Arc::new(|| panic!("ready after failure")));

    assert!(renderer.init().await.is_err());
    assert_eq!(errors.lock().as_slice(), &[ErrorKind::Build]);
}

// =============================================================================
// Composition with a fixed-body engine
// =============================================================================

struct StaticEngine(&'static [&'static str]);

impl RenderEngine for StaticEngine {
    type Instance = ();

    fn create_instance(&self, _: Arc<Module>, _: &RenderContext, _: &Framework) -> Result<()> {
        Ok(())
    }

    fn meta(&self, _: &()) -> Result<MetaInfo> {
        Ok(MetaInfo::default())
    }

    fn render_to_stream(&self, _: ()) -> BodyStream {
        let chunks: Vec<_> = self.0.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        Box::pin(stream::iter(chunks))
    }

    async fn render_to_string(&self, _: ()) -> Result<String> {
        Ok(self.0.concat())
    }
}

#[tokio::test]
async fn test_stream_is_head_body_tail() {
    let site = Site::new();
    let page = site.view("a.view", "<script>return {}</script>");
    let renderer = Renderer::new(
        site.compiler(|_| {}),
        StaticEngine(&["<div>A</div>"]),
        RendererOptions::default(),
    );

    let stream = renderer
        .render_to_stream(&page, json!({}), &RenderOptions::default())
        .await
        .unwrap();
    let chunks: Vec<String> = stream
        .map(|c| String::from_utf8(c.unwrap().to_vec()).unwrap())
        .collect()
        .await;

    let scaffold = Scaffold::from_meta(&MetaInfo::default());
    assert_eq!(chunks, vec![scaffold.head, "<div>A</div>".to_string(), scaffold.tail]);
}

#[tokio::test]
async fn test_empty_body_still_scaffolded() {
    let site = Site::new();
    let page = site.view("a.view", "<script>return {}</script>");
    let renderer = Renderer::new(site.compiler(|_| {}), StaticEngine(&[]), RendererOptions::default());

    let page_html = collect(
        renderer
            .render_to_stream(&page, json!({}), &RenderOptions::default())
            .await
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(page_html, Scaffold::from_meta(&MetaInfo::default()).wrap(""));
}
