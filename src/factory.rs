//! Wiring from `pronto.toml` to a ready-to-init [`Renderer`].
//!
//! ```text
//! ProntoConfig ──► LuaBackend + MemoryFs + ModuleLoader(globals) + ArtifactCache
//!              ──► Compiler(options) ──► Renderer<LuaEngine>(plugins, pre_compile)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::LuaBackend;
use crate::cache::ArtifactCache;
use crate::compiler::{Compiler, CompilerOptions, collect_sources};
use crate::config::ProntoConfig;
use crate::loader::ModuleLoader;
use crate::render::{LuaEngine, PluginRef, Renderer, RendererOptions};
use crate::sink::MemoryFs;
use crate::utils::path::resolve_under;

/// Compiler options carried by `[build]` and `[meta]`.
pub fn compiler_options(config: &ProntoConfig) -> CompilerOptions {
    let build = &config.build;
    CompilerOptions {
        watch: build.watch,
        watch_cleanup: build.watch_cleanup,
        cache: build.cache,
        extract_css: build.extract_css,
        output_path: build.output_path.clone(),
        css_output_path: build.css_output_path.clone(),
        public_path: build.public_path.clone(),
        meta: config.meta.clone(),
    }
}

/// Renderer options carried by `[render]`, with the pre-compile batch.
///
/// Outside watch mode every view under `build.views` is compiled up front
/// together with `build.pre_compile`; in watch mode only the explicit
/// entries are, and the rest compile on first request.
pub fn renderer_options(config: &ProntoConfig) -> RendererOptions {
    let build = &config.build;

    let mut pre_compile: Vec<PathBuf> = if build.watch {
        Vec::new()
    } else {
        collect_sources(&build.views, &build.extensions)
    };
    pre_compile.extend(
        build
            .pre_compile
            .iter()
            .map(|entry| resolve_under(entry, &build.views)),
    );

    let plugins = config
        .render
        .plugins
        .iter()
        .map(|plugin| PluginRef::Path(resolve_under(plugin, &build.views)))
        .collect();

    let mixins = config
        .render
        .mixins
        .iter()
        .map(|mixin| resolve_under(mixin, &build.views))
        .collect();

    RendererOptions {
        pre_compile,
        plugins,
        mixins,
        inline_css: config.render.inline_css,
    }
}

/// Build the default renderer: Lua backend writing into memory, a fresh
/// artifact cache and the configured sandbox globals.
pub fn create_renderer(config: &ProntoConfig) -> Renderer<LuaEngine> {
    let compiler = Compiler::new(
        Arc::new(LuaBackend),
        Arc::new(MemoryFs::new()),
        ModuleLoader::new(config.globals.clone()),
        Arc::new(ArtifactCache::new()),
        compiler_options(config),
    );
    crate::debug!(
        "render";
        "renderer for {} (watch: {}, cache: {})",
        config.build.views.display(),
        config.build.watch,
        config.build.cache
    );
    Renderer::new(compiler, LuaEngine, renderer_options(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;
    use crate::utils::path::normalize_path;
    use serde_json::{Value, json};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const PAGE: &str = r#"<script>
return {
  data = { who = "world" },
  meta = { title = "Hi" },
  render = function(vm) return "<p>hello " .. pronto.escape(vm.who) .. " from " .. site.name .. "</p>" end,
}
</script>
<style>p { color: red; }</style>
"#;

    fn project(extra: &str) -> (TempDir, ProntoConfig) {
        let dir = TempDir::new().unwrap();
        let views = dir.path().join("views");
        fs::create_dir_all(views.join("blog")).unwrap();
        fs::write(views.join("index.view"), PAGE).unwrap();
        fs::write(views.join("blog/post.view"), PAGE).unwrap();
        fs::write(views.join("notes.txt"), "not a view").unwrap();

        let mut config = test_parse_config(&format!(
            "[globals]\nsite = {{ name = \"demo\" }}\n{extra}"
        ));
        config.root = dir.path().to_path_buf();
        config.build.normalize(dir.path());
        (dir, config)
    }

    #[test]
    fn test_compiler_options_follow_config() {
        let (_dir, config) = project("[build]\ncache = false\nextract_css = false");
        let options = compiler_options(&config);
        assert!(!options.cache);
        assert!(!options.extract_css);
        assert!(options.watch_cleanup);
        assert_eq!(options.output_path, Path::new("/tmp/pronto_ssr"));
        assert_eq!(options.public_path, config.build.public_path);
    }

    #[test]
    fn test_pre_compile_scans_views() {
        let (_dir, config) = project("[build]\npre_compile = [\"index.view\"]");
        let options = renderer_options(&config);
        let views = normalize_path(&config.build.views);

        assert!(options.pre_compile.contains(&views.join("index.view")));
        assert!(options.pre_compile.contains(&views.join("blog/post.view")));
        assert!(!options.pre_compile.iter().any(|p| p.ends_with("notes.txt")));
    }

    #[test]
    fn test_watch_mode_skips_scan() {
        let (_dir, config) = project("[build]\nwatch = true\npre_compile = [\"index.view\"]");
        let options = renderer_options(&config);
        assert_eq!(options.pre_compile.len(), 1);
        assert!(options.pre_compile[0].ends_with("index.view"));
    }

    #[test]
    fn test_plugins_resolve_against_views() {
        let (_dir, config) = project("[render]\nplugins = [\"plugins/site.lua\"]");
        let options = renderer_options(&config);
        let [PluginRef::Path(path)] = options.plugins.as_slice() else {
            panic!("expected one path plugin");
        };
        assert!(path.starts_with(&config.build.views));
    }

    #[test]
    fn test_mixins_resolve_against_views() {
        let (_dir, config) = project("[render]\nmixins = [\"mixins/layout.lua\"]");
        let options = renderer_options(&config);
        assert_eq!(options.mixins.len(), 1);
        assert!(options.mixins[0].starts_with(&config.build.views));
        assert!(options.mixins[0].ends_with("mixins/layout.lua"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_create_renderer_end_to_end() {
        let (dir, mut config) = project("");
        config.build.output_path = dir.path().join("out");

        let renderer = create_renderer(&config);
        renderer.init().await.unwrap();
        assert!(renderer.compiler().is_cached(&config.view_path("blog/post")));

        let html = renderer
            .render_to_string(
                &config.view_path("index"),
                Value::Null,
                &renderer.default_options(),
            )
            .await
            .unwrap();
        assert!(html.contains("<title>Hi</title>"));
        assert!(html.contains("<p>hello world from demo</p>"));
        assert!(html.contains("/css/style.css"));
        assert!(
            config
                .build
                .public_path
                .join("css/style.css")
                .exists()
        );

        let html = renderer
            .render_to_string(
                &config.view_path("index"),
                json!({"who": "<you>"}),
                &renderer.default_options(),
            )
            .await
            .unwrap();
        assert!(html.contains("hello &lt;you&gt;"));
    }
}
