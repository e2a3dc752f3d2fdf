//! `pronto render`: stream one page to stdout.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio::runtime::Runtime;

use crate::cli::RenderArgs;
use crate::config::ProntoConfig;
use crate::factory::create_renderer;
use crate::render::RenderOptions;

pub fn render_view(config: &ProntoConfig, runtime: &Runtime, args: &RenderArgs) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    render_into(config, runtime, args, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Render `args.view` into `out`, chunk by chunk.
pub fn render_into(
    config: &ProntoConfig,
    runtime: &Runtime,
    args: &RenderArgs,
    out: &mut impl Write,
) -> Result<()> {
    let mut config = config.clone();
    config.build.watch = false;

    let state = parse_state(args.state.as_deref())?;
    let path = resolve_view(&config, &args.view);
    let options = RenderOptions {
        url: args.url.clone(),
        plain: args.plain,
        inline_css: args.inline_css || config.render.inline_css,
    };

    let renderer = create_renderer(&config);
    // Failures are returned to main
    renderer.on_error(Arc::new(|_| {}));

    runtime.block_on(async {
        let mut stream = renderer.render_to_stream(&path, state, &options).await?;
        while let Some(chunk) = stream.next().await {
            out.write_all(&chunk?)?;
        }
        Ok::<_, anyhow::Error>(())
    })
}

/// An existing file is used as is; anything else is a view name.
fn resolve_view(config: &ProntoConfig, view: &str) -> PathBuf {
    let direct = Path::new(view);
    if direct.is_file() {
        direct.to_path_buf()
    } else {
        config.view_path(view)
    }
}

fn parse_state(state: Option<&str>) -> Result<Value> {
    let Some(state) = state else {
        return Ok(Value::Object(Map::new()));
    };
    let value: Value = serde_json::from_str(state).context("--state is not valid JSON")?;
    anyhow::ensure!(value.is_object(), "--state must be a JSON object");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;
    use std::fs;
    use tempfile::TempDir;

    const PAGE: &str = r#"<script>
return {
  meta = { title = "Post" },
  render = function(vm) return "<h1>" .. pronto.escape(vm.name or "?") .. "</h1>" end,
}
</script>
<style>h1 { margin: 0; }</style>
"#;

    fn project() -> (TempDir, ProntoConfig) {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("views/blog")).unwrap();
        fs::write(dir.path().join("views/blog/post.view"), PAGE).unwrap();
        let mut config = test_parse_config("");
        config.build.normalize(dir.path());
        config.build.output_path = dir.path().join("out");
        (dir, config)
    }

    fn args(view: &str) -> RenderArgs {
        RenderArgs {
            view: view.to_string(),
            state: None,
            url: "/".to_string(),
            plain: false,
            inline_css: false,
        }
    }

    fn render(config: &ProntoConfig, args: &RenderArgs) -> Result<String> {
        let runtime = Runtime::new().unwrap();
        let mut out = Vec::new();
        render_into(config, &runtime, args, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_render_page_with_state() {
        let (_dir, config) = project();
        let mut args = args("blog/post");
        args.state = Some(r#"{"name": "a & b"}"#.to_string());
        let html = render(&config, &args).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>Post</title>"));
        assert!(html.contains("<h1>a &amp; b</h1>"));
    }

    #[test]
    fn test_render_plain_inline_css() {
        let (_dir, config) = project();
        let mut args = args("blog/post");
        args.plain = true;
        args.inline_css = true;
        let html = render(&config, &args).unwrap();
        assert!(html.starts_with("<style type=\"text/css\">"));
        assert!(html.contains("margin: 0"));
        assert!(html.ends_with("<h1>?</h1>"));
    }

    #[test]
    fn test_render_by_file_path() {
        let (dir, config) = project();
        let file = dir.path().join("views/blog/post.view");
        let mut args = args(file.to_str().unwrap());
        args.plain = true;
        assert_eq!(render(&config, &args).unwrap(), "<h1>?</h1>");
    }

    #[test]
    fn test_invalid_state_rejected() {
        assert!(parse_state(Some("not json")).is_err());
        assert!(parse_state(Some("[1, 2]")).is_err());
        assert_eq!(parse_state(None).unwrap(), Value::Object(Map::new()));
    }

    #[test]
    fn test_missing_view_fails() {
        let (_dir, config) = project();
        let err = render(&config, &args("nope")).unwrap_err();
        let err = err.downcast_ref::<crate::error::Error>().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Render);
    }
}
