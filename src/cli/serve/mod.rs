//! `pronto serve`: render views on request.
//!
//! ```text
//! GET /blog/post?tag=x
//!   ├─ <public_path>/blog/post     file?  ──► static response
//!   ├─ <views>/blog/post.<ext>     missing ──► 404
//!   └─ Responder::render(view, {"query": {"tag": "x"}})
//! ```

mod lifecycle;
mod route;

pub use lifecycle::{bind_with_retry, setup_shutdown_handler};
pub use route::Route;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tiny_http::{Request, Response, Server, StatusCode};
use tokio::runtime::Runtime;

use crate::config::ProntoConfig;
use crate::factory::create_renderer;
use crate::http::{Responder, make_header};
use crate::render::RenderOptions;
use crate::utils::mime;

pub fn serve(config: &ProntoConfig, runtime: &Runtime) -> Result<()> {
    let renderer = create_renderer(config);
    if runtime.block_on(renderer.init()).is_err() {
        log!("serve"; "pre-compilation failed, failing views answer 500");
    }

    let responder = Responder::from_config(renderer, config, runtime.handle().clone());
    let (server, addr) = bind_with_retry(config.serve.address())?;
    let server = Arc::new(server);
    lifecycle::register_server(Arc::clone(&server));

    log!("serve"; "http://{}", addr);
    if config.build.watch {
        log!("watch"; "rebuilding on change");
    }

    run_request_loop(&server, &responder, config)?;

    runtime.block_on(responder.renderer().compiler().close());
    Ok(())
}

fn run_request_loop(server: &Server, responder: &Responder, config: &ProntoConfig) -> Result<()> {
    // Requests block on renders, so they get their own pool
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.serve.workers)
        .thread_name(|i| format!("pronto-http-{i}"))
        .build()
        .context("failed to create request pool")?;

    for request in server.incoming_requests() {
        if lifecycle::is_shutdown() {
            break;
        }
        let responder = responder.clone();
        let public = config.build.public_path.clone();
        pool.spawn(move || {
            if let Err(e) = handle_request(request, &responder, &public) {
                log!("serve"; "request error: {e}");
            }
        });
    }
    Ok(())
}

fn handle_request(request: Request, responder: &Responder, public: &Path) -> Result<()> {
    if let Some(path) = resolve_public(request.url(), public) {
        return respond_file(request, &path);
    }

    let Some(route) = Route::parse(request.url()) else {
        return respond_not_found(request);
    };
    if !responder.view_path(&route.view).is_file() {
        debug!("serve"; "no view for {}", request.url());
        return respond_not_found(request);
    }

    let options = RenderOptions {
        url: request.url().to_string(),
        ..responder.renderer().default_options()
    };
    let state = route.state();
    responder.render(request, &route.view, state, &options)
}

/// A file under `public` named by the URL path, never outside it.
fn resolve_public(url: &str, public: &Path) -> Option<PathBuf> {
    let path = url.split('?').next().unwrap_or(url);
    let decoded = percent_encoding::percent_decode_str(path).decode_utf8().ok()?;
    let clean = decoded.trim_matches('/');
    if clean.is_empty() || clean.contains("..") {
        return None;
    }

    let canonical = public.join(clean).canonicalize().ok()?;
    let root = public.canonicalize().ok()?;
    (canonical.starts_with(&root) && canonical.is_file()).then_some(canonical)
}

fn respond_file(request: Request, path: &Path) -> Result<()> {
    let body = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let response = Response::from_data(body)
        .with_header(make_header("Content-Type", mime::from_path(path)));
    request.respond(response)?;
    Ok(())
}

fn respond_not_found(request: Request) -> Result<()> {
    let response = Response::from_data(b"404 Not Found".to_vec())
        .with_status_code(StatusCode(404))
        .with_header(make_header("Content-Type", mime::types::PLAIN));
    request.respond(response)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_public_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/style.css"), "p{}").unwrap();

        let found = resolve_public("/css/style.css?v=1", dir.path()).unwrap();
        assert!(found.ends_with("css/style.css"));
    }

    #[test]
    fn test_resolve_public_rejects_dirs_and_traversal() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();

        assert!(resolve_public("/", dir.path()).is_none());
        assert!(resolve_public("/css", dir.path()).is_none());
        assert!(resolve_public("/../etc/passwd", dir.path()).is_none());
        assert!(resolve_public("/missing.js", dir.path()).is_none());
    }
}
