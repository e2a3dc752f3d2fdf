//! HTTP adaptor: stream a rendered page into a `tiny_http` response.
//!
//! ```text
//! Responder::render(request, "blog/post", state)
//!   ├─ <views>/blog/post.<ext>
//!   ├─ renderer.render_to_stream         (runtime handle)
//!   ├─ first chunk ── error ──► 500 page
//!   └─ pump task ──► mpsc(1) ──► StreamReader ──► chunked body
//! ```
//!
//! Request handlers run on plain threads (the server's worker pool), so the
//! responder owns a runtime [`Handle`] and blocks on it only until the first
//! chunk is known. The rest of the body is pulled by `tiny_http` through a
//! blocking reader, one chunk at a time.

mod reader;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use tiny_http::{Header, Request, Response, StatusCode};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::config::ProntoConfig;
use crate::error::Error;
use crate::render::{BodyStream, LuaEngine, RenderEngine, RenderOptions, Renderer};
use crate::utils::html::escape;
use crate::utils::mime::types::HTML;

use reader::StreamReader;

/// Called after the body; the returned bytes are appended before the
/// response ends.
pub type BeforeEnd = Arc<dyn Fn(&Path) -> Option<Bytes> + Send + Sync>;

pub struct Responder<E: RenderEngine = LuaEngine> {
    renderer: Renderer<E>,
    views: PathBuf,
    extension: String,
    runtime: Handle,
    before_end: Option<BeforeEnd>,
}

impl<E: RenderEngine> Clone for Responder<E> {
    fn clone(&self) -> Self {
        Self {
            renderer: self.renderer.clone(),
            views: self.views.clone(),
            extension: self.extension.clone(),
            runtime: self.runtime.clone(),
            before_end: self.before_end.clone(),
        }
    }
}

impl<E: RenderEngine> Responder<E> {
    pub fn new(
        renderer: Renderer<E>,
        views: impl Into<PathBuf>,
        extension: impl Into<String>,
        runtime: Handle,
    ) -> Self {
        Self {
            renderer,
            views: views.into(),
            extension: extension.into(),
            runtime,
            before_end: None,
        }
    }

    pub fn from_config(renderer: Renderer<E>, config: &ProntoConfig, runtime: Handle) -> Self {
        Self::new(
            renderer,
            &config.build.views,
            config.build.view_extension(),
            runtime,
        )
    }

    pub fn with_before_end(mut self, hook: BeforeEnd) -> Self {
        self.before_end = Some(hook);
        self
    }

    pub fn renderer(&self) -> &Renderer<E> {
        &self.renderer
    }

    /// `<views>/<view>.<extension>`
    pub fn view_path(&self, view: &str) -> PathBuf {
        self.views.join(format!("{view}.{}", self.extension))
    }

    /// Render `view` and write it to `request`.
    ///
    /// A failure before the first chunk answers `500`. Once the first chunk
    /// is out the status is committed, so a later failure only cuts the
    /// body short; the renderer has already reported it.
    pub fn render(
        &self,
        request: Request,
        view: &str,
        state: Value,
        options: &RenderOptions,
    ) -> Result<()> {
        let path = self.view_path(view);
        crate::debug!("serve"; "{} -> {}", request.url(), path.display());

        let mut stream = match self
            .runtime
            .block_on(self.renderer.render_to_stream(&path, state, options))
        {
            Ok(stream) => stream,
            Err(e) => return respond_error(request, &e),
        };

        let first = match self.runtime.block_on(stream.next()) {
            Some(Ok(chunk)) => Some(chunk),
            Some(Err(e)) => return respond_error(request, &e),
            None => None,
        };

        let (tx, rx) = mpsc::channel(1);
        self.runtime
            .spawn(pump(first, stream, tx, path, self.before_end.clone()));

        let response = Response::new(
            StatusCode(200),
            vec![make_header("Content-Type", HTML)],
            StreamReader::new(rx),
            None,
            None,
        );
        request.respond(response)?;
        Ok(())
    }

    /// The composed page for `view` as a stream, without a response.
    pub async fn render_to_stream(
        &self,
        view: &str,
        state: Value,
        options: &RenderOptions,
    ) -> Result<BodyStream, Error> {
        self.renderer
            .render_to_stream(&self.view_path(view), state, options)
            .await
    }

    pub async fn render_to_string(
        &self,
        view: &str,
        state: Value,
        options: &RenderOptions,
    ) -> Result<String, Error> {
        self.renderer
            .render_to_string(&self.view_path(view), state, options)
            .await
    }
}

/// Forward the body into `tx`, then the `before_end` bytes.
async fn pump(
    first: Option<Bytes>,
    mut stream: BodyStream,
    tx: mpsc::Sender<Bytes>,
    path: PathBuf,
    before_end: Option<BeforeEnd>,
) {
    if let Some(chunk) = first
        && tx.send(chunk).await.is_err()
    {
        return;
    }
    while let Some(item) = stream.next().await {
        let Ok(chunk) = item else {
            return;
        };
        if tx.send(chunk).await.is_err() {
            crate::debug!("serve"; "client went away: {}", path.display());
            return;
        }
    }
    if let Some(extra) = before_end.and_then(|hook| hook(&path)) {
        let _ = tx.send(extra).await;
    }
}

/// `500` page naming the error.
pub fn respond_error(request: Request, error: &Error) -> Result<()> {
    let message = error.to_string();
    let body = format!(
        "<html><body><h1>{}</h1><pre>{}</pre></body></html>",
        error.kind(),
        escape(&message)
    );
    let response = Response::from_string(body)
        .with_status_code(StatusCode(500))
        .with_header(make_header("Content-Type", HTML));
    request.respond(response)?;
    Ok(())
}

pub(crate) fn make_header(key: &'static str, value: &'static str) -> Header {
    Header::from_bytes(key, value).unwrap_or_else(|()| unreachable!("invalid header {key}"))
}
