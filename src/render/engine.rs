//! The render engine seam and per-request context.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;

use super::plugin::Framework;
use crate::error::{Error, Result};
use crate::loader::Module;
use crate::meta::MetaInfo;

/// Rendered body, chunk by chunk.
pub type BodyStream = BoxStream<'static, Result<Bytes, Error>>;

/// Per-request state. Built fresh for every render and never shared.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderContext {
    pub state: Value,
    pub url: String,
}

impl RenderContext {
    pub fn new(state: Value, url: impl Into<String>) -> Self {
        Self {
            state,
            url: url.into(),
        }
    }
}

/// Per-call render switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    pub url: String,
    /// Body only, no page scaffolding.
    pub plain: bool,
    /// Prefix the body with the compiled stylesheet.
    pub inline_css: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            url: "/".to_string(),
            plain: false,
            inline_css: false,
        }
    }
}

/// Component framework consumed by the renderer.
///
/// Methods may block on the component's interpreter; the renderer calls
/// `create_instance` and `meta` from a blocking worker.
pub trait RenderEngine: Send + Sync + 'static {
    type Instance: Send + 'static;

    /// Bind a component to its request context. The context is read once.
    fn create_instance(
        &self,
        module: Arc<Module>,
        context: &RenderContext,
        framework: &Framework,
    ) -> Result<Self::Instance>;

    /// Per-component metadata.
    fn meta(&self, instance: &Self::Instance) -> Result<MetaInfo>;

    fn render_to_stream(&self, instance: Self::Instance) -> BodyStream;

    fn render_to_string(
        &self,
        instance: Self::Instance,
    ) -> impl Future<Output = Result<String>> + Send;
}
