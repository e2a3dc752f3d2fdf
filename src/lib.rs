//! Pronto: on-demand component compilation and streaming page rendering.
//!
//! ```text
//! Renderer ──► Compiler ──► ArtifactCache   (coalesced, one build per path)
//!    │            └──────► BuildBackend ──► SinkFs ──► ModuleLoader
//!    └──► RenderEngine ──► Scaffolded(head, body, tail) ──► page
//! ```
//!
//! [`factory::create_renderer`] wires the built-in Lua backend and engine
//! from a [`config::ProntoConfig`]; [`http::Responder`] streams pages into
//! `tiny_http` responses.

#[macro_use]
pub mod logger;

pub mod backend;
pub mod cache;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod error;
pub mod factory;
pub mod http;
pub mod loader;
pub mod meta;
pub mod render;
pub mod sink;
pub mod utils;

pub use compiler::{Compiler, CompilerOptions};
pub use error::{Error, ErrorKind, Result};
pub use render::{RenderOptions, Renderer, RendererOptions};
