//! Configuration section definitions.
//!
//! Each module corresponds to a section in `pronto.toml`:
//!
//! | Module   | TOML Section | Purpose                                  |
//! |----------|--------------|------------------------------------------|
//! | `build`  | `[build]`    | Views, compiler switches, output paths   |
//! | `render` | `[render]`   | Plugins, inline stylesheet default       |
//! | `serve`  | `[serve]`    | Development server                       |
//!
//! `[meta]` and `[globals]` are plain data and live on the root config.

mod build;
mod render;
mod serve;

pub use build::BuildConfig;
pub use render::RenderConfig;
pub use serve::ServeConfig;
