//! Path utilities.
//!
//! - [`fs`]: path normalization (`normalize_path`, `resolve_under`) and
//!   conversion of relative paths to URL paths (`to_url_path`)

pub mod fs;

pub use fs::{normalize_path, resolve_under, to_url_path};
