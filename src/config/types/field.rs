//! Dotted config field paths.

use owo_colors::OwoColorize;
use std::fmt;

/// Location of a field in `pronto.toml`, e.g. `build.css_output_path`.
///
/// Each section exposes its paths as associated constants so diagnostics
/// never spell a key by hand:
///
/// ```ignore
/// diag.error(BuildConfig::VIEWS, "directory not found");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPath(&'static str);

impl FieldPath {
    #[inline]
    pub const fn new(path: &'static str) -> Self {
        Self(path)
    }

    #[inline]
    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_args!("`{}`", self.0).bright_blue())
    }
}
