//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! views = "views"                 # Component sources
//! extensions = ["view"]           # File types picked up when scanning `views`
//! watch = false                   # Keep a backend session and rebuild on change
//! watch_cleanup = true            # Wait for a replaced session to exit
//! cache = true                    # Serve repeated imports from memory
//! extract_css = true              # Publish the stylesheet instead of inlining it
//! output_path = "/tmp/pronto_ssr" # Backend output directory (in memory)
//! css_output_path = "css/style.css"
//! public_path = "public"
//! pre_compile = ["layout.view"]   # Extra entries, relative to `views`
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::utils::path::normalize_path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub views: PathBuf,
    pub extensions: Vec<String>,
    pub watch: bool,
    pub watch_cleanup: bool,
    pub cache: bool,
    pub extract_css: bool,
    pub output_path: PathBuf,
    /// Relative to `public_path`; also the URL path of the stylesheet.
    pub css_output_path: PathBuf,
    pub public_path: PathBuf,
    pub pre_compile: Vec<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            views: PathBuf::from("views"),
            extensions: vec!["view".to_string()],
            watch: false,
            watch_cleanup: true,
            cache: true,
            extract_css: true,
            output_path: PathBuf::from("/tmp/pronto_ssr"),
            css_output_path: PathBuf::from("css/style.css"),
            public_path: PathBuf::from("public"),
            pre_compile: Vec::new(),
        }
    }
}

impl BuildConfig {
    pub const VIEWS: FieldPath = FieldPath::new("build.views");
    pub const EXTENSIONS: FieldPath = FieldPath::new("build.extensions");
    pub const CSS_OUTPUT_PATH: FieldPath = FieldPath::new("build.css_output_path");
    pub const PRE_COMPILE: FieldPath = FieldPath::new("build.pre_compile");

    /// Resolve directories against the config root. `output_path` lives in
    /// the in-memory sink and `css_output_path` stays relative.
    pub(crate) fn normalize(&mut self, root: &Path) {
        self.views = normalize_path(&root.join(&self.views));
        self.public_path = normalize_path(&root.join(&self.public_path));
        self.extensions = self
            .extensions
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_string())
            .collect();
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if !self.views.is_dir() {
            diag.error(
                Self::VIEWS,
                format!("directory `{}` not found", self.views.display()),
            );
        }
        if self.css_output_path.is_absolute() {
            diag.error_with_hint(
                Self::CSS_OUTPUT_PATH,
                "must be relative to `build.public_path`",
                "use a path like `css/style.css`",
            );
        }
        if self.extensions.iter().all(|ext| ext.is_empty()) {
            diag.error(Self::EXTENSIONS, "at least one file extension is required");
        }
        for entry in &self.pre_compile {
            if !self.views.join(entry).exists() {
                diag.warn(
                    Self::PRE_COMPILE,
                    format!("`{}` does not exist", entry.display()),
                );
            }
        }
    }

    /// The extension appended to view names, `view` unless configured.
    pub fn view_extension(&self) -> &str {
        self.extensions
            .iter()
            .find(|ext| !ext.is_empty())
            .map_or("view", String::as_str)
    }
}
