//! Path normalization utilities.
//!
//! Source paths are cache keys, so every path that reaches the compiler goes
//! through [`normalize_path`] first: two spellings of one file must map to the
//! same key.

use std::path::{Component, Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to a lexical cleanup of the path joined onto the current
/// directory when the file does not exist (yet).
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
        };
        clean(&absolute)
    })
}

/// Resolve `path` against `base` unless it is already absolute, then normalize.
///
/// # Example
/// ```ignore
/// let view = resolve_under(Path::new("pages/home.view"), &config.build.views);
/// ```
#[inline]
pub fn resolve_under(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize_path(path)
    } else {
        normalize_path(&base.join(path))
    }
}

/// Convert a relative file path into a root-relative URL path (`/a/b.css`).
pub fn to_url_path(path: &Path) -> String {
    let parts: Vec<_> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();
    format!("/{}", parts.join("/"))
}

/// Lexically remove `.` and `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_relative() {
        let normalized = normalize_path(Path::new("relative/path/file.view"));
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_normalize_path_cleans_missing_files() {
        let normalized = normalize_path(Path::new("/no/such/./dir/../file.view"));
        assert_eq!(normalized, PathBuf::from("/no/such/file.view"));
    }

    #[test]
    fn test_resolve_under_absolute() {
        let resolved = resolve_under(Path::new("/absolute/a.view"), Path::new("/views"));
        assert_eq!(resolved, PathBuf::from("/absolute/a.view"));
    }

    #[test]
    fn test_resolve_under_relative() {
        let resolved = resolve_under(Path::new("pages/a.view"), Path::new("/nonexistent-views"));
        assert_eq!(resolved, PathBuf::from("/nonexistent-views/pages/a.view"));
    }

    #[test]
    fn test_to_url_path() {
        assert_eq!(to_url_path(Path::new("css/style.css")), "/css/style.css");
        assert_eq!(to_url_path(Path::new("./style.css")), "/style.css");
    }
}
