//! Build backend adaptor.
//!
//! A backend turns a batch of source files into compiled artifacts inside a
//! [`SinkFs`]. Batching matters: pre-compilation hands the whole views tree to
//! one `build` call.
//!
//! ```text
//! BuildRequest { entry name -> source path } --build--> sink
//!                                                 ├── <output>/<entry>.lua
//!                                                 ├── <output>/style.<batch>.css
//!                                                 └── <output>/style.<batch>.css.map (optional)
//! ```
//!
//! Continuous builds live in [`watch`]; any backend can be watched.

mod debouncer;
mod lua;
pub mod watch;

pub use lua::LuaBackend;
pub use watch::{WatchEvent, WatchHandle};

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashSet;

use crate::error::{BuildError, Diagnostic};
use crate::sink::SinkFs;

/// Hex digits of the batch digest kept in stylesheet names.
const BATCH_ID_LEN: usize = 16;

/// External build tool invoked over a batch of entries.
pub trait BuildBackend: Send + Sync {
    /// Compile every entry of `request` into `sink`.
    ///
    /// A failure fails the whole batch, even for entries that would have
    /// compiled on their own.
    fn build(&self, request: &BuildRequest, sink: &dyn SinkFs) -> Result<BuildReport, BuildError>;

    /// Paths whose changes should trigger a rebuild in watch mode.
    ///
    /// Defaults to the parent directory of every entry; editors replace files
    /// on save, so watching the file itself would lose the watch.
    fn watch_roots(&self, request: &BuildRequest) -> Vec<PathBuf> {
        let mut seen = FxHashSet::default();
        request
            .sources()
            .filter_map(Path::parent)
            .filter(|dir| seen.insert(dir.to_path_buf()))
            .map(Path::to_path_buf)
            .collect()
    }
}

// =============================================================================
// BuildRequest
// =============================================================================

/// A batch of source paths submitted to the backend together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    entries: BTreeMap<String, PathBuf>,
    output_path: PathBuf,
}

impl BuildRequest {
    /// Build a request, naming every entry with [`entry_name`].
    ///
    /// Repeated paths collapse into one entry. Two distinct paths that would
    /// share an entry name are rejected: the second artifact would silently
    /// overwrite the first in the sink.
    pub fn new(paths: &[PathBuf], output_path: &Path) -> Result<Self, BuildError> {
        let mut entries: BTreeMap<String, PathBuf> = BTreeMap::new();
        for path in paths {
            let name = entry_name(path);
            match entries.get(&name) {
                Some(existing) if existing != path => {
                    return Err(BuildError::with_diagnostics(vec![Diagnostic::error(
                        path,
                        format!(
                            "entry name `{name}` collides with {}",
                            existing.display()
                        ),
                    )]));
                }
                Some(_) => {}
                None => {
                    entries.insert(name, path.clone());
                }
            }
        }
        Ok(Self {
            entries,
            output_path: output_path.to_path_buf(),
        })
    }

    /// Entry name → source path, ordered by name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
    }

    pub fn sources(&self) -> impl Iterator<Item = &Path> {
        self.entries.values().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Where the artifact for `entry` is written.
    pub fn artifact_path(&self, entry: &str) -> PathBuf {
        self.output_path.join(format!("{entry}.lua"))
    }

    /// Combined stylesheet of this batch. Batches over different entry sets
    /// never share one, so concurrent builds cannot read each other's.
    pub fn stylesheet_path(&self) -> PathBuf {
        self.output_path.join(format!("style.{}.css", self.batch_id()))
    }

    pub fn sourcemap_path(&self) -> PathBuf {
        self.output_path.join(format!("style.{}.css.map", self.batch_id()))
    }

    /// Digest of the entry names, stable for a given entry set.
    pub fn batch_id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for name in self.entries.keys() {
            hasher.update(name.as_bytes());
            hasher.update(b"\0");
        }
        let mut id = hex::encode(hasher.finalize().as_bytes());
        id.truncate(BATCH_ID_LEN);
        id
    }

    /// Identity of the entry set: sorted, deduplicated source paths.
    pub fn entry_set(&self) -> Vec<PathBuf> {
        let mut set: Vec<_> = self.entries.values().cloned().collect();
        set.sort();
        set
    }
}

/// Collision-resistant entry name: `<file name>.<blake3 of the full path>`.
pub fn entry_name(path: &Path) -> String {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "entry".to_string());
    let digest = blake3::hash(path.as_os_str().as_encoded_bytes());
    format!("{file_name}.{}", hex::encode(digest.as_bytes()))
}

// =============================================================================
// BuildReport
// =============================================================================

/// Outputs of a successful build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Entry name → artifact path in the sink.
    pub artifacts: BTreeMap<String, PathBuf>,
    /// Combined stylesheet, if any entry had styles.
    pub stylesheet: Option<PathBuf>,
    pub sourcemap: Option<PathBuf>,
    /// Non-fatal diagnostics (warnings).
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildReport {
    pub fn artifact(&self, entry: &str) -> Option<&Path> {
        self.artifacts.get(entry).map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_name_is_stable_and_distinct() {
        let a = entry_name(Path::new("/views/a/index.view"));
        let b = entry_name(Path::new("/views/b/index.view"));
        assert_eq!(a, entry_name(Path::new("/views/a/index.view")));
        assert_ne!(a, b);
        assert!(a.starts_with("index.view."));
        assert_eq!(a.len(), "index.view.".len() + 64);
    }

    #[test]
    fn test_request_collapses_duplicates() {
        let paths = vec![
            PathBuf::from("/views/a.view"),
            PathBuf::from("/views/b.view"),
            PathBuf::from("/views/a.view"),
        ];
        let request = BuildRequest::new(&paths, Path::new("/out")).unwrap();
        assert_eq!(request.len(), 2);
        assert_eq!(
            request.entry_set(),
            vec![PathBuf::from("/views/a.view"), PathBuf::from("/views/b.view")]
        );
    }

    #[test]
    fn test_request_paths() {
        let paths = vec![PathBuf::from("/views/a.view")];
        let request = BuildRequest::new(&paths, Path::new("/out")).unwrap();
        let (name, _) = request.entries().next().unwrap();
        assert_eq!(
            request.artifact_path(name),
            PathBuf::from(format!("/out/{name}.lua"))
        );
        let id = request.batch_id();
        assert_eq!(id.len(), 16);
        assert_eq!(
            request.stylesheet_path(),
            PathBuf::from(format!("/out/style.{id}.css"))
        );
        assert_eq!(
            request.sourcemap_path(),
            PathBuf::from(format!("/out/style.{id}.css.map"))
        );
    }

    #[test]
    fn test_stylesheet_is_per_entry_set() {
        let out = Path::new("/out");
        let a = BuildRequest::new(&[PathBuf::from("/views/a.view")], out).unwrap();
        let b = BuildRequest::new(&[PathBuf::from("/views/b.view")], out).unwrap();
        let ab = BuildRequest::new(
            &[PathBuf::from("/views/b.view"), PathBuf::from("/views/a.view")],
            out,
        )
        .unwrap();
        let ab_again = BuildRequest::new(
            &[PathBuf::from("/views/a.view"), PathBuf::from("/views/b.view")],
            out,
        )
        .unwrap();

        assert_ne!(a.stylesheet_path(), b.stylesheet_path());
        assert_ne!(a.stylesheet_path(), ab.stylesheet_path());
        assert_eq!(ab.stylesheet_path(), ab_again.stylesheet_path());
    }

    #[test]
    fn test_default_watch_roots_are_parent_dirs() {
        struct Noop;
        impl BuildBackend for Noop {
            fn build(&self, _: &BuildRequest, _: &dyn SinkFs) -> Result<BuildReport, BuildError> {
                Ok(BuildReport::default())
            }
        }

        let paths = vec![
            PathBuf::from("/views/a.view"),
            PathBuf::from("/views/b.view"),
            PathBuf::from("/views/nested/c.view"),
        ];
        let request = BuildRequest::new(&paths, Path::new("/out")).unwrap();
        let mut roots = Noop.watch_roots(&request);
        roots.sort();
        assert_eq!(
            roots,
            vec![PathBuf::from("/views"), PathBuf::from("/views/nested")]
        );
    }
}
