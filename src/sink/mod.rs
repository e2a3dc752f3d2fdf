//! Output sink for compiled artifacts.
//!
//! The build backend writes compiled scripts, the combined stylesheet and its
//! source map here; the compiler reads them back by path. Production uses the
//! in-memory [`MemoryFs`], so compiled scripts never touch the disk.

use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use dashmap::DashMap;

/// File system the build backend writes into.
pub trait SinkFs: Send + Sync {
    fn write(&self, path: &Path, contents: Bytes) -> io::Result<()>;

    fn read(&self, path: &Path) -> io::Result<Bytes>;

    fn remove(&self, path: &Path);

    fn contains(&self, path: &Path) -> bool;

    /// Read a file as UTF-8 text.
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        let bytes = self.read(path)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

/// In-memory sink keyed by path.
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: DashMap<PathBuf, Bytes>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl SinkFs for MemoryFs {
    fn write(&self, path: &Path, contents: Bytes) -> io::Result<()> {
        self.files.insert(path.to_path_buf(), contents);
        Ok(())
    }

    fn read(&self, path: &Path) -> io::Result<Bytes> {
        self.files.get(path).map(|entry| entry.clone()).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found in build output", path.display()),
            )
        })
    }

    fn remove(&self, path: &Path) {
        self.files.remove(path);
    }

    fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let fs = MemoryFs::new();
        fs.write(Path::new("/out/a.lua"), Bytes::from_static(b"return {}"))
            .unwrap();
        assert!(fs.contains(Path::new("/out/a.lua")));
        assert_eq!(fs.read_to_string(Path::new("/out/a.lua")).unwrap(), "return {}");
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let fs = MemoryFs::new();
        let err = fs.read(Path::new("/out/missing.lua")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_overwrite_and_remove() {
        let fs = MemoryFs::new();
        let path = Path::new("/out/style.css");
        fs.write(path, Bytes::from_static(b"a{}")).unwrap();
        fs.write(path, Bytes::from_static(b"b{}")).unwrap();
        assert_eq!(fs.len(), 1);
        assert_eq!(fs.read_to_string(path).unwrap(), "b{}");
        fs.remove(path);
        assert!(fs.is_empty());
    }
}
