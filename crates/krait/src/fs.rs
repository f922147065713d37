//! Capability-scoped filesystem adapters.
//!
//! All file I/O performed by user code routes through a [`Filesystem`]
//! implementation supplied by the host. Two reference adapters ship with the
//! crate: an in-memory map keyed by normalised path, and a sandboxed on-disk
//! adapter rooted at one directory that rejects paths escaping the root both
//! textually and after symlink resolution.

use std::{
    fmt,
    path::{Component, Path, PathBuf},
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::exc::{ExcType, PyExc};

/// Failure from a filesystem adapter, mapped to the matching Python
/// exception so user code can catch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    NotFound(String),
    PermissionDenied(String),
    IsADirectory(String),
    Other(String),
}

impl FsError {
    pub(crate) fn into_exc(self) -> PyExc {
        match self {
            Self::NotFound(path) => PyExc::new(
                ExcType::FileNotFoundError,
                format!("[Errno 2] No such file or directory: '{path}'"),
            ),
            Self::PermissionDenied(path) => PyExc::new(
                ExcType::PermissionError,
                format!("[Errno 13] Permission denied: '{path}'"),
            ),
            Self::IsADirectory(path) => PyExc::new(
                ExcType::IsADirectoryError,
                format!("[Errno 21] Is a directory: '{path}'"),
            ),
            Self::Other(message) => PyExc::new(ExcType::OSError, message),
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(p) => write!(f, "not found: {p}"),
            Self::PermissionDenied(p) => write!(f, "permission denied: {p}"),
            Self::IsADirectory(p) => write!(f, "is a directory: {p}"),
            Self::Other(m) => f.write_str(m),
        }
    }
}

impl std::error::Error for FsError {}

/// The capability contract for file access from sandboxed code.
///
/// Implement this to give programs a custom filesystem view. Writes mutate
/// the adapter in place; the context owns the adapter, so threading the
/// updated filesystem through evaluation falls out of ownership.
pub trait Filesystem: fmt::Debug {
    fn read(&self, path: &str) -> Result<String, FsError>;
    fn write(&mut self, path: &str, data: &str, append: bool) -> Result<(), FsError>;
    fn exists(&self, path: &str) -> bool;
    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError>;
    fn delete(&mut self, path: &str) -> Result<(), FsError>;
}

/// Normalises a path for the in-memory adapter: forward slashes, no leading
/// `./`, `..` segments resolved without escaping the (virtual) root.
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    let normalized = path.replace('\\', "/");
    for part in normalized.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

/// In-memory filesystem keyed by normalised path. The default adapter: fully
/// deterministic and serialisable into snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFs {
    files: IndexMap<String, String>,
}

impl MemoryFs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a file, normalising the path.
    pub fn seed(&mut self, path: &str, content: impl Into<String>) {
        self.files.insert(normalize(path), content.into());
    }

    /// Direct read access for hosts inspecting results after a run.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&str> {
        self.files.get(&normalize(path)).map(String::as_str)
    }

    fn dir_of(path: &str) -> Option<&str> {
        path.rsplit_once('/').map(|(dir, _)| dir)
    }
}

impl Filesystem for MemoryFs {
    fn read(&self, path: &str) -> Result<String, FsError> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    fn write(&mut self, path: &str, data: &str, append: bool) -> Result<(), FsError> {
        let key = normalize(path);
        if append {
            self.files.entry(key).or_default().push_str(data);
        } else {
            self.files.insert(key, data.to_string());
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> bool {
        let key = normalize(path);
        self.files.contains_key(&key) || self.files.keys().any(|k| k.starts_with(&format!("{key}/")))
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let key = normalize(path);
        let prefix = if key.is_empty() { String::new() } else { format!("{key}/") };
        let mut names: Vec<String> = Vec::new();
        for file in self.files.keys() {
            let Some(rest) = file.strip_prefix(&prefix) else {
                continue;
            };
            let name = rest.split('/').next().unwrap_or(rest);
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        if names.is_empty() && !key.is_empty() && !self.files.contains_key(&key) {
            return Err(FsError::NotFound(path.to_string()));
        }
        Ok(names)
    }

    fn delete(&mut self, path: &str) -> Result<(), FsError> {
        let key = normalize(path);
        if self.files.shift_remove(&key).is_none() {
            return Err(FsError::NotFound(path.to_string()));
        }
        Ok(())
    }
}

/// Sandboxed on-disk adapter rooted at one directory.
///
/// Every path is joined under the root after textual `..` resolution, and the
/// final location is verified against the canonicalised root so symlinks
/// cannot escape either.
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    /// Creates an adapter rooted at `root`. The directory must exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, FsError> {
        let root: PathBuf = root.into();
        let root = root
            .canonicalize()
            .map_err(|e| FsError::Other(format!("invalid sandbox root: {e}")))?;
        Ok(Self { root })
    }

    /// Resolves a sandbox-relative path, rejecting escapes.
    fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let rel = Path::new(path);
        let mut clean = PathBuf::new();
        for comp in rel.components() {
            match comp {
                Component::Normal(part) => clean.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !clean.pop() {
                        return Err(FsError::PermissionDenied(path.to_string()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {
                    // Absolute paths are re-rooted inside the sandbox.
                }
            }
        }
        let full = self.root.join(clean);
        // Symlink check: canonicalise the nearest existing ancestor and
        // verify it stays under the root.
        let mut probe = full.clone();
        while !probe.exists() {
            if !probe.pop() {
                break;
            }
        }
        if probe.exists() {
            let canon = probe
                .canonicalize()
                .map_err(|e| FsError::Other(e.to_string()))?;
            if !canon.starts_with(&self.root) {
                return Err(FsError::PermissionDenied(path.to_string()));
            }
        }
        Ok(full)
    }
}

impl Filesystem for DirFs {
    fn read(&self, path: &str) -> Result<String, FsError> {
        let full = self.resolve(path)?;
        if full.is_dir() {
            return Err(FsError::IsADirectory(path.to_string()));
        }
        std::fs::read_to_string(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied(path.to_string()),
            _ => FsError::Other(e.to_string()),
        })
    }

    fn write(&mut self, path: &str, data: &str, append: bool) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FsError::Other(e.to_string()))?;
        }
        let result = if append {
            use std::io::Write as _;
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&full)
                .and_then(|mut f| f.write_all(data.as_bytes()))
        } else {
            std::fs::write(&full, data)
        };
        result.map_err(|e| FsError::Other(e.to_string()))
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve(path).map(|p| p.exists()).unwrap_or(false)
    }

    fn list_dir(&self, path: &str) -> Result<Vec<String>, FsError> {
        let full = self.resolve(path)?;
        let entries = std::fs::read_dir(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            _ => FsError::Other(e.to_string()),
        })?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| FsError::Other(e.to_string()))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }

    fn delete(&mut self, path: &str) -> Result<(), FsError> {
        let full = self.resolve(path)?;
        std::fs::remove_file(&full).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => FsError::NotFound(path.to_string()),
            _ => FsError::Other(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn memory_fs_round_trip() {
        let mut fs = MemoryFs::new();
        fs.write("data/notes.txt", "hello", false).unwrap();
        assert_eq!(fs.read("./data/notes.txt").unwrap(), "hello");
        fs.write("data/notes.txt", " world", true).unwrap();
        assert_eq!(fs.read("data/notes.txt").unwrap(), "hello world");
        assert!(fs.exists("data"));
        fs.delete("data/notes.txt").unwrap();
        assert!(!fs.exists("data/notes.txt"));
    }

    #[test]
    fn memory_fs_normalises_paths() {
        let mut fs = MemoryFs::new();
        fs.write("a/b/../c.txt", "x", false).unwrap();
        assert_eq!(fs.read("a/c.txt").unwrap(), "x");
        // `..` cannot climb above the virtual root.
        fs.write("../../etc/passwd", "y", false).unwrap();
        assert_eq!(fs.read("etc/passwd").unwrap(), "y");
    }

    #[test]
    fn memory_fs_list_dir() {
        let mut fs = MemoryFs::new();
        fs.write("d/a.txt", "", false).unwrap();
        fs.write("d/b.txt", "", false).unwrap();
        fs.write("d/sub/c.txt", "", false).unwrap();
        let names = fs.list_dir("d").unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
    }

    #[test]
    fn missing_file_errors() {
        let fs = MemoryFs::new();
        assert_eq!(fs.read("nope.txt").unwrap_err(), FsError::NotFound("nope.txt".to_string()));
    }

    #[test]
    fn fs_error_maps_to_python_exception() {
        let exc = FsError::NotFound("a.txt".to_string()).into_exc();
        assert_eq!(exc.py_string(), "FileNotFoundError: [Errno 2] No such file or directory: 'a.txt'");
        let exc = FsError::PermissionDenied("b".to_string()).into_exc();
        assert!(exc.py_string().starts_with("PermissionError:"));
    }

    #[test]
    fn dir_fs_rejects_textual_escape() {
        let tmp = std::env::temp_dir().join("krait-fs-test-escape");
        std::fs::create_dir_all(&tmp).unwrap();
        let fs = DirFs::new(&tmp).unwrap();
        assert!(matches!(
            fs.resolve("../outside.txt"),
            Err(FsError::PermissionDenied(_))
        ));
        // Absolute paths are re-rooted, not rejected.
        assert!(fs.resolve("/abs/file.txt").is_ok());
    }
}
