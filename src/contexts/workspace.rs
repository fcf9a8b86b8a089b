use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Errors raised by the filesystem seam
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    /// The path is absolute outside the root, or climbs out of it with `..`
    OutsideWorkspace(String),
    Io { path: String, message: String },
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::OutsideWorkspace(path) => {
                write!(f, "Path '{}' is outside the workspace", path)
            }
            FsError::Io { path, message } => write!(f, "I/O error on '{}': {}", path, message),
        }
    }
}

impl std::error::Error for FsError {}

/// Whole-file text access used by the patch engine and the context provider
pub trait FileSystem {
    fn read_text(&self, path: &str) -> Result<String, FsError>;
    fn write_text(&self, path: &str, text: &str) -> Result<(), FsError>;
}

impl<T: FileSystem + ?Sized> FileSystem for &T {
    fn read_text(&self, path: &str) -> Result<String, FsError> {
        (**self).read_text(path)
    }

    fn write_text(&self, path: &str, text: &str) -> Result<(), FsError> {
        (**self).write_text(path, text)
    }
}

/// A directory tree on disk that model-supplied paths are confined to
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates a workspace rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates a workspace rooted at the process working directory
    pub fn current() -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a path from a model reply onto the disk.
    ///
    /// Relative paths are taken from the root. Absolute paths are accepted
    /// only when they point inside the root. `..` is never accepted.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, FsError> {
        let outside = || FsError::OutsideWorkspace(path.to_string());
        let trimmed = path.trim();
        if trimmed.is_empty() {
            return Err(outside());
        }

        let candidate = Path::new(trimmed);
        let relative = if candidate.is_absolute() {
            candidate.strip_prefix(&self.root).map_err(|_| outside())?
        } else {
            candidate
        };

        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(outside());
                }
            }
        }

        if resolved == self.root || !self.stays_inside(&resolved) {
            return Err(outside());
        }
        Ok(resolved)
    }

    /// Follows symlinks along `resolved` and checks the target is still
    /// under the root. Roots that do not exist on disk are not checked.
    fn stays_inside(&self, resolved: &Path) -> bool {
        let Ok(root) = fs::canonicalize(&self.root) else {
            return true;
        };

        // The file itself may not exist yet; check its nearest existing ancestor.
        for ancestor in resolved.ancestors() {
            if fs::symlink_metadata(ancestor).is_err() {
                continue;
            }
            return match fs::canonicalize(ancestor) {
                Ok(real) => real.starts_with(&root),
                // Dangling symlink: its target cannot be checked
                Err(_) => false,
            };
        }
        false
    }
}

impl FileSystem for Workspace {
    fn read_text(&self, path: &str) -> Result<String, FsError> {
        let resolved = self.resolve(path)?;
        fs::read_to_string(&resolved).map_err(|e| FsError::Io {
            path: path.to_string(),
            message: e.to_string(),
        })
    }

    fn write_text(&self, path: &str, text: &str) -> Result<(), FsError> {
        let resolved = self.resolve(path)?;
        fs::write(&resolved, text).map_err(|e| FsError::Io {
            path: path.to_string(),
            message: e.to_string(),
        })
    }
}
