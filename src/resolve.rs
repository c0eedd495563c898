// Candidate token -> sandboxed file reference.
//
// Resolution is lexical (like a shell's `cd a/../b`) and the relative
// identifier is always computed from one fixed sandbox root, so the same
// token maps to the same identifier for the whole invocation. The type
// check follows symlinks, and the real location of the file must still
// lie below the root.

use std::path::{Component, Path, PathBuf};

use tracing::debug;

/// A local file that will be uploaded alongside the command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReference {
    /// Slash-separated path relative to the sandbox root. Never starts with `..`.
    pub relative_id: String,
    /// Absolute local path, an existing regular file at detection time.
    pub absolute_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    /// Symlink-free form of `root`, used to confine link targets.
    real_root: PathBuf,
    cwd: PathBuf,
}

impl PathResolver {
    /// `root` is the sandbox root, `cwd` is what relative tokens resolve against.
    /// Both are normalized so later prefix checks are purely lexical.
    pub fn new(root: impl AsRef<Path>, cwd: impl AsRef<Path>) -> Self {
        let cwd = normalize(cwd.as_ref());
        let root = if root.as_ref().is_absolute() {
            normalize(root.as_ref())
        } else {
            normalize(&cwd.join(root))
        };
        let real_root = std::fs::canonicalize(&root).unwrap_or_else(|_| root.clone());
        PathResolver {
            root,
            real_root,
            cwd,
        }
    }

    /// Root and cwd are both the process working directory.
    pub fn from_current_dir() -> std::io::Result<Self> {
        let cwd = std::env::current_dir()?;
        Ok(Self::new(&cwd, &cwd))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute, lexically normalized form of `candidate`.
    pub fn absolutize(&self, candidate: &str) -> PathBuf {
        normalize(&self.cwd.join(candidate))
    }

    /// `None` means "not a file reference": missing, not a regular file,
    /// unreadable, or outside the sandbox root.
    pub fn resolve(&self, candidate: &str) -> Option<FileReference> {
        if candidate.is_empty() {
            return None;
        }
        let absolute_path = self.absolutize(candidate);

        match std::fs::metadata(&absolute_path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                debug!(candidate, "not a regular file");
                return None;
            }
            Err(e) => {
                debug!(candidate, error = %e, "stat failed");
                return None;
            }
        }

        let relative_id = match self.relative_id(&absolute_path) {
            Some(id) => id,
            None => {
                debug!(candidate, root = %self.root.display(), "outside sandbox root");
                return None;
            }
        };

        match std::fs::canonicalize(&absolute_path) {
            Ok(real) if real.starts_with(&self.real_root) => {}
            Ok(real) => {
                debug!(candidate, target = %real.display(), "link leads outside sandbox root");
                return None;
            }
            Err(e) => {
                debug!(candidate, error = %e, "cannot resolve real path");
                return None;
            }
        }

        Some(FileReference {
            relative_id,
            absolute_path,
        })
    }

    /// Slash-joined path of `absolute` below the root, `None` if it would
    /// need a `..` to get there.
    pub fn relative_id(&self, absolute: &Path) -> Option<String> {
        let rest = absolute.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in rest.components() {
            match component {
                Component::Normal(part) => parts.push(part.to_str()?),
                Component::CurDir => continue,
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }

    /// Local destination for a path reported by the service. Absolute paths
    /// and any `..` segment are refused.
    pub fn local_destination(&self, remote_path: &str) -> Option<PathBuf> {
        if remote_path.is_empty() {
            return None;
        }
        let mut out = self.root.clone();
        let mut pushed = false;
        for component in Path::new(&remote_path.replace('\\', "/")).components() {
            match component {
                Component::Normal(part) => {
                    out.push(part);
                    pushed = true;
                }
                Component::CurDir => continue,
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }
        pushed.then_some(out)
    }
}

/// Lexical normalization: drops `.` and folds `..` into its parent.
/// `..` above the filesystem root is discarded, as path resolution does.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
