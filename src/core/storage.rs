/// Private file storage for backup archives
///
/// Archives live under `<root>/private/...`, outside any public directory.
/// The ledger stores paths relative to `root` so records stay valid when the
/// storage root moves between deployments.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct PrivateStorage {
    root: PathBuf,
}

impl PrivateStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a logical storage name to its absolute directory
    pub fn private_dir(&self, name: &str) -> PathBuf {
        self.root.join("private").join(name)
    }

    /// Create a private directory (and parents) if missing
    pub fn ensure_dir(&self, dir: &Path) -> io::Result<()> {
        if dir.is_dir() {
            return Ok(());
        }

        fs::create_dir_all(dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o775))?;
        }

        Ok(())
    }

    /// Convert an absolute path under the root into a storage-relative one.
    /// Paths outside the root are returned unchanged.
    pub fn relative_path(&self, absolute: &Path) -> String {
        let relative = absolute.strip_prefix(&self.root).unwrap_or(absolute);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Resolve a storage-relative path. Returns `None` for paths that would
    /// escape the root.
    pub fn absolute_path(&self, relative: &str) -> Option<PathBuf> {
        let relative = Path::new(relative);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));

        if escapes || relative.as_os_str().is_empty() {
            return None;
        }

        Some(self.root.join(relative))
    }
}

/// Atomically claim a filename that does not exist yet, appending `-1`,
/// `-2`, ... before the extension. The returned path exists as an empty
/// file owned by the caller, so concurrent callers never share a name.
pub fn reserve_unique_file(path: &Path) -> io::Result<PathBuf> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());
    let parent = path.parent().unwrap_or_else(|| Path::new(""));

    let mut counter = 0u32;
    loop {
        let candidate = match (counter, &ext) {
            (0, _) => path.to_path_buf(),
            (n, Some(ext)) => parent.join(format!("{}-{}.{}", stem, n, ext)),
            (n, None) => parent.join(format!("{}-{}", stem, n)),
        };

        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => counter += 1,
            Err(e) => return Err(e),
        }
    }
}
