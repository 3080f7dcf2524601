//! # invcache-lock
//!
//! Scoped advisory locking on the inventory cache backing file.
//!
//! Every participant opens the same path and takes a `flock`-style lock
//! (`LockFileEx` on Windows) through [`fs2::FileExt`] before touching the
//! contents. Readers share, writers exclude. The lock is released when the
//! [`LockGuard`] is dropped, on every exit path.
//!
//! Locks are not re-entrant: a [`LockedFile`] hands out at most one guard at
//! a time (enforced by the `&mut` borrow in [`LockedFile::lock`]).

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum LockError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to acquire {mode} lock on {path}: {source}")]
    Acquire {
        path: PathBuf,
        mode: LockMode,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, LockError>;

/// Advisory lock flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Read-only access; any number of holders
    Shared,
    /// Read-modify-write access; single holder, excludes readers
    Exclusive,
}

impl LockMode {
    pub fn is_exclusive(self) -> bool {
        matches!(self, LockMode::Exclusive)
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockMode::Shared => f.write_str("shared"),
            LockMode::Exclusive => f.write_str("exclusive"),
        }
    }
}

/// An open backing file that can be locked.
///
/// The file is created if missing and never truncated on open, so a freshly
/// created file is empty until the first writer fills it.
#[derive(Debug)]
pub struct LockedFile {
    path: PathBuf,
    file: File,
}

impl LockedFile {
    /// Open (or create) `path` for reading and writing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_rw(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Block until a lock of `mode` is held.
    ///
    /// If the path was unlinked or replaced while we waited (another process
    /// tore the cache down), the stale descriptor is dropped and the path is
    /// reopened before retrying, so the guard always refers to the file that
    /// currently lives at `path`.
    pub fn lock(&mut self, mode: LockMode) -> Result<LockGuard<'_>> {
        loop {
            let acquired = match mode {
                LockMode::Shared => FileExt::lock_shared(&self.file),
                LockMode::Exclusive => FileExt::lock_exclusive(&self.file),
            };
            acquired.map_err(|source| LockError::Acquire {
                path: self.path.clone(),
                mode,
                source,
            })?;

            if self.is_current() {
                break;
            }

            debug!(
                component = "LOCK",
                path = %self.path.display(),
                "Backing file replaced while waiting for lock, reopening"
            );
            if let Err(e) = FileExt::unlock(&self.file) {
                warn!(component = "LOCK", error = %e, "Failed to release stale lock");
            }
            self.file = open_rw(&self.path)?;
        }

        debug!(component = "LOCK", %mode, path = %self.path.display(), "Lock acquired");
        Ok(LockGuard {
            file: &self.file,
            path: &self.path,
            mode,
        })
    }

    #[cfg(unix)]
    fn is_current(&self) -> bool {
        use std::os::unix::fs::MetadataExt;

        match (self.file.metadata(), std::fs::metadata(&self.path)) {
            (Ok(open), Ok(on_disk)) => open.dev() == on_disk.dev() && open.ino() == on_disk.ino(),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    fn is_current(&self) -> bool {
        self.path.exists()
    }
}

fn open_rw(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|source| LockError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// A held advisory lock. Releases on drop.
#[derive(Debug)]
pub struct LockGuard<'a> {
    file: &'a File,
    path: &'a Path,
    mode: LockMode,
}

impl LockGuard<'_> {
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn path(&self) -> &Path {
        self.path
    }

    /// Read the whole file from offset zero.
    ///
    /// Raw bytes: whether they are valid text is for the caller to judge.
    pub fn read_contents(&self) -> Result<Vec<u8>> {
        let mut file = self.file;
        let mut contents = Vec::new();
        file.seek(SeekFrom::Start(0))
            .and_then(|_| file.read_to_end(&mut contents))
            .map_err(|source| self.io_error(source))?;
        Ok(contents)
    }

    /// Replace the file contents with `bytes`.
    ///
    /// Targets that cannot seek or truncate get the bytes appended instead.
    pub fn replace_contents(&self, bytes: &[u8]) -> Result<()> {
        let mut file = self.file;
        if let Err(e) = file.seek(SeekFrom::Start(0)).and_then(|_| file.set_len(0)) {
            debug!(component = "LOCK", error = %e, "Seek/truncate unsupported, appending");
        }
        file.write_all(bytes)
            .and_then(|_| file.flush())
            .map_err(|source| self.io_error(source))
    }

    fn io_error(&self, source: io::Error) -> LockError {
        LockError::Io {
            path: self.path.to_path_buf(),
            source,
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(self.file) {
            warn!(
                component = "LOCK",
                path = %self.path.display(),
                error = %e,
                "Failed to release lock"
            );
        }
    }
}
