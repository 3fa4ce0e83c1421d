//! Cross-process advisory file lock backing the refresh coordinator's
//! "at most one concurrent refresh per key" guarantee.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{Error, Result};
use crate::platform;

/// An exclusive lock on a single formula/method/identity key, held for the
/// lifetime of this value. Dropping it releases the OS-level lock even if a
/// caller forgets to call [`RefreshLock::release`] explicitly — but callers
/// on the happy and error paths alike should still call it, since release
/// is idempotent and makes the intent explicit at the call site.
pub struct RefreshLock {
    file: File,
    path: PathBuf,
    released: bool,
}

impl RefreshLock {
    /// Where the lock file for `key` lives under `app`'s lock directory.
    /// The key has already passed [`crate::store::validate_key`], so no
    /// further escaping is needed beyond the filename itself.
    fn path_for(app: &str, key: &str) -> PathBuf {
        platform::lock_dir(app).join(format!("{key}.lock"))
    }

    fn open(path: &Path) -> Result<File> {
        if let Some(parent) = path.parent() {
            platform::ensure_private_dir(parent).map_err(|e| Error::LockError(e.to_string()))?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .open(path)
            .map_err(|e| Error::LockError(e.to_string()))
    }

    /// Acquire the lock for `key`, blocking until it becomes available.
    /// Non-reentrant: a second acquire for the same key from the same
    /// process will block forever, the same as flock(2) itself.
    pub fn acquire(app: &str, key: &str) -> Result<Self> {
        let path = Self::path_for(app, key);
        let file = Self::open(&path)?;
        file.lock_exclusive().map_err(|e| Error::LockError(e.to_string()))?;
        Ok(Self {
            file,
            path,
            released: false,
        })
    }

    /// Attempt to acquire the lock without blocking. Returns `Ok(None)` if
    /// another process (or thread) already holds it.
    pub fn try_acquire(app: &str, key: &str) -> Result<Option<Self>> {
        let path = Self::path_for(app, key);
        let file = Self::open(&path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                file,
                path,
                released: false,
            })),
            Err(e) if is_lock_contended(&e) => Ok(None),
            Err(e) => Err(Error::LockError(e.to_string())),
        }
    }

    /// Release the lock. Safe to call more than once; the second call is a
    /// no-op.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.file
            .unlock()
            .map_err(|e| Error::LockError(e.to_string()))?;
        self.released = true;
        Ok(())
    }

    /// The lock file's path, exposed for diagnostics and tests.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RefreshLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

/// fs2 surfaces a held lock as `WouldBlock` on every platform it supports;
/// treat anything else as a genuine I/O failure.
fn is_lock_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_acquire_fails_while_already_held() {
        let app = format!("schlussel-lock-test-{}", std::process::id());
        let key = "formula:device";

        let first = RefreshLock::try_acquire(&app, key).unwrap();
        assert!(first.is_some());

        let second = RefreshLock::try_acquire(&app, key).unwrap();
        assert!(second.is_none());

        drop(first);
        let third = RefreshLock::try_acquire(&app, key).unwrap();
        assert!(third.is_some());
    }

    #[test]
    fn release_is_idempotent() {
        let app = format!("schlussel-lock-test-release-{}", std::process::id());
        let mut lock = RefreshLock::acquire(&app, "formula:manual").unwrap();
        lock.release().unwrap();
        lock.release().unwrap();
    }

    #[test]
    fn distinct_keys_do_not_contend() {
        let app = format!("schlussel-lock-test-distinct-{}", std::process::id());
        let a = RefreshLock::try_acquire(&app, "formula:device").unwrap();
        let b = RefreshLock::try_acquire(&app, "formula:authorization_code").unwrap();
        assert!(a.is_some());
        assert!(b.is_some());
    }
}
