//! Advisory file locking for the shared record file.
//!
//! Readers take shared locks; writers upgrade to a non-blocking exclusive
//! lock and abandon the write on contention. The lock is released when the
//! guard drops.

use fs2::FileExt;
use std::fs::File;
use std::io;
use std::ops::{Deref, DerefMut};

/// RAII guard over an OS-level advisory file lock.
#[derive(Debug)]
pub(crate) struct FileLock {
    inner: File,
}

impl FileLock {
    /// Take a shared (read) lock, blocking until it is granted.
    pub fn shared(file: File) -> io::Result<Self> {
        file.lock_shared()?;
        Ok(Self { inner: file })
    }

    /// Try to upgrade to an exclusive lock without blocking.
    ///
    /// Returns `Ok(false)` when another process holds a conflicting lock.
    pub fn try_upgrade_exclusive(&self) -> io::Result<bool> {
        match self.inner.try_lock_exclusive() {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl Deref for FileLock {
    type Target = File;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for FileLock {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // Best-effort cleanup; ignore errors.
        let _ = self.inner.unlock();
    }
}
