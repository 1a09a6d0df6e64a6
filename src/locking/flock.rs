//! Non-blocking advisory file locks

use crate::error::{Error, Result};
use rustix::fs::{flock, FlockOperation};
use rustix::io::Errno;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// An exclusive `flock` held on an open file
///
/// The lock belongs to the open file description, so a second open of the
/// same path, even from this process, contends with it. Closing the last
/// handle releases it; [`FileLock::unlock`] releases it explicitly.
#[derive(Debug)]
pub struct FileLock {
    file: Arc<File>,
    path: PathBuf,
}

impl FileLock {
    /// Open `path` with `options` and take an exclusive lock without waiting
    ///
    /// Fails with `Error::LockContention` if another holder has it.
    pub fn try_exclusive(path: impl AsRef<Path>, options: &OpenOptions) -> Result<Self> {
        let path = path.as_ref();
        let file = options.open(path)?;

        match flock(&file, FlockOperation::NonBlockingLockExclusive) {
            Ok(()) => Ok(Self {
                file: Arc::new(file),
                path: path.to_path_buf(),
            }),
            Err(Errno::WOULDBLOCK) => Err(Error::LockContention {
                path: path.to_path_buf(),
            }),
            Err(e) => Err(std::io::Error::from(e).into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Shared handle to the locked file
    pub fn file(&self) -> Arc<File> {
        Arc::clone(&self.file)
    }

    /// Release the lock
    pub fn unlock(self) -> Result<()> {
        flock(&*self.file, FlockOperation::Unlock).map_err(std::io::Error::from)?;
        Ok(())
    }
}
