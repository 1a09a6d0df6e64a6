//! Persisted ownership record
//!
//! The contents of a volume's lock file name the VM that owns the volume.
//! Empty means unowned.

use crate::error::Result;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

/// Handle to a volume's ownership record
///
/// Only valid while the volume lock is held; the coordinator hands it to the
/// operation it runs under that lock.
#[derive(Debug, Clone)]
pub struct OwnershipRecord {
    file: Arc<File>,
}

impl OwnershipRecord {
    /// Wrap a lock file opened for read and append
    pub(crate) fn new(file: Arc<File>) -> Self {
        Self { file }
    }

    /// Current owner, empty if unowned
    pub fn owner(&self) -> Result<String> {
        let mut file = &*self.file;
        file.seek(SeekFrom::Start(0))?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Ok(contents.trim().to_string())
    }

    /// Record `vm_name` as owner; the record must be empty
    pub fn claim(&self, vm_name: &str) -> Result<()> {
        if vm_name.is_empty() {
            return Ok(());
        }
        let mut file = &*self.file;
        file.write_all(vm_name.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Empty the record
    pub fn clear(&self) -> Result<()> {
        self.file.set_len(0)?;
        self.file.sync_data()?;
        Ok(())
    }
}
