//! Ownership Lock Coordinator
//!
//! Serializes operations across processes with two advisory locks, one per
//! VM and one per volume, both living as files under the lock directory.
//! Acquisition never waits: contention fails the operation at once, so two
//! operations needing the same pair in opposite order cannot deadlock.

use crate::domain::ports::VolumeId;
use crate::error::{Error, Result};
use crate::locking::flock::FileLock;
use crate::locking::ownership::OwnershipRecord;
use std::fs::OpenOptions;
use std::future::Future;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Coordinates the per-VM and per-volume locks under one directory
#[derive(Debug, Clone)]
pub struct LockCoordinator {
    lock_dir: PathBuf,
}

/// Locks held for the duration of one operation
struct HeldLocks {
    vm: Option<FileLock>,
    volume: FileLock,
}

impl HeldLocks {
    /// Release the VM lock, then the volume lock
    fn release(self) -> Result<()> {
        let vm_released = match self.vm {
            Some(lock) => lock.unlock(),
            None => Ok(()),
        };
        let volume_released = self.volume.unlock();
        vm_released.and(volume_released)
    }

    fn release_logged(self) {
        if let Err(e) = self.release() {
            warn!(error = %e, "failed to release locks");
        }
    }
}

impl LockCoordinator {
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
        }
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Path of the lock file for a VM or volume name
    pub fn lock_file(&self, name: &str) -> PathBuf {
        self.lock_dir.join(name)
    }

    /// Run `operation` while holding the volume lock, and the VM lock if
    /// `lock_vm` is set
    ///
    /// The volume's ownership record must be empty or equal to `vm_name`,
    /// otherwise the call fails with `Error::OwnershipConflict` before
    /// `operation` runs. An empty record is claimed for `vm_name` first;
    /// `vm_name` is empty for operations not scoped to a VM, which therefore
    /// only proceed on unowned volumes.
    ///
    /// Locks are released whatever the outcome. A release failure is only
    /// returned when `operation` itself succeeded.
    pub async fn with_lock<T, F, Fut>(
        &self,
        lock_vm: bool,
        vm_name: &str,
        volume: &VolumeId,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce(OwnershipRecord) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let held = self.acquire(lock_vm, vm_name, volume)?;

        let record = match self.claim(&held, vm_name, volume) {
            Ok(record) => record,
            Err(e) => {
                held.release_logged();
                return Err(e);
            }
        };

        let outcome = operation(record).await;
        let released = held.release();

        if let (Err(op_err), Err(release_err)) = (&outcome, &released) {
            warn!(
                pv_id = %volume,
                vm_name,
                error = %release_err,
                operation_error = %op_err,
                "failed to release locks after failed operation"
            );
        }
        let value = outcome?;
        released?;
        Ok(value)
    }

    fn acquire(&self, lock_vm: bool, vm_name: &str, volume: &VolumeId) -> Result<HeldLocks> {
        let vm = if lock_vm {
            validate_lock_name(vm_name)?;
            let mut options = OpenOptions::new();
            options.write(true).create(true);
            Some(FileLock::try_exclusive(self.lock_file(vm_name), &options)?)
        } else {
            None
        };

        let mut options = OpenOptions::new();
        options.read(true).append(true).create(true).mode(0o600);
        let volume = match FileLock::try_exclusive(self.lock_file(volume.as_str()), &options) {
            Ok(lock) => lock,
            Err(e) => {
                if let Some(vm) = vm {
                    if let Err(release_err) = vm.unlock() {
                        warn!(vm_name, error = %release_err, "failed to release VM lock");
                    }
                }
                return Err(e);
            }
        };

        debug!(lock = %volume.path().display(), lock_vm, "locks acquired");
        Ok(HeldLocks { vm, volume })
    }

    fn claim(&self, held: &HeldLocks, vm_name: &str, volume: &VolumeId) -> Result<OwnershipRecord> {
        let record = OwnershipRecord::new(held.volume.file());
        let owner = record.owner()?;
        info!(pv_id = %volume, vm_name = %owner, "device ownership");

        if !owner.is_empty() && owner != vm_name {
            return Err(Error::OwnershipConflict {
                volume: volume.to_string(),
                requested: vm_name.to_string(),
                owner,
            });
        }

        if owner.is_empty() {
            record.claim(vm_name)?;
        }

        Ok(record)
    }
}

/// VM names become file names in the lock directory
fn validate_lock_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::Validation(format!(
            "'{}' cannot be used as a VM name",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::VOL_A;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn setup() -> (LockCoordinator, VolumeId, TempDir) {
        let tmp = TempDir::new().unwrap();
        let coordinator = LockCoordinator::new(tmp.path());
        let volume = VolumeId::parse("pv-", VOL_A).unwrap();
        (coordinator, volume, tmp)
    }

    fn owner_on_disk(coordinator: &LockCoordinator, volume: &VolumeId) -> String {
        std::fs::read_to_string(coordinator.lock_file(volume.as_str())).unwrap()
    }

    #[tokio::test]
    async fn test_claims_empty_record() {
        let (coordinator, volume, _tmp) = setup();

        let seen = coordinator
            .with_lock(true, "vm1", &volume, |record| async move { record.owner() })
            .await
            .unwrap();

        assert_eq!(seen, "vm1");
        assert_eq!(owner_on_disk(&coordinator, &volume), "vm1");
        assert!(coordinator.lock_file("vm1").exists());
    }

    #[tokio::test]
    async fn test_same_owner_reenters() {
        let (coordinator, volume, _tmp) = setup();

        for _ in 0..2 {
            coordinator
                .with_lock(true, "vm1", &volume, |_| async { Ok(()) })
                .await
                .unwrap();
        }
        assert_eq!(owner_on_disk(&coordinator, &volume), "vm1");
    }

    #[tokio::test]
    async fn test_conflict_skips_operation() {
        let (coordinator, volume, _tmp) = setup();
        coordinator
            .with_lock(true, "vm1", &volume, |_| async { Ok(()) })
            .await
            .unwrap();

        let mut ran = false;
        let result = coordinator
            .with_lock(true, "vm2", &volume, |_| {
                ran = true;
                async { Ok(()) }
            })
            .await;

        assert_matches!(
            result,
            Err(Error::OwnershipConflict { owner, requested, .. })
                if owner == "vm1" && requested == "vm2"
        );
        assert!(!ran);
        assert_eq!(owner_on_disk(&coordinator, &volume), "vm1");

        // both locks were released on the conflict path
        coordinator
            .with_lock(true, "vm2", &VolumeId::generate("pv-"), |_| async { Ok(()) })
            .await
            .unwrap();
        assert_matches!(
            coordinator
                .with_lock(true, "vm2", &volume, |_| async { Ok(()) })
                .await,
            Err(Error::OwnershipConflict { .. })
        );
    }

    #[tokio::test]
    async fn test_vm_agnostic_requires_unowned() {
        let (coordinator, volume, _tmp) = setup();

        coordinator
            .with_lock(false, "", &volume, |_| async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(owner_on_disk(&coordinator, &volume), "");

        coordinator
            .with_lock(true, "vm1", &volume, |_| async { Ok(()) })
            .await
            .unwrap();
        assert_matches!(
            coordinator
                .with_lock(false, "", &volume, |_| async { Ok(()) })
                .await,
            Err(Error::OwnershipConflict { owner, .. }) if owner == "vm1"
        );
    }

    #[tokio::test]
    async fn test_contention_while_held() {
        let (coordinator, volume, _tmp) = setup();
        let other = VolumeId::generate("pv-");

        coordinator
            .with_lock(true, "vm1", &volume, |_| async {
                // same VM, different volume
                assert_matches!(
                    coordinator
                        .with_lock(true, "vm1", &other, |_| async { Ok(()) })
                        .await,
                    Err(Error::LockContention { .. })
                );
                // same volume, no VM lock
                assert_matches!(
                    coordinator
                        .with_lock(false, "", &volume, |_| async { Ok(()) })
                        .await,
                    Err(Error::LockContention { .. })
                );
                // unrelated VM and volume proceed
                coordinator
                    .with_lock(true, "vm2", &other, |_| async { Ok(()) })
                    .await
            })
            .await
            .unwrap();

        // released afterwards
        coordinator
            .with_lock(true, "vm1", &volume, |_| async { Ok(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_volume_contention_releases_vm_lock() {
        let (coordinator, volume, _tmp) = setup();
        let mut options = OpenOptions::new();
        options.read(true).append(true).create(true);
        let blocker = FileLock::try_exclusive(coordinator.lock_file(volume.as_str()), &options)
            .unwrap();

        assert_matches!(
            coordinator
                .with_lock(true, "vm1", &volume, |_| async { Ok(()) })
                .await,
            Err(Error::LockContention { path }) if path.ends_with(volume.as_str())
        );
        blocker.unlock().unwrap();

        // VM lock was not leaked
        coordinator
            .with_lock(true, "vm1", &volume, |_| async { Ok(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_operation_error_still_releases() {
        let (coordinator, volume, _tmp) = setup();

        let result: Result<()> = coordinator
            .with_lock(true, "vm1", &volume, |_| async {
                Err(Error::Validation("boom".into()))
            })
            .await;
        assert_matches!(result, Err(Error::Validation(_)));

        coordinator
            .with_lock(true, "vm1", &volume, |_| async { Ok(()) })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_rejects_path_like_vm_names() {
        let (coordinator, volume, _tmp) = setup();

        for name in ["", "..", "a/b"] {
            assert_matches!(
                coordinator
                    .with_lock(true, name, &volume, |_| async { Ok(()) })
                    .await,
                Err(Error::Validation(_))
            );
        }
    }
}
