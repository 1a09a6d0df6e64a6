//! Storage Backends
//!
//! - [`lvm`]: LVM logical volumes, plain or thin provisioned
//! - [`lifecycle`]: create, delete and list on top of a volume store
//! - [`service`]: the lock-wrapped [`VolumeManager`] implementation
//!
//! The backend is selected once at startup from [`Config::backend`].

pub mod lifecycle;
pub mod lvm;
pub mod service;

pub use lifecycle::LifecycleManager;
pub use lvm::LvmStore;
pub use service::VolumeService;

use crate::config::{BackendKind, Config};
use crate::domain::ports::{VolumeManager, VolumeManagerRef};
use crate::error::Result;
use crate::hypervisor::VirshClient;
use std::sync::Arc;
use tracing::info;

/// Factory for the configured volume manager
pub struct BackendFactory;

impl BackendFactory {
    /// Build the volume manager for `config.backend`
    pub fn create(config: &Config) -> Result<VolumeManagerRef> {
        info!(backend = %config.backend, qemu_url = %config.qemu_url, "initializing backend");

        let virsh = Arc::new(VirshClient::new(config.qemu_url.clone()));
        let manager: Arc<dyn VolumeManager> = match config.backend {
            BackendKind::Lvm => Arc::new(VolumeService::new(
                config,
                virsh.clone(),
                virsh,
                Arc::new(LvmStore::new(config.volume_group.clone())),
            )),
        };
        Ok(manager)
    }
}
