//! Volume Service
//!
//! Implements [`VolumeManager`] on top of any [`crate::domain::ports::VolumeStore`]:
//! every mutating operation runs inside the [`LockCoordinator`], then hands
//! off to the reconciler or the lifecycle manager.

use crate::backends::lifecycle::LifecycleManager;
use crate::config::Config;
use crate::domain::ports::{
    DeviceActionRef, HypervisorRef, VolumeId, VolumeInfo, VolumeManager, VolumeStoreRef,
};
use crate::error::{Error, Result};
use crate::locking::LockCoordinator;
use crate::reconcile::{Reconciler, ReconcilerConfig};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub struct VolumeService {
    locks: LockCoordinator,
    reconciler: Reconciler,
    lifecycle: LifecycleManager,
    volume_prefix: String,
    list_timeout: Duration,
}

impl VolumeService {
    pub fn new(
        config: &Config,
        hypervisor: HypervisorRef,
        actions: DeviceActionRef,
        store: VolumeStoreRef,
    ) -> Self {
        let reconciler = Reconciler::new(
            ReconcilerConfig {
                volume_prefix: config.volume_prefix.clone(),
                attach_timeout: config.attach_timeout,
                detach_timeout: config.detach_timeout,
            },
            hypervisor.clone(),
            actions,
            store.clone(),
        );
        Self {
            locks: LockCoordinator::new(&config.lock_path),
            reconciler,
            lifecycle: LifecycleManager::new(store, hypervisor, config.volume_prefix.clone()),
            volume_prefix: config.volume_prefix.clone(),
            list_timeout: config.list_timeout,
        }
    }
}

#[async_trait]
impl VolumeManager for VolumeService {
    async fn attach(&self, vm_name: &str, volume: &VolumeId) -> Result<()> {
        info!(pv_id = %volume, vm_name, "attach");
        self.locks
            .with_lock(true, vm_name, volume, |_| self.reconciler.attach(vm_name, volume))
            .await
    }

    async fn detach(&self, vm_name: &str, volume: &VolumeId) -> Result<()> {
        info!(pv_id = %volume, vm_name, "detach");
        self.locks
            .with_lock(true, vm_name, volume, |record| async move {
                self.reconciler.detach(vm_name, volume, &record).await
            })
            .await
    }

    async fn create_volume(&self, size_bytes: u64) -> Result<VolumeId> {
        let id = VolumeId::generate(&self.volume_prefix);
        self.locks
            .with_lock(false, "", &id, |_| self.lifecycle.create(&id, size_bytes))
            .await?;
        Ok(id)
    }

    async fn delete_volume(&self, volume: &VolumeId) -> Result<()> {
        info!(pv_id = %volume, "delete");
        self.locks
            .with_lock(false, "", volume, |_| self.lifecycle.delete(volume))
            .await
    }

    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>> {
        tokio::time::timeout(self.list_timeout, self.lifecycle.list())
            .await
            .map_err(|_| Error::Timeout {
                command: "list".into(),
                timeout: self.list_timeout,
            })?
    }
}
