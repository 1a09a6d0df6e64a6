//! Attach/Detach Reconciler
//!
//! Whether a volume is attached is derived on every call from the domain's
//! live topology; nothing about attachment state is cached. Callers run
//! these operations under the locks of [`crate::locking::LockCoordinator`].

pub mod descriptor;

pub use descriptor::DiskDescriptor;

use crate::domain::ports::{DeviceActionRef, HypervisorRef, VolumeId, VolumeStoreRef};
use crate::error::{Error, Result};
use crate::locking::OwnershipRecord;
use crate::topology::TopologyInspector;
use std::time::Duration;
use tracing::{error, info, warn};

/// Output of a successful hot-plug
pub const ATTACH_SUCCESS_OUTPUT: &str = "Device attached successfully";

/// Settings for the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub volume_prefix: String,
    pub attach_timeout: Duration,
    pub detach_timeout: Duration,
}

/// Idempotent attach and detach of volumes to domains
#[derive(Clone)]
pub struct Reconciler {
    config: ReconcilerConfig,
    inspector: TopologyInspector,
    hypervisor: HypervisorRef,
    actions: DeviceActionRef,
    store: VolumeStoreRef,
}

impl Reconciler {
    pub fn new(
        config: ReconcilerConfig,
        hypervisor: HypervisorRef,
        actions: DeviceActionRef,
        store: VolumeStoreRef,
    ) -> Self {
        Self {
            inspector: TopologyInspector::new(hypervisor.clone(), config.volume_prefix.clone()),
            config,
            hypervisor,
            actions,
            store,
        }
    }

    /// Hot-plug `volume` into `vm_name` unless it is already attached
    pub async fn attach(&self, vm_name: &str, volume: &VolumeId) -> Result<()> {
        let summary = self.inspector.inspect(vm_name).await?;
        if summary.is_attached(volume) {
            warn!(pv_id = %volume, vm_name, "already attached");
            return Ok(());
        }

        let target = summary.next_target.ok_or_else(|| Error::AttachFailed {
            domain: vm_name.to_string(),
            volume: volume.to_string(),
            stdout: String::new(),
            stderr: String::new(),
            reason: "no free device target left".into(),
        })?;

        info!(pv_id = %volume, vm_name, target = %target, "attaching device");

        let descriptor = DiskDescriptor {
            source_dev: self.store.device_path(volume).await?,
            target_dev: target,
            serial: volume.serial(&self.config.volume_prefix),
        };
        let output = self
            .actions
            .attach_device(
                vm_name,
                volume,
                &descriptor.to_xml(),
                self.config.attach_timeout,
            )
            .await?;

        self.persist_best_effort(vm_name).await;

        if output.stdout != ATTACH_SUCCESS_OUTPUT {
            return Err(Error::UnexpectedOutput {
                command: "attach-device".into(),
                output: output.stdout,
            });
        }

        Ok(())
    }

    /// Hot-unplug `volume` from `vm_name` and clear its ownership record
    ///
    /// A missing domain or an already detached volume is success. Every
    /// successful return leaves the record empty, so the owner of a volume
    /// whose VM is gone can still release it.
    pub async fn detach(
        &self,
        vm_name: &str,
        volume: &VolumeId,
        ownership: &OwnershipRecord,
    ) -> Result<()> {
        let summary = match self.inspector.inspect(vm_name).await {
            Ok(summary) => summary,
            Err(Error::DomainNotFound { .. }) => {
                warn!(pv_id = %volume, vm_name, "domain not found, nothing to detach");
                return ownership.clear();
            }
            Err(e) => return Err(e),
        };

        let Some(descriptor) = summary.descriptor(volume) else {
            warn!(pv_id = %volume, vm_name, "couldn't find device in domain");
            return ownership.clear();
        };

        info!(pv_id = %volume, vm_name, xml = %descriptor, "found device xml");
        self.actions
            .detach_device(vm_name, volume, descriptor, self.config.detach_timeout)
            .await?;

        self.persist_best_effort(vm_name).await;

        ownership.clear()
    }

    async fn persist_best_effort(&self, vm_name: &str) {
        if let Err(e) = self.hypervisor.persist_domain(vm_name).await {
            error!(vm_name, error = %e, "couldn't persist domain config");
        }
    }
}
