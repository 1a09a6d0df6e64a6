//! Volume Lifecycle Manager
//!
//! Creation, removal and listing of backend volumes. Ownership in listings
//! comes from the live device topology of every domain, never from the lock
//! files.

use crate::capacity::MIN_VOLUME_SIZE;
use crate::domain::ports::{matches_volume_name, HypervisorRef, VolumeId, VolumeInfo, VolumeStoreRef};
use crate::error::{Error, Result};
use crate::topology::TopologyInspector;
use std::collections::BTreeMap;
use tracing::{error, info};

#[derive(Clone)]
pub struct LifecycleManager {
    store: VolumeStoreRef,
    hypervisor: HypervisorRef,
    inspector: TopologyInspector,
    volume_prefix: String,
}

impl LifecycleManager {
    pub fn new(store: VolumeStoreRef, hypervisor: HypervisorRef, volume_prefix: impl Into<String>) -> Self {
        let volume_prefix = volume_prefix.into();
        Self {
            inspector: TopologyInspector::new(hypervisor.clone(), volume_prefix.clone()),
            store,
            hypervisor,
            volume_prefix,
        }
    }

    /// Create the backing volume for a freshly generated id
    ///
    /// If the backend succeeds but the id never reaches the caller, the
    /// volume is orphaned; the id is logged before creation so it can be
    /// found again.
    pub async fn create(&self, id: &VolumeId, size_bytes: u64) -> Result<()> {
        if size_bytes < MIN_VOLUME_SIZE {
            return Err(Error::Validation(format!(
                "volume size {} is below the minimum of {} bytes",
                size_bytes, MIN_VOLUME_SIZE
            )));
        }
        info!(pv_id = %id, size = size_bytes, "creating volume");
        self.store.create(id, size_bytes).await
    }

    pub async fn delete(&self, id: &VolumeId) -> Result<()> {
        self.store.remove(id).await
    }

    /// Managed volumes with the domains they are attached to
    ///
    /// Owners follow domain enumeration order. A domain whose topology
    /// cannot be read is logged and left out.
    pub async fn list(&self) -> Result<Vec<VolumeInfo>> {
        let volumes = self.store.list(&self.volume_prefix).await?;
        let owners = self.attached_volumes().await?;

        let infos: Vec<VolumeInfo> = volumes
            .into_iter()
            .filter(|lv| matches_volume_name(&self.volume_prefix, &lv.name))
            .map(|lv| VolumeInfo {
                owners: owners.get(&lv.name).cloned().unwrap_or_default(),
                id: lv.name,
                capacity_bytes: lv.size_bytes,
            })
            .collect();

        info!(volumes = ?infos, "volume list");
        Ok(infos)
    }

    /// Volume id -> domains with that volume attached
    async fn attached_volumes(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for domain in self.hypervisor.list_domains().await? {
            let summary = match self.inspector.inspect(&domain).await {
                Ok(summary) => summary,
                Err(e) => {
                    error!(vm_name = %domain, error = %e, "failed to inspect domain");
                    continue;
                }
            };
            for id in summary.attached_devices {
                owners.entry(id).or_default().push(domain.clone());
            }
        }

        Ok(owners)
    }
}
