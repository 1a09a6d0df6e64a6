//! Domain Ports - Core types and trait definitions
//!
//! These traits define the boundaries between the ownership/reconciliation
//! logic and the external systems it drives: the hypervisor, the device
//! hot-plug action and the storage backend.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Length of a canonical hyphenated UUID
pub const UUID_TEXT_LEN: usize = 36;

// =============================================================================
// Volume Identity
// =============================================================================

/// Identifier of a persistent volume: `<prefix><uuid>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeId(String);

impl VolumeId {
    /// Allocate a fresh id; UUID v7 keeps ids ordered by creation time
    pub fn generate(prefix: &str) -> Self {
        Self(format!("{}{}", prefix, Uuid::now_v7()))
    }

    /// Validate `s` as `<prefix><canonical uuid>`
    pub fn parse(prefix: &str, s: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidVolumeId(format!("'{}' should be in format {}<uuid>", s, prefix))
        };
        if !matches_volume_name(prefix, s) {
            return Err(invalid());
        }
        Uuid::try_parse(&s[prefix.len()..]).map_err(|_| invalid())?;
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Disk serial exposed to the guest: the uuid without prefix or hyphens
    pub fn serial(&self, prefix: &str) -> String {
        self.0
            .strip_prefix(prefix)
            .unwrap_or(&self.0)
            .replace('-', "")
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for VolumeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Whether `name` looks like a managed volume: prefix plus UUID-length tail
pub fn matches_volume_name(prefix: &str, name: &str) -> bool {
    name.starts_with(prefix) && name.len() == prefix.len() + UUID_TEXT_LEN
}

// =============================================================================
// Reporting Types
// =============================================================================

/// A volume as reported by `list`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Volume id
    pub id: String,
    /// Size reported by the backend
    pub capacity_bytes: u64,
    /// Domains that currently have the volume attached, in enumeration order
    pub owners: Vec<String>,
}

/// A backend volume as reported by the storage tooling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalVolume {
    pub name: String,
    pub size_bytes: u64,
}

// =============================================================================
// Hypervisor Port
// =============================================================================

/// Port for hypervisor queries
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Live domain XML; `Error::DomainNotFound` if the domain is unknown
    async fn domain_xml(&self, domain: &str) -> Result<String>;

    /// Names of all defined domains, active and inactive
    async fn list_domains(&self) -> Result<Vec<String>>;

    /// Write the live configuration back as the persistent definition
    async fn persist_domain(&self, domain: &str) -> Result<()>;
}

// =============================================================================
// Device Action Port
// =============================================================================

/// Textual result of a hot-plug action that exited successfully
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Port for hot-plugging disk devices into running domains
#[async_trait]
pub trait DeviceAction: Send + Sync {
    /// Hot-plug `descriptor`; fails with `Error::AttachFailed` or `Error::Timeout`
    async fn attach_device(
        &self,
        domain: &str,
        volume: &VolumeId,
        descriptor: &str,
        timeout: Duration,
    ) -> Result<ActionOutput>;

    /// Hot-unplug `descriptor`; fails with `Error::DetachFailed` or `Error::Timeout`
    async fn detach_device(
        &self,
        domain: &str,
        volume: &VolumeId,
        descriptor: &str,
        timeout: Duration,
    ) -> Result<ActionOutput>;
}

// =============================================================================
// Storage Backend Port
// =============================================================================

/// Port for the block storage backend
#[async_trait]
pub trait VolumeStore: Send + Sync {
    /// Create a backing volume named after `id`
    async fn create(&self, id: &VolumeId, size_bytes: u64) -> Result<()>;

    /// Remove the backing volume
    async fn remove(&self, id: &VolumeId) -> Result<()>;

    /// Volumes whose name starts with `prefix`, in backend order
    async fn list(&self, prefix: &str) -> Result<Vec<LogicalVolume>>;

    /// Host block device path backing `id`
    async fn device_path(&self, id: &VolumeId) -> Result<String>;
}

// =============================================================================
// Volume Manager Port
// =============================================================================

/// The operations exposed to the CLI, implemented once per backend
#[async_trait]
pub trait VolumeManager: Send + Sync {
    async fn attach(&self, vm_name: &str, volume: &VolumeId) -> Result<()>;

    /// Hot-unplug `volume` from `vm_name` and release its ownership
    ///
    /// Also releases ownership when the domain is gone or the volume is not
    /// attached, so the recorded owner can always free a volume for delete.
    async fn detach(&self, vm_name: &str, volume: &VolumeId) -> Result<()>;

    async fn create_volume(&self, size_bytes: u64) -> Result<VolumeId>;

    async fn delete_volume(&self, volume: &VolumeId) -> Result<()>;

    async fn list_volumes(&self) -> Result<Vec<VolumeInfo>>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type HypervisorRef = Arc<dyn Hypervisor>;
pub type DeviceActionRef = Arc<dyn DeviceAction>;
pub type VolumeStoreRef = Arc<dyn VolumeStore>;
pub type VolumeManagerRef = Arc<dyn VolumeManager>;
