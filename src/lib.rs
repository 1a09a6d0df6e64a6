//! libvirt-storage-attach - Block Volume Ownership for libvirt Domains
//!
//! Creates, deletes and lists LVM-backed volumes and hot-plugs them into
//! libvirt domains, with at most one owning VM per volume enforced through
//! advisory lock files shared by every running instance.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                 CLI (attach/detach/create/delete/list)       │
//! ├──────────────────────────────────────────────────────────────┤
//! │                     VolumeService (backends)                 │
//! │  ┌────────────────────┐  ┌──────────────────────────────┐    │
//! │  │  LockCoordinator   │  │  Reconciler / Lifecycle      │    │
//! │  │  (flock + owner)   │  │  (attach, detach, create...) │    │
//! │  └────────────────────┘  └──────────────┬───────────────┘    │
//! │                                         │                    │
//! │                          ┌──────────────┴───────────────┐    │
//! │                          │  TopologyInspector           │    │
//! │                          │  (domain XML -> summary)     │    │
//! │                          └──────────────────────────────┘    │
//! ├──────────────────────────────────────────────────────────────┤
//! │   Hypervisor / DeviceAction (virsh)  │  VolumeStore (LVM)    │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`backends`]: backend selection, the LVM store and the volume service
//! - [`reconcile`]: idempotent attach and detach
//! - [`locking`]: per-VM and per-volume locks plus the ownership record
//! - [`topology`]: domain disk inspection and target allocation
//! - [`hypervisor`]: virsh adapter
//! - [`domain`]: core types and ports
//! - [`config`]: YAML configuration
//! - [`error`]: error types and exit codes

pub mod backends;
pub mod capacity;
pub mod config;
pub mod domain;
pub mod error;
pub mod hypervisor;
pub mod locking;
pub mod process;
pub mod reconcile;
pub mod topology;

#[cfg(test)]
mod testing;

pub use backends::{BackendFactory, LifecycleManager, LvmStore, VolumeService};
pub use config::{BackendKind, Config};
pub use domain::ports::{
    DeviceAction, Hypervisor, LogicalVolume, VolumeId, VolumeInfo, VolumeManager,
    VolumeManagerRef, VolumeStore,
};
pub use error::{Error, Result};
pub use hypervisor::VirshClient;
pub use locking::{LockCoordinator, OwnershipRecord};
pub use reconcile::Reconciler;
pub use topology::{DeviceSummary, TopologyInspector};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
