//! Hypervisor adapters
//!
//! - [`virsh`]: libvirt through the `virsh` command line client

pub mod virsh;

pub use virsh::VirshClient;
