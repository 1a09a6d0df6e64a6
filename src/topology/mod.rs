//! Domain device topology
//!
//! Parses a domain's disk devices and derives which targets are used, which
//! managed volumes are attached and which target to allocate next.

pub mod inspector;
pub mod targets;

pub use inspector::{parse_disks, DeviceSummary, DiskDevice, TopologyInspector};
pub use targets::{next_free_suffix, suffix_candidates, target_name, target_suffix};
