//! Topology Inspector
//!
//! Derives a [`DeviceSummary`] from a domain's live XML: which targets are
//! taken, which managed volumes are attached (with their verbatim disk
//! elements, needed for hot-unplug) and the next free target.

use crate::domain::ports::{matches_volume_name, HypervisorRef, VolumeId};
use crate::error::{Error, Result};
use crate::topology::targets::{next_free_suffix, target_name, target_suffix};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// =============================================================================
// Disk Records
// =============================================================================

/// One `<disk>` element of a domain definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDevice {
    /// `target/@dev`, e.g. `vda`
    pub target: Option<String>,
    /// `source/@dev`, or `source/@file` for file-backed disks
    pub source: Option<String>,
    /// The element exactly as it appears in the domain XML
    pub raw_descriptor: String,
}

impl DiskDevice {
    /// Last path component of the source, the candidate volume id
    pub fn source_name(&self) -> Option<&str> {
        self.source
            .as_deref()
            .and_then(|source| source.rsplit('/').next())
            .filter(|name| !name.is_empty())
    }
}

/// Parse every `/domain/devices/disk` element
pub fn parse_disks(xml: &str) -> Result<Vec<DiskDevice>> {
    let doc = roxmltree::Document::parse(xml).map_err(|e| Error::DomainXml(e.to_string()))?;
    let root = doc.root_element();
    if !root.has_tag_name("domain") {
        return Err(Error::DomainXml(format!(
            "expected <domain> root, found <{}>",
            root.tag_name().name()
        )));
    }

    let disks = root
        .children()
        .filter(|n| n.has_tag_name("devices"))
        .flat_map(|devices| devices.children().filter(|n| n.has_tag_name("disk")))
        .map(|disk| {
            let child_attr = |tag: &str, attrs: &[&str]| {
                disk.children()
                    .find(|n| n.has_tag_name(tag))
                    .and_then(|n| attrs.iter().find_map(|a| n.attribute(*a)))
                    .map(str::to_string)
            };
            DiskDevice {
                target: child_attr("target", &["dev"]),
                source: child_attr("source", &["dev", "file"]),
                raw_descriptor: xml[disk.range()].to_string(),
            }
        })
        .collect();

    Ok(disks)
}

// =============================================================================
// Device Summary
// =============================================================================

/// Point-in-time view of a domain's disks; never persisted
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSummary {
    /// Suffixes taken by `sd*`/`vd*` targets
    pub used_targets: BTreeSet<String>,
    /// Managed volume ids currently attached
    pub attached_devices: BTreeSet<String>,
    /// Verbatim disk element per attached volume id
    pub device_descriptor_by_id: BTreeMap<String, String>,
    /// Lowest free target (`vdX`), `None` when the suffix space is exhausted
    pub next_target: Option<String>,
}

impl DeviceSummary {
    /// Build a summary from parsed disks, recognising volumes by `prefix`
    pub fn from_disks(disks: &[DiskDevice], prefix: &str) -> Self {
        let mut summary = DeviceSummary::default();

        for disk in disks {
            if let Some(suffix) = disk.target.as_deref().and_then(target_suffix) {
                summary.used_targets.insert(suffix.to_string());
            }

            if let Some(name) = disk.source_name() {
                if matches_volume_name(prefix, name) {
                    summary.attached_devices.insert(name.to_string());
                    summary
                        .device_descriptor_by_id
                        .insert(name.to_string(), disk.raw_descriptor.clone());
                }
            }
        }

        summary.next_target = next_free_suffix(&summary.used_targets).map(|s| target_name(&s));
        summary
    }

    pub fn is_attached(&self, volume: &VolumeId) -> bool {
        self.attached_devices.contains(volume.as_str())
    }

    pub fn descriptor(&self, volume: &VolumeId) -> Option<&str> {
        self.device_descriptor_by_id
            .get(volume.as_str())
            .map(String::as_str)
    }
}

// =============================================================================
// Inspector
// =============================================================================

/// Reads domain topology through the hypervisor port
#[derive(Clone)]
pub struct TopologyInspector {
    hypervisor: HypervisorRef,
    volume_prefix: String,
}

impl TopologyInspector {
    pub fn new(hypervisor: HypervisorRef, volume_prefix: impl Into<String>) -> Self {
        Self {
            hypervisor,
            volume_prefix: volume_prefix.into(),
        }
    }

    /// Inspect `domain`
    ///
    /// Side-effect free. The result is only trustworthy while the caller
    /// holds the locks covering the decision made from it.
    pub async fn inspect(&self, domain: &str) -> Result<DeviceSummary> {
        let xml = self.hypervisor.domain_xml(domain).await?;
        let disks = parse_disks(&xml)?;
        for disk in &disks {
            debug!(
                vm_name = domain,
                target = disk.target.as_deref().unwrap_or(""),
                device = disk.source.as_deref().unwrap_or(""),
                "found device"
            );
        }
        Ok(DeviceSummary::from_disks(&disks, &self.volume_prefix))
    }
}
