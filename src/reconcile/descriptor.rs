//! Disk device descriptors for hot-plugging volumes

/// A block-backed raw disk as handed to the hypervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskDescriptor {
    /// Host block device, e.g. `/dev/vg0/pv-...`
    pub source_dev: String,
    /// Guest target, e.g. `vdb`
    pub target_dev: String,
    /// Guest-visible serial
    pub serial: String,
}

impl DiskDescriptor {
    /// Render the `<disk>` element
    ///
    /// Write-back caching, discard passed through as unmap, SCSI bus.
    pub fn to_xml(&self) -> String {
        format!(
            "<disk type='block' device='disk'>\n  \
             <driver name='qemu' type='raw' cache='writeback' discard='unmap'/>\n  \
             <source dev='{}'/>\n  \
             <target dev='{}' bus='scsi'/>\n  \
             <serial>{}</serial>\n\
             </disk>\n",
            escape(&self.source_dev),
            escape(&self.target_dev),
            escape(&self.serial),
        )
    }
}

fn escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&apos;")
        .replace('"', "&quot;")
}
