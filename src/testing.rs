//! In-memory fakes of the hypervisor and storage ports for unit tests

use crate::domain::ports::{
    ActionOutput, DeviceAction, Hypervisor, LogicalVolume, VolumeId, VolumeStore,
};
use crate::error::{Error, Result};
use crate::reconcile::ATTACH_SUCCESS_OUTPUT;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const VOL_A: &str = "pv-0190b6a2-7c1e-7d4a-9f3b-2a1c5e8d9f00";
pub const VOL_B: &str = "pv-0190b6a3-1f2e-7a6b-8c4d-5e6f7a8b9c0d";

/// Minimal domain XML with one block disk per `(target, source)`
pub fn domain_xml(disks: &[(&str, &str)]) -> String {
    let mut xml = String::from("<domain type='kvm'>\n  <devices>\n");
    for (target, source) in disks {
        xml.push_str(&format!(
            "    <disk type='block' device='disk'>\n      \
             <source dev='{}'/>\n      \
             <target dev='{}' bus='virtio'/>\n    \
             </disk>\n",
            source, target
        ));
    }
    xml.push_str("  </devices>\n</domain>\n");
    xml
}

// =============================================================================
// Fake Hypervisor
// =============================================================================

/// Keeps domain XML in memory and edits it on attach/detach
#[derive(Default)]
pub struct FakeHypervisor {
    domains: Mutex<Vec<(String, String)>>,
    attach_output: Mutex<Option<String>>,
    attach_error: Mutex<Option<String>>,
    detach_error: Mutex<Option<String>>,
    persist_fails: AtomicBool,
    disconnected: AtomicBool,
    list_delay: Mutex<Option<Duration>>,
    attach_calls: AtomicUsize,
    detach_calls: AtomicUsize,
    persist_calls: AtomicUsize,
}

impl FakeHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_domain(&self, name: &str, xml: &str) {
        let mut domains = self.domains.lock().unwrap();
        domains.retain(|(n, _)| n != name);
        domains.push((name.to_string(), xml.to_string()));
    }

    pub fn remove_domain(&self, name: &str) {
        self.domains.lock().unwrap().retain(|(n, _)| n != name);
    }

    pub fn xml(&self, name: &str) -> Option<String> {
        self.domains
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, xml)| xml.clone())
    }

    pub fn set_attach_output(&self, output: &str) {
        *self.attach_output.lock().unwrap() = Some(output.to_string());
    }

    pub fn fail_attach(&self, stderr: &str) {
        *self.attach_error.lock().unwrap() = Some(stderr.to_string());
    }

    pub fn fail_detach(&self, stderr: &str) {
        *self.detach_error.lock().unwrap() = Some(stderr.to_string());
    }

    pub fn fail_persist(&self) {
        self.persist_fails.store(true, Ordering::SeqCst);
    }

    pub fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }

    /// Make `list_domains` take `delay` before answering
    pub fn delay_listing(&self, delay: Duration) {
        *self.list_delay.lock().unwrap() = Some(delay);
    }

    pub fn attach_calls(&self) -> usize {
        self.attach_calls.load(Ordering::SeqCst)
    }

    pub fn detach_calls(&self) -> usize {
        self.detach_calls.load(Ordering::SeqCst)
    }

    pub fn persist_calls(&self) -> usize {
        self.persist_calls.load(Ordering::SeqCst)
    }

    fn check_connected(&self) -> Result<()> {
        if self.disconnected.load(Ordering::SeqCst) {
            return Err(Error::Connection(
                "error: failed to connect to the hypervisor".into(),
            ));
        }
        Ok(())
    }

    fn edit_domain(&self, name: &str, edit: impl FnOnce(&mut String) -> bool) -> bool {
        let mut domains = self.domains.lock().unwrap();
        match domains.iter_mut().find(|(n, _)| n == name) {
            Some((_, xml)) => edit(xml),
            None => false,
        }
    }
}

fn action_failed(domain: &str, volume: &VolumeId, stderr: String, attach: bool) -> Error {
    let (domain, volume) = (domain.to_string(), volume.to_string());
    let reason = "exit status 1".to_string();
    if attach {
        Error::AttachFailed {
            domain,
            volume,
            stdout: String::new(),
            stderr,
            reason,
        }
    } else {
        Error::DetachFailed {
            domain,
            volume,
            stdout: String::new(),
            stderr,
            reason,
        }
    }
}

#[async_trait]
impl Hypervisor for FakeHypervisor {
    async fn domain_xml(&self, domain: &str) -> Result<String> {
        self.check_connected()?;
        self.xml(domain).ok_or_else(|| Error::DomainNotFound {
            domain: domain.to_string(),
        })
    }

    async fn list_domains(&self) -> Result<Vec<String>> {
        let delay = *self.list_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_connected()?;
        Ok(self
            .domains
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn persist_domain(&self, domain: &str) -> Result<()> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        self.check_connected()?;
        if self.persist_fails.load(Ordering::SeqCst) {
            return Err(Error::Backend {
                command: format!("virsh define --validate {}.xml", domain),
                stdout: String::new(),
                stderr: "error: XML document failed to validate".into(),
                reason: "exit status 1".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceAction for FakeHypervisor {
    async fn attach_device(
        &self,
        domain: &str,
        volume: &VolumeId,
        descriptor: &str,
        _timeout: Duration,
    ) -> Result<ActionOutput> {
        self.attach_calls.fetch_add(1, Ordering::SeqCst);
        self.check_connected()?;
        if let Some(stderr) = self.attach_error.lock().unwrap().clone() {
            return Err(action_failed(domain, volume, stderr, true));
        }

        let inserted = self.edit_domain(domain, |xml| match xml.rfind("</devices>") {
            Some(at) => {
                xml.insert_str(at, descriptor);
                true
            }
            None => false,
        });
        if !inserted {
            return Err(action_failed(
                domain,
                volume,
                format!("error: failed to get domain '{}'", domain),
                true,
            ));
        }

        let stdout = self
            .attach_output
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| ATTACH_SUCCESS_OUTPUT.to_string());
        Ok(ActionOutput {
            stdout,
            stderr: String::new(),
        })
    }

    async fn detach_device(
        &self,
        domain: &str,
        volume: &VolumeId,
        descriptor: &str,
        _timeout: Duration,
    ) -> Result<ActionOutput> {
        self.detach_calls.fetch_add(1, Ordering::SeqCst);
        self.check_connected()?;
        if let Some(stderr) = self.detach_error.lock().unwrap().clone() {
            return Err(action_failed(domain, volume, stderr, false));
        }

        let removed = self.edit_domain(domain, |xml| {
            if !xml.contains(descriptor) {
                return false;
            }
            *xml = xml.replacen(descriptor, "", 1);
            true
        });
        if !removed {
            return Err(action_failed(
                domain,
                volume,
                "error: device not found: no matching disk".into(),
                false,
            ));
        }

        Ok(ActionOutput {
            stdout: "Device detached successfully".into(),
            stderr: String::new(),
        })
    }
}

// =============================================================================
// Fake Volume Store
// =============================================================================

/// Backend volumes kept in creation order
pub struct FakeVolumeStore {
    volume_group: String,
    volumes: Mutex<Vec<LogicalVolume>>,
    create_calls: AtomicUsize,
}

impl FakeVolumeStore {
    pub fn new(volume_group: &str) -> Self {
        Self {
            volume_group: volume_group.to_string(),
            volumes: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Seed a volume that was not created through the store
    pub fn add_volume(&self, name: &str, size_bytes: u64) {
        self.volumes.lock().unwrap().push(LogicalVolume {
            name: name.to_string(),
            size_bytes,
        });
    }

    pub fn names(&self) -> Vec<String> {
        self.volumes
            .lock()
            .unwrap()
            .iter()
            .map(|lv| lv.name.clone())
            .collect()
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VolumeStore for FakeVolumeStore {
    async fn create(&self, id: &VolumeId, size_bytes: u64) -> Result<()> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let mut volumes = self.volumes.lock().unwrap();
        if volumes.iter().any(|lv| lv.name == id.as_str()) {
            return Err(Error::Backend {
                command: format!("lvcreate -n {}", id),
                stdout: String::new(),
                stderr: format!("Logical Volume \"{}\" already exists", id),
                reason: "exit status 5".into(),
            });
        }
        volumes.push(LogicalVolume {
            name: id.to_string(),
            size_bytes,
        });
        Ok(())
    }

    async fn remove(&self, id: &VolumeId) -> Result<()> {
        let mut volumes = self.volumes.lock().unwrap();
        let before = volumes.len();
        volumes.retain(|lv| lv.name != id.as_str());
        if volumes.len() == before {
            return Err(Error::Backend {
                command: format!("lvremove --yes {}/{}", self.volume_group, id),
                stdout: String::new(),
                stderr: format!("Failed to find logical volume \"{}/{}\"", self.volume_group, id),
                reason: "exit status 5".into(),
            });
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<LogicalVolume>> {
        Ok(self
            .volumes
            .lock()
            .unwrap()
            .iter()
            .filter(|lv| lv.name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn device_path(&self, id: &VolumeId) -> Result<String> {
        Ok(format!("/dev/{}/{}", self.volume_group, id))
    }
}
