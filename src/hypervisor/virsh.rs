//! virsh-backed hypervisor adapter
//!
//! Implements [`Hypervisor`] and [`DeviceAction`] by driving `virsh` against
//! the configured connection URI. Device descriptors are handed over in temp
//! files that are removed once the command returns.

use crate::domain::ports::{ActionOutput, DeviceAction, Hypervisor, VolumeId};
use crate::error::{Error, Result};
use crate::process::{self, command_line, CommandOutput};
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{error, info};

const VIRSH: &str = "virsh";

// =============================================================================
// Client
// =============================================================================

/// Runs virsh commands against one libvirt connection
#[derive(Debug, Clone)]
pub struct VirshClient {
    connect_uri: String,
}

impl VirshClient {
    pub fn new(connect_uri: impl Into<String>) -> Self {
        Self {
            connect_uri: connect_uri.into(),
        }
    }

    pub fn connect_uri(&self) -> &str {
        &self.connect_uri
    }

    async fn virsh(&self, args: &[&str], timeout: Option<Duration>) -> Result<CommandOutput> {
        let connect = format!("--connect={}", self.connect_uri);
        let mut full_args = Vec::with_capacity(args.len() + 1);
        full_args.push(connect.as_str());
        full_args.extend_from_slice(args);
        process::run(VIRSH, &full_args, timeout).await
    }

    /// Run a query whose failure maps onto the hypervisor error taxonomy
    async fn query(&self, domain: Option<&str>, args: &[&str]) -> Result<String> {
        let output = self.virsh(args, None).await?;
        if output.success() {
            return Ok(output.stdout);
        }
        Err(classify_failure(domain, &command_line(VIRSH, args), &output))
    }

    fn descriptor_file(volume: &VolumeId, descriptor: &str) -> Result<NamedTempFile> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-", volume))
            .suffix(".xml")
            .tempfile()?;
        file.write_all(descriptor.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}

/// Map a failed virsh invocation to an error
fn classify_failure(domain: Option<&str>, command: &str, output: &CommandOutput) -> Error {
    let stderr = &output.stderr;
    if let Some(domain) = domain {
        if stderr.contains("Domain not found") || stderr.contains("failed to get domain") {
            return Error::DomainNotFound {
                domain: domain.to_string(),
            };
        }
    }
    if stderr.contains("failed to connect") {
        return Error::Connection(stderr.clone());
    }
    Error::Backend {
        command: command.to_string(),
        stdout: output.stdout.clone(),
        stderr: stderr.clone(),
        reason: output.status_text(),
    }
}

/// Domain names from `virsh list --name`, one per line
fn parse_domain_names(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// =============================================================================
// Hypervisor
// =============================================================================

#[async_trait]
impl Hypervisor for VirshClient {
    async fn domain_xml(&self, domain: &str) -> Result<String> {
        self.query(Some(domain), &["dumpxml", domain]).await
    }

    async fn list_domains(&self) -> Result<Vec<String>> {
        let stdout = self.query(None, &["list", "--all", "--name"]).await?;
        Ok(parse_domain_names(&stdout))
    }

    async fn persist_domain(&self, domain: &str) -> Result<()> {
        info!(vm_name = domain, "persisting domain config");

        let xml = self
            .query(Some(domain), &["dumpxml", "--security-info", domain])
            .await?;
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}-", domain))
            .suffix(".xml")
            .tempfile()?;
        file.write_all(xml.as_bytes())?;
        file.flush()?;

        let path = file.path().to_string_lossy().to_string();
        self.query(Some(domain), &["define", "--validate", path.as_str()])
            .await?;
        Ok(())
    }
}

// =============================================================================
// Device Action
// =============================================================================

#[async_trait]
impl DeviceAction for VirshClient {
    async fn attach_device(
        &self,
        domain: &str,
        volume: &VolumeId,
        descriptor: &str,
        timeout: Duration,
    ) -> Result<ActionOutput> {
        let file = Self::descriptor_file(volume, descriptor)?;
        let path = file.path().to_string_lossy().to_string();

        let output = self
            .virsh(&["attach-device", "--current", domain, path.as_str()], Some(timeout))
            .await?;

        if !output.success() {
            error!(
                vm_name = domain,
                pv_id = %volume,
                stdout = %output.stdout,
                stderr = %output.stderr,
                "failed to attach-device"
            );
            return Err(Error::AttachFailed {
                domain: domain.to_string(),
                volume: volume.to_string(),
                reason: output.status_text(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(ActionOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    async fn detach_device(
        &self,
        domain: &str,
        volume: &VolumeId,
        descriptor: &str,
        timeout: Duration,
    ) -> Result<ActionOutput> {
        let file = Self::descriptor_file(volume, descriptor)?;
        let path = file.path().to_string_lossy().to_string();

        let output = self
            .virsh(&["detach-device", domain, path.as_str()], Some(timeout))
            .await?;

        if !output.success() {
            error!(
                vm_name = domain,
                pv_id = %volume,
                stdout = %output.stdout,
                stderr = %output.stderr,
                "failed to detach-device"
            );
            return Err(Error::DetachFailed {
                domain: domain.to_string(),
                volume: volume.to_string(),
                reason: output.status_text(),
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }

        Ok(ActionOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
