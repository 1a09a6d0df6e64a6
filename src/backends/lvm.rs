//! LVM Storage Backend
//!
//! Volumes are logical volumes named after their id, created in a plain
//! volume group or, when the configured group reads `vg/pool`, as thin
//! volumes in that pool.

use crate::domain::ports::{LogicalVolume, VolumeId, VolumeStore};
use crate::error::{Error, Result};
use crate::process::{self, command_line, CommandOutput};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

// =============================================================================
// Report Parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct LvsReportList {
    #[serde(default)]
    report: Vec<LvsReport>,
}

#[derive(Debug, Deserialize)]
struct LvsReport {
    #[serde(default)]
    lv: Vec<LvsRow>,
}

#[derive(Debug, Deserialize)]
struct LvsRow {
    lv_name: String,
    vg_name: String,
}

/// Volume group of `lv_name` from a JSON `lvs -o vg_name,lv_name` report
fn volume_group_of(report: &str, lv_name: &str) -> Result<Option<String>> {
    let report: LvsReportList = serde_json::from_str(report)?;
    Ok(report
        .report
        .into_iter()
        .flat_map(|r| r.lv)
        .find(|row| row.lv_name == lv_name)
        .map(|row| row.vg_name))
}

/// Rows of `lvs --noheadings -o lv_name,lv_size --separator '\t'`
fn parse_lv_rows(stdout: &str) -> Vec<LogicalVolume> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            let mut cols = line.split('\t').map(str::trim);
            let name = cols.next()?;
            let size = cols.next()?.trim_end_matches(['B', 'b']);
            match size.parse() {
                Ok(size_bytes) => Some(LogicalVolume {
                    name: name.to_string(),
                    size_bytes,
                }),
                Err(_) => {
                    warn!(line, "skipping unparsable lvs line");
                    None
                }
            }
        })
        .collect()
}

/// Failure of an LVM command
fn lvm_failure(command: String, output: CommandOutput) -> Error {
    error!(
        command = %command,
        stdout = %output.stdout,
        stderr = %output.stderr,
        "command output"
    );
    if output.stderr.contains("Permission denied") {
        return Error::PermissionDenied {
            command,
            stderr: output.stderr,
        };
    }
    Error::Backend {
        reason: if output.success() {
            "warnings on stderr".to_string()
        } else {
            output.status_text()
        },
        command,
        stdout: output.stdout,
        stderr: output.stderr,
    }
}

// =============================================================================
// Store
// =============================================================================

/// Logical volumes in one volume group or thin pool
#[derive(Debug, Clone)]
pub struct LvmStore {
    volume_group: String,
}

impl LvmStore {
    /// `volume_group` is `vg` or `vg/thinpool`
    pub fn new(volume_group: impl Into<String>) -> Self {
        Self {
            volume_group: volume_group.into(),
        }
    }

    fn base_volume_group(&self) -> &str {
        self.volume_group
            .split('/')
            .next()
            .unwrap_or(&self.volume_group)
    }

    /// `lvcreate` arguments; thin pools take a virtual size
    fn create_args(&self, id: &VolumeId, size_bytes: u64) -> Vec<String> {
        let size_flag = if self.volume_group.contains('/') { "-V" } else { "-L" };
        vec![
            size_flag.to_string(),
            format!("{}b", size_bytes),
            self.volume_group.clone(),
            "-n".to_string(),
            id.to_string(),
        ]
    }

    /// `lvs --select` expression for managed volumes in the base group
    fn list_selection(&self, prefix: &str) -> String {
        format!(
            "lv_name=~^{}[^.]+ && vg_name={}",
            prefix,
            self.base_volume_group()
        )
    }

    /// Run a reporting command; stderr warnings count as failure
    async fn report(&self, args: &[&str]) -> Result<String> {
        let output = process::run("lvs", args, None).await?;
        if !output.success() || output.stderr.starts_with("WARNING: ") {
            return Err(lvm_failure(command_line("lvs", args), output));
        }
        Ok(output.stdout)
    }

    /// Run a command that changes volumes; only the exit status counts
    async fn change(&self, program: &str, args: &[&str]) -> Result<()> {
        let output = process::run(program, args, None).await?;
        if !output.success() {
            return Err(lvm_failure(command_line(program, args), output));
        }
        debug!(command = program, stdout = %output.stdout, "command output");
        Ok(())
    }

    /// Group the volume actually lives in, falling back to the configured one
    async fn volume_group_for(&self, id: &VolumeId) -> String {
        let selection = format!("lv_name={}", id);
        let args = [
            "-o",
            "vg_name,lv_name",
            "--reportformat",
            "json",
            "-S",
            selection.as_str(),
        ];
        let found = match self.report(&args).await {
            Ok(stdout) => volume_group_of(&stdout, id.as_str()),
            Err(e) => Err(e),
        };
        match found {
            Ok(Some(vg)) => vg,
            Ok(None) => self.base_volume_group().to_string(),
            Err(e) => {
                error!(pv_id = %id, error = %e, "failed to get logical volume info");
                self.base_volume_group().to_string()
            }
        }
    }
}

#[async_trait]
impl VolumeStore for LvmStore {
    async fn create(&self, id: &VolumeId, size_bytes: u64) -> Result<()> {
        info!(
            pv_id = %id,
            size = size_bytes,
            volume_group = %self.volume_group,
            "creating logical volume"
        );
        let args = self.create_args(id, size_bytes);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.change("lvcreate", &args).await
    }

    async fn remove(&self, id: &VolumeId) -> Result<()> {
        info!(pv_id = %id, "deleting logical volume");
        let target = format!("{}/{}", self.volume_group_for(id).await, id);
        self.change("lvremove", &["--yes", target.as_str()]).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<LogicalVolume>> {
        let selection = self.list_selection(prefix);
        let stdout = self
            .report(&[
                "--noheadings",
                "--units",
                "b",
                "--nosuffix",
                "-o",
                "lv_name,lv_size",
                "--separator",
                "\t",
                "--select",
                selection.as_str(),
            ])
            .await?;
        Ok(parse_lv_rows(&stdout))
    }

    async fn device_path(&self, id: &VolumeId) -> Result<String> {
        Ok(format!("/dev/{}/{}", self.volume_group_for(id).await, id))
    }
}
