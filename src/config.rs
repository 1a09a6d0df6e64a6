//! Configuration loading
//!
//! Configuration is a YAML document read from `$CONFIG_PATH`, falling back to
//! [`DEFAULT_CONFIG_PATH`]. Every key except `lock_path` and `volume_group`
//! has a default.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

// =============================================================================
// Constants
// =============================================================================

/// Config file used when `CONFIG_PATH` is unset
pub const DEFAULT_CONFIG_PATH: &str = "/etc/libvirt-storage-attach.yaml";

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "CONFIG_PATH";

const DEFAULT_QEMU_URL: &str = "qemu:///system";
const DEFAULT_VOLUME_PREFIX: &str = "pv-";
const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_millis(2500);
const DEFAULT_LIST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Configuration
// =============================================================================

/// Storage backend discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// LVM logical volumes, plain or thin provisioned
    #[default]
    Lvm,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Lvm => write!(f, "lvm"),
        }
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding one lock file per VM and per volume
    pub lock_path: PathBuf,
    /// Volume group, or `vg/thinpool` for thin provisioning
    pub volume_group: String,
    /// libvirt connection URI
    pub qemu_url: String,
    /// Deadline for hot-plugging a device
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub attach_timeout: Duration,
    /// Deadline for hot-unplugging a device
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub detach_timeout: Duration,
    /// Overall deadline for listing volumes
    #[serde(deserialize_with = "deserialize_duration", serialize_with = "serialize_duration")]
    pub list_timeout: Duration,
    /// Prefix of every volume id
    pub volume_prefix: String,
    /// Storage backend
    pub backend: BackendKind,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_path: PathBuf::new(),
            volume_group: String::new(),
            qemu_url: DEFAULT_QEMU_URL.to_string(),
            attach_timeout: DEFAULT_DEVICE_TIMEOUT,
            detach_timeout: DEFAULT_DEVICE_TIMEOUT,
            list_timeout: DEFAULT_LIST_TIMEOUT,
            volume_prefix: DEFAULT_VOLUME_PREFIX.to_string(),
            backend: BackendKind::default(),
        }
    }
}

impl Config {
    /// Resolve the config path from `CONFIG_PATH`, then load it
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(path)
    }

    /// Load, validate and prepare the config at `path`
    ///
    /// The lock directory is created if it does not exist yet.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config = Self::from_yaml(&contents)?;
        info!(path = %path.display(), config = ?config, "loaded config");

        std::fs::create_dir_all(&config.lock_path)?;
        Ok(config)
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.lock_path.as_os_str().is_empty() {
            return Err(Error::Configuration("lock_path must be set".into()));
        }
        if self.volume_group.is_empty() {
            return Err(Error::Configuration("volume_group must be set".into()));
        }
        if self.volume_prefix.is_empty() {
            return Err(Error::Configuration("volume_prefix must not be empty".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Durations
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Nanos(u64),
    Text(String),
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    match RawDuration::deserialize(deserializer)? {
        RawDuration::Nanos(n) => Ok(Duration::from_nanos(n)),
        RawDuration::Text(s) => parse_duration(&s).map_err(serde::de::Error::custom),
    }
}

fn serialize_duration<S>(d: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&format!("{}ms", d.as_millis()))
}

/// Parse a duration such as "2.5s", "2500ms" or "1m30s"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".into()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(|| Error::DurationParse(format!("missing unit in {}", s)))?;
        let num: f64 = rest[..num_end]
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in {}", s)))?;
        rest = &rest[num_end..];

        let unit_end = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let seconds_per_unit = match &rest[..unit_end] {
            "ns" => 1e-9,
            "us" | "µs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            unit => {
                return Err(Error::DurationParse(format!(
                    "unknown unit '{}' in {}",
                    unit, s
                )))
            }
        };
        total += num * seconds_per_unit;
        rest = &rest[unit_end..];
    }

    Duration::try_from_secs_f64(total)
        .map_err(|e| Error::DurationParse(format!("{} in {}", e, s)))
}
