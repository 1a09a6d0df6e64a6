//! libvirt-storage-attach
//!
//! Command line front end: one invocation runs one operation and exits.
//! Results of `create` and `list` go to stdout, logs go to stderr.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use libvirt_storage_attach::capacity::{parse_capacity, MIN_VOLUME_SIZE};
use libvirt_storage_attach::error::EXIT_USAGE;
use libvirt_storage_attach::{BackendFactory, Config, Error, Result, VolumeId};

// =============================================================================
// CLI Arguments
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Operation {
    Attach,
    Detach,
    Create,
    Delete,
    List,
}

/// Attach LVM volumes to libvirt domains with single-VM ownership
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Operation to run
    #[arg(long, value_enum)]
    operation: Operation,

    /// Volume id, required for attach, detach and delete
    #[arg(long)]
    pv_id: Option<String>,

    /// Domain name, required for attach and detach
    #[arg(long)]
    vm_name: Option<String>,

    /// Volume size for create, e.g. 10G or 1073741824
    #[arg(long)]
    size: Option<String>,

    /// Config file (defaults to $CONFIG_PATH, then /etc/libvirt-storage-attach.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn vm_name(&self) -> Result<&str> {
        self.vm_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| Error::Validation("--vm-name is required".into()))
    }

    fn volume(&self, config: &Config) -> Result<VolumeId> {
        let pv_id = self
            .pv_id
            .as_deref()
            .ok_or_else(|| Error::Validation("--pv-id is required".into()))?;
        VolumeId::parse(&config.volume_prefix, pv_id)
    }

    fn size(&self) -> Result<u64> {
        let size = self
            .size
            .as_deref()
            .ok_or_else(|| Error::Validation("--size is required".into()))?;
        let bytes = parse_capacity(size)?;
        if bytes < MIN_VOLUME_SIZE {
            return Err(Error::Validation(format!(
                "--size must be at least 1GiB, got {}",
                size
            )));
        }
        Ok(bytes)
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("{}", e);
        std::process::exit(EXIT_USAGE);
    }

    if let Err(e) = run(&args).await {
        error!(operation = ?args.operation, error = %e, transient = e.is_transient(), "operation failed");
        std::process::exit(e.exit_code());
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    info!(
        version = libvirt_storage_attach::VERSION,
        operation = ?args.operation,
        "starting"
    );

    let manager = BackendFactory::create(&config)?;

    match args.operation {
        Operation::Attach => {
            let vm_name = args.vm_name()?;
            manager.attach(vm_name, &args.volume(&config)?).await
        }
        Operation::Detach => {
            let vm_name = args.vm_name()?;
            manager.detach(vm_name, &args.volume(&config)?).await
        }
        Operation::Create => {
            let id = manager.create_volume(args.size()?).await?;
            println!("{}", id);
            Ok(())
        }
        Operation::Delete => manager.delete_volume(&args.volume(&config)?).await,
        Operation::List => {
            let volumes = manager.list_volumes().await?;
            println!("{}", serde_json::to_string(&volumes)?);
            Ok(())
        }
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let initialized = if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    initialized.map_err(|e| Error::Configuration(format!("Failed to initialize logging: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("libvirt-storage-attach").chain(argv.iter().copied()))
            .unwrap()
    }

    fn config() -> Config {
        Config::from_yaml("lock_path: /run/lsa\nvolume_group: vg0\n").unwrap()
    }

    #[test]
    fn test_attach_arguments() {
        let args = parse(&[
            "--operation",
            "attach",
            "--pv-id",
            "pv-0190b6a2-7c1e-7d4a-9f3b-2a1c5e8d9f00",
            "--vm-name",
            "vm1",
        ]);

        assert_eq!(args.operation, Operation::Attach);
        assert_eq!(args.vm_name().unwrap(), "vm1");
        assert!(args.volume(&config()).is_ok());
    }

    #[test]
    fn test_missing_arguments() {
        let args = parse(&["--operation", "detach", "--vm-name", ""]);

        assert_matches!(args.vm_name(), Err(Error::Validation(_)));
        assert_matches!(args.volume(&config()), Err(Error::Validation(_)));
        assert_matches!(args.size(), Err(Error::Validation(_)));
    }

    #[test]
    fn test_create_size() {
        assert_eq!(parse(&["--operation", "create", "--size", "10G"]).size().unwrap(), 10 << 30);
        assert_matches!(
            parse(&["--operation", "create", "--size", "512M"]).size(),
            Err(Error::Validation(_))
        );
        assert_matches!(
            parse(&["--operation", "create", "--size", "lots"]).size(),
            Err(Error::CapacityParse(_))
        );
    }

    #[test]
    fn test_invalid_volume_id() {
        let args = parse(&["--operation", "delete", "--pv-id", "pv-123"]);
        assert_matches!(args.volume(&config()), Err(Error::InvalidVolumeId(_)));
    }

    #[test]
    fn test_unknown_operation_rejected() {
        assert!(Args::try_parse_from(["libvirt-storage-attach", "--operation", "resize"]).is_err());
    }
}
