//! # rbdqemu
//!
//! Operator CLI for the rbdqemu provisioner. Creates, inspects and removes
//! Ceph RBD images and QEMU VMs on the configured cluster by running the rbd
//! and qemu tools over ssh.
//!
//! ## Usage
//! ```bash
//! rbdqemu --config /etc/rbdqemu/provider.yaml image create --pool rbd --name helloImg --size 6M
//! rbdqemu vm exists --name helloVm
//! ```
//!
//! The result is printed as JSON on stdout; logs go to stderr and, if
//! configured, to a size-rotated log file.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rbdqemu_common::LogFileConfig;
use rbdqemu_provisioner::{RemoteExecutor, SshExecutor};
use tracing::{error, info, warn};

mod cli;
mod commands;
mod config;

use cli::Args;
use config::ProviderConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();
    let config_path = args.config_path();

    // Load configuration
    let config = match ProviderConfig::load(&config_path) {
        Ok(cfg) => cfg.with_cli_overrides(&args),
        Err(e) => {
            rbdqemu_common::init_logging(args.log_level.as_deref().unwrap_or("info"))?;
            error!(error = %e, path = %config_path.display(), "Failed to load configuration");
            return Err(e);
        }
    };

    // Initialize logging; the guard flushes the log file on exit
    let _guard = match &config.logging.file {
        Some(path) => {
            let file = LogFileConfig::new(path).with_max_size(config.logging.max_size_bytes);
            Some(rbdqemu_common::init_logging_with_file(&config.logging.level, &file)?)
        }
        None if config.logging.json => {
            rbdqemu_common::init_logging_json(&config.logging.level)?;
            None
        }
        None => {
            rbdqemu_common::init_logging(&config.logging.level)?;
            None
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config_path = %config_path.display(),
        "Starting rbdqemu"
    );

    let cluster = Arc::new(
        config
            .cluster
            .validated()
            .context("Invalid cluster configuration")?,
    );

    info!(
        storage_host = %cluster.storage_host()?,
        hypervisors = ?cluster.qemu_hosts,
        dev = args.dev,
        "Provider configured"
    );

    let executor: Arc<dyn RemoteExecutor> = if args.dev {
        warn!("Development mode: commands run against an in-memory cluster");
        Arc::new(commands::dev_cluster(&cluster, &args.command)?)
    } else {
        Arc::new(SshExecutor::new(&cluster))
    };

    let report = match commands::dispatch(&args.command, cluster, executor).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Command failed");
            return Err(e);
        }
    };

    println!("{}", serde_json::to_string_pretty(&report.output)?);

    if let Some(e) = report.partial_failure {
        error!(error = %e, "Resource created, but a follow-up step failed");
        return Err(anyhow::Error::new(e).context("resource created, but a follow-up step failed"));
    }

    Ok(())
}
