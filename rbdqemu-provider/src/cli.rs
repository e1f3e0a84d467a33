//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use rbdqemu_provisioner::{ProvisionError, VmSpec, VolumeSpec};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/rbdqemu/provider.yaml";

/// rbdqemu - Ceph RBD image and QEMU VM provisioner
#[derive(Parser, Debug)]
#[command(name = "rbdqemu")]
#[command(about = "rbdqemu - Ceph RBD image and QEMU VM provisioner")]
#[command(version)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "RBDQEMU_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Log file path; overrides the config file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable development mode (in-memory cluster, no ssh)
    #[arg(long)]
    pub dev: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Args {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage an RBD image
    Image {
        action: Action,
        #[command(flatten)]
        image: ImageArgs,
    },
    /// Manage a QEMU VM
    Vm {
        action: Action,
        #[command(flatten)]
        vm: VmArgs,
    },
    /// Report the hypervisor a VM of the given size would be placed on
    Select {
        #[arg(long)]
        mem_mb: u64,
    },
    /// Report the hypervisor and pid of a running VM
    Locate {
        #[arg(long)]
        name: String,
    },
}

/// Lifecycle operation to run.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Exists,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ImageArgs {
    /// Ceph pool
    #[arg(long)]
    pub pool: String,

    /// Image name
    #[arg(long)]
    pub name: String,

    /// Image size, e.g. 6M or 10G (create only)
    #[arg(long, default_value = "")]
    pub size: String,
}

impl ImageArgs {
    pub fn to_spec(&self) -> VolumeSpec {
        VolumeSpec::new(&self.pool, &self.name, &self.size)
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct VmArgs {
    /// VM name
    #[arg(long)]
    pub name: String,

    /// Number of vCPUs (create only)
    #[arg(long)]
    pub cpus: Option<u32>,

    /// Memory in MB (create only)
    #[arg(long)]
    pub mem_mb: Option<u64>,

    /// VLAN of the NIC, selects add_tap<vlan>.sh (create only)
    #[arg(long)]
    pub vlan: Option<u32>,

    /// MAC address of the NIC (create only)
    #[arg(long)]
    pub mac: Option<String>,

    /// VNC display, e.g. :10
    #[arg(long)]
    pub vnc: Option<String>,

    /// Pool of the backing image
    #[arg(long)]
    pub pool: Option<String>,

    /// Backing image
    #[arg(long)]
    pub image: Option<String>,
}

impl VmArgs {
    /// Build the spec for `action`.
    ///
    /// `create` needs every launch attribute on the command line; the other
    /// actions only address the VM by name.
    pub fn to_spec(&self, action: Action) -> Result<VmSpec, ProvisionError> {
        if action == Action::Create {
            let missing: Vec<&str> = [
                ("--cpus", self.cpus.is_none()),
                ("--mem-mb", self.mem_mb.is_none()),
                ("--vlan", self.vlan.is_none()),
                ("--mac", self.mac.is_none()),
                ("--vnc", self.vnc.is_none()),
                ("--pool", self.pool.is_none()),
                ("--image", self.image.is_none()),
            ]
            .into_iter()
            .filter_map(|(flag, absent)| absent.then_some(flag))
            .collect();

            if !missing.is_empty() {
                return Err(ProvisionError::InvalidSpec(format!(
                    "vm create requires {}",
                    missing.join(", ")
                )));
            }
        }

        Ok(VmSpec::named(&self.name)
            .with_cpus(self.cpus.unwrap_or_default())
            .with_memory(self.mem_mb.unwrap_or_default())
            .with_nic(
                self.vlan.unwrap_or_default(),
                self.mac.clone().unwrap_or_default(),
            )
            .with_vnc(self.vnc.clone().unwrap_or_default())
            .with_disk(
                self.pool.clone().unwrap_or_default(),
                self.image.clone().unwrap_or_default(),
            ))
    }
}
