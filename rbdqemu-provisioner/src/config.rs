//! Cluster configuration shared by every prober and controller.
//!
//! Built once at startup, validated, then handed out as `Arc<ClusterConfig>`.
//! Nothing in the engine mutates it afterwards.

use serde::Deserialize;

use crate::error::{ProvisionError, Result};
use crate::validate;

/// Default remote login used for every ssh session.
pub const DEFAULT_SSH_USER: &str = "root";

/// Default ssh client binary.
pub const DEFAULT_SSH_BINARY: &str = "ssh";

/// Default QEMU system emulator on the hypervisors.
pub const DEFAULT_QEMU_SYSTEM: &str = "/usr/local/packages/qemu-4.1.0/bin/qemu-system-x86_64";

/// Default qemu-img binary on the hypervisors.
pub const DEFAULT_QEMU_IMG: &str = "/usr/local/packages/qemu-4.1.0/bin/qemu-img";

/// Default tag prepended to a VM's logical name to form its process name.
pub const DEFAULT_VM_NAME_PREFIX: &str = "tf";

/// Default directory holding the per-VLAN `add_tap<vlan>.sh` scripts.
pub const DEFAULT_TAP_SCRIPT_DIR: &str = "/root/bin";

/// Cluster-wide provider configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterConfig {
    /// Ceph user passed to qemu-img when registering images
    #[serde(alias = "ceph_rbduser")]
    pub rbd_user: String,
    /// Ceph admin hosts; only the first one is used
    pub ceph_hosts: Vec<String>,
    /// QEMU hypervisor hosts, scanned in order
    pub qemu_hosts: Vec<String>,
    /// Private key used for every ssh session
    pub ssh_private_key: String,
    /// Remote login name
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// Local ssh client binary
    #[serde(default = "default_ssh_binary")]
    pub ssh_binary: String,
    /// QEMU system emulator path on the hypervisors
    #[serde(default = "default_qemu_system")]
    pub qemu_system: String,
    /// qemu-img path on the hypervisors
    #[serde(default = "default_qemu_img")]
    pub qemu_img: String,
    /// Tag prepended to VM names
    #[serde(default = "default_vm_name_prefix")]
    pub vm_name_prefix: String,
    /// Directory of the tap helper scripts on the hypervisors
    #[serde(default = "default_tap_script_dir")]
    pub tap_script_dir: String,
}

fn default_ssh_user() -> String {
    DEFAULT_SSH_USER.to_string()
}

fn default_ssh_binary() -> String {
    DEFAULT_SSH_BINARY.to_string()
}

fn default_qemu_system() -> String {
    DEFAULT_QEMU_SYSTEM.to_string()
}

fn default_qemu_img() -> String {
    DEFAULT_QEMU_IMG.to_string()
}

fn default_vm_name_prefix() -> String {
    DEFAULT_VM_NAME_PREFIX.to_string()
}

fn default_tap_script_dir() -> String {
    DEFAULT_TAP_SCRIPT_DIR.to_string()
}

impl ClusterConfig {
    /// Create a configuration with the given hosts and default tunables.
    pub fn new(
        rbd_user: impl Into<String>,
        ceph_hosts: Vec<String>,
        qemu_hosts: Vec<String>,
        ssh_private_key: impl Into<String>,
    ) -> Self {
        Self {
            rbd_user: rbd_user.into(),
            ceph_hosts,
            qemu_hosts,
            ssh_private_key: ssh_private_key.into(),
            ssh_user: default_ssh_user(),
            ssh_binary: default_ssh_binary(),
            qemu_system: default_qemu_system(),
            qemu_img: default_qemu_img(),
            vm_name_prefix: default_vm_name_prefix(),
            tap_script_dir: default_tap_script_dir(),
        }
    }

    /// Set the remote login name.
    pub fn with_ssh_user(mut self, user: impl Into<String>) -> Self {
        self.ssh_user = user.into();
        self
    }

    /// Set the VM name prefix.
    pub fn with_vm_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.vm_name_prefix = prefix.into();
        self
    }

    /// Check the configuration and drop duplicate hosts.
    ///
    /// Host lists keep their first-seen order: the first ceph host is the one
    /// every storage command goes to, and hypervisor order decides tie-breaks.
    pub fn validated(mut self) -> Result<Self> {
        dedup_in_order(&mut self.ceph_hosts);
        dedup_in_order(&mut self.qemu_hosts);

        if self.ceph_hosts.is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "at least one ceph host is required".into(),
            ));
        }
        if self.qemu_hosts.is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "at least one qemu host is required".into(),
            ));
        }
        if self.ssh_private_key.trim().is_empty() {
            return Err(ProvisionError::InvalidConfig(
                "ssh_private_key must not be empty".into(),
            ));
        }

        for host in self.ceph_hosts.iter().chain(self.qemu_hosts.iter()) {
            validate::host(host).map_err(ProvisionError::InvalidConfig)?;
        }
        validate::token("ceph_rbduser", &self.rbd_user).map_err(ProvisionError::InvalidConfig)?;
        validate::token("ssh_user", &self.ssh_user).map_err(ProvisionError::InvalidConfig)?;
        validate::token("vm_name_prefix", &self.vm_name_prefix)
            .map_err(ProvisionError::InvalidConfig)?;

        Ok(self)
    }

    /// The storage-admin host all rbd commands are sent to.
    pub fn storage_host(&self) -> Result<&str> {
        self.ceph_hosts
            .first()
            .map(String::as_str)
            .ok_or_else(|| ProvisionError::InvalidConfig("no ceph host configured".into()))
    }

    /// Process name for a VM's logical name, e.g. `tf-helloVm`.
    pub fn vm_id(&self, name: &str) -> String {
        format!("{}-{}", self.vm_name_prefix, name)
    }
}

fn dedup_in_order(hosts: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    hosts.retain(|h| seen.insert(h.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ClusterConfig {
        ClusterConfig::new(
            "admin",
            vec!["192.168.10.20".into(), "192.168.10.18".into()],
            vec!["192.168.3.100".into(), "192.168.3.101".into()],
            "/root/.ssh/id_ed25519",
        )
    }

    #[test]
    fn test_defaults() {
        let config = sample();
        assert_eq!(config.ssh_user, "root");
        assert_eq!(config.vm_name_prefix, "tf");
        assert_eq!(config.vm_id("helloVm"), "tf-helloVm");
        assert_eq!(config.storage_host().unwrap(), "192.168.10.20");
    }

    #[test]
    fn test_validated_dedups_preserving_order() {
        let mut config = sample();
        config.qemu_hosts = vec![
            "192.168.3.101".into(),
            "192.168.3.100".into(),
            "192.168.3.101".into(),
        ];
        let config = config.validated().unwrap();
        assert_eq!(config.qemu_hosts, vec!["192.168.3.101", "192.168.3.100"]);
    }

    #[test]
    fn test_validated_rejects_missing_hosts() {
        let mut config = sample();
        config.ceph_hosts.clear();
        assert!(matches!(config.validated(), Err(ProvisionError::InvalidConfig(_))));

        let mut config = sample();
        config.qemu_hosts.clear();
        assert!(matches!(config.validated(), Err(ProvisionError::InvalidConfig(_))));
    }

    #[test]
    fn test_validated_rejects_shell_metacharacters() {
        let mut config = sample();
        config.ceph_hosts = vec!["10.0.0.1; reboot".into()];
        assert!(config.validated().is_err());

        let config = sample().with_vm_name_prefix("tf x");
        assert!(config.validated().is_err());
    }

    #[test]
    fn test_deserialize_provider_field_names() {
        let yaml = r#"
ceph_rbduser: admin
ceph_hosts: ["192.168.10.20"]
qemu_hosts: ["192.168.3.100", "192.168.3.101"]
ssh_private_key: /root/.ssh/id_ed25519
"#;
        let config: ClusterConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.rbd_user, "admin");
        assert_eq!(config.qemu_hosts.len(), 2);
        assert_eq!(config.qemu_img, DEFAULT_QEMU_IMG);
        assert_eq!(config.tap_script_dir, "/root/bin");
    }
}
