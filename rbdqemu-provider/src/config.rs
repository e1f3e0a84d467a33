//! Configuration management for the provider CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rbdqemu_common::DEFAULT_MAX_LOG_SIZE;
use rbdqemu_provisioner::ClusterConfig;
use serde::Deserialize;

use crate::cli::Args;

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// Hosts, credentials and remote tool locations
    pub cluster: ClusterConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ProviderConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn parse(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if let Some(ref file) = args.log_file {
            self.logging.file = Some(file.clone());
        }

        self
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (or any `RUST_LOG`-style directive)
    pub level: String,
    /// Persistent log file; console only when unset
    pub file: Option<PathBuf>,
    /// Rotate the log file once it exceeds this size
    pub max_size_bytes: u64,
    /// Emit JSON lines on stderr instead of text; ignored when `file` is set
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_size_bytes: DEFAULT_MAX_LOG_SIZE,
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    const SAMPLE: &str = r#"
cluster:
  ceph_rbduser: admin
  ceph_hosts: ["192.168.10.20", "192.168.10.18"]
  qemu_hosts: ["192.168.3.100", "192.168.3.101"]
  ssh_private_key: /root/.ssh/id_ed25519
logging:
  level: debug
  file: provider.log
"#;

    #[test]
    fn test_parse() {
        let config = ProviderConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.cluster.rbd_user, "admin");
        assert_eq!(config.cluster.qemu_hosts.len(), 2);
        assert_eq!(config.cluster.vm_name_prefix, "tf");
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("provider.log")));
        assert_eq!(config.logging.max_size_bytes, 131072);
    }

    #[test]
    fn test_logging_section_optional() {
        let yaml = SAMPLE.split("logging:").next().unwrap();
        let config = ProviderConfig::parse(yaml).unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_missing_cluster_rejected() {
        assert!(ProviderConfig::parse("logging:\n  level: info\n").is_err());
    }

    #[test]
    fn test_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = ProviderConfig::load(file.path()).unwrap();
        assert_eq!(config.cluster.ceph_hosts[0], "192.168.10.20");

        let err = ProviderConfig::load("/nonexistent/provider.yaml").unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_cli_overrides() {
        let args = Args::try_parse_from([
            "rbdqemu", "--log-level", "trace", "--log-file", "/var/log/rbdqemu.log", "select",
            "--mem-mb", "1",
        ])
        .unwrap();

        let config = ProviderConfig::parse(SAMPLE).unwrap().with_cli_overrides(&args);
        assert_eq!(config.logging.level, "trace");
        assert_eq!(config.logging.file, Some(PathBuf::from("/var/log/rbdqemu.log")));
    }
}
