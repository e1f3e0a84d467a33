//! Probes that derive remote state from command output.
//!
//! Nothing here is cached. Each call asks the cluster again.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::commands;
use crate::config::ClusterConfig;
use crate::error::Result;
use crate::parse::{self, ProcessLine};
use crate::traits::RemoteExecutor;
use crate::types::VmLocation;

/// Issues read-only commands against the cluster.
#[derive(Clone)]
pub struct Prober {
    config: Arc<ClusterConfig>,
    executor: Arc<dyn RemoteExecutor>,
}

impl Prober {
    pub fn new(config: Arc<ClusterConfig>, executor: Arc<dyn RemoteExecutor>) -> Self {
        Self { config, executor }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Whether `pool/name` is listed by `rbd ls` on the storage-admin host.
    ///
    /// Only the first ceph host is asked. A transport fault or anything on
    /// stderr is an error, distinct from "not found".
    #[instrument(skip(self))]
    pub async fn volume_exists(&self, pool: &str, name: &str) -> Result<bool> {
        let host = self.config.storage_host()?;
        let command = commands::rbd_list(pool);
        debug!(command = %command, "listing images");

        let listing = self
            .executor
            .run(host, &command)
            .await?
            .require_clean(host)?;

        let found = parse::inventory_contains(&listing.stdout, name);
        if found {
            info!(pool = %pool, image = %name, "found image");
        }
        Ok(found)
    }

    /// Find the hypervisor and pid of a VM's QEMU process.
    ///
    /// Hypervisors are searched in configured order. The first host whose
    /// probe faults or writes to stderr aborts the whole search: a host we
    /// cannot see might be the one running the VM. Lines that mention the id
    /// but are not our QEMU invocation are logged and skipped.
    #[instrument(skip(self))]
    pub async fn locate_vm(&self, name: &str) -> Result<Option<VmLocation>> {
        let vm_id = self.config.vm_id(name);
        let command = commands::process_search(&vm_id);
        debug!(vm_id = %vm_id, "searching hypervisors");

        for host in &self.config.qemu_hosts {
            let output = match self.executor.run(host, &command).await {
                Ok(output) => output.require_clean(host),
                Err(e) => Err(e),
            }
            .map_err(|e| {
                warn!(host = %host, error = %e, "unable to search hypervisor");
                e
            })?;

            for line in output.stdout.lines().filter(|l| !l.trim().is_empty()) {
                match parse::process_line(line, &vm_id) {
                    ProcessLine::Match { pid } => {
                        info!(vm_id = %vm_id, host = %host, pid = pid, "found VM");
                        return Ok(Some(VmLocation {
                            host: host.clone(),
                            pid,
                        }));
                    }
                    ProcessLine::Mismatch(reason) => {
                        warn!(host = %host, "{}", reason);
                    }
                }
            }
        }

        info!(vm_id = %vm_id, "vm not found");
        Ok(None)
    }

    /// `MemAvailable` of one hypervisor in kB.
    pub async fn available_memory_kb(&self, host: &str) -> Result<u64> {
        let output = self
            .executor
            .run(host, commands::MEM_AVAILABLE)
            .await?
            .require_clean(host)?;
        parse::mem_available_kb(&output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvisionError;
    use crate::mock::MockCluster;

    const CEPH: &str = "192.168.10.20";
    const HV_A: &str = "192.168.3.100";
    const HV_B: &str = "192.168.3.101";

    fn setup() -> (Arc<MockCluster>, Prober) {
        let config = ClusterConfig::new(
            "admin",
            vec![CEPH.into(), "192.168.10.18".into()],
            vec![HV_A.into(), HV_B.into()],
            "/root/.ssh/id_ed25519",
        );
        let cluster = Arc::new(MockCluster::new());
        cluster.add_hypervisor(HV_A, 2048).unwrap();
        cluster.add_hypervisor(HV_B, 4096).unwrap();
        cluster.add_pool("rbd").unwrap();
        let prober = Prober::new(Arc::new(config), cluster.clone());
        (cluster, prober)
    }

    #[tokio::test]
    async fn test_volume_exists() {
        let (cluster, prober) = setup();
        assert!(!prober.volume_exists("rbd", "helloImg").await.unwrap());

        cluster.add_image("rbd", "helloImg").unwrap();
        assert!(prober.volume_exists("rbd", "helloImg").await.unwrap());
        assert!(!prober.volume_exists("rbd", "hello").await.unwrap());
    }

    #[tokio::test]
    async fn test_volume_exists_only_asks_first_ceph_host() {
        let (cluster, prober) = setup();
        prober.volume_exists("rbd", "x").await.unwrap();
        let calls = cluster.calls().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].host, CEPH);
        assert_eq!(calls[0].command, "rbd ls -p rbd");
    }

    #[tokio::test]
    async fn test_volume_exists_stderr_is_error() {
        let (cluster, prober) = setup();
        cluster.inject_stderr(None, "rbd ls", "rbd: listing images failed").unwrap();
        let err = prober.volume_exists("rbd", "helloImg").await.unwrap_err();
        assert!(matches!(err, ProvisionError::RemoteStderr { .. }));
    }

    #[tokio::test]
    async fn test_volume_exists_no_failover() {
        let (cluster, prober) = setup();
        cluster.set_unreachable(CEPH, true).unwrap();
        assert!(prober.volume_exists("rbd", "helloImg").await.is_err());
    }

    #[tokio::test]
    async fn test_locate_vm() {
        let (cluster, prober) = setup();
        let pid = cluster
            .spawn_process(HV_B, "/bin/qemu -name tf-helloVm -smp 1 -m 128")
            .unwrap();

        let location = prober.locate_vm("helloVm").await.unwrap().unwrap();
        assert_eq!(location, VmLocation { host: HV_B.into(), pid });
        assert!(prober.locate_vm("otherVm").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_locate_vm_skips_misshapen_lines() {
        let (cluster, prober) = setup();
        // Mentions the id, but -name is not at the expected offset.
        cluster
            .spawn_process(HV_A, "/bin/qemu -smp 1 -name tf-helloVm")
            .unwrap();
        assert!(prober.locate_vm("helloVm").await.unwrap().is_none());

        let pid = cluster
            .spawn_process(HV_B, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();
        let location = prober.locate_vm("helloVm").await.unwrap().unwrap();
        assert_eq!(location.host, HV_B);
        assert_eq!(location.pid, pid);
    }

    #[tokio::test]
    async fn test_locate_vm_skips_misshapen_line_on_same_host() {
        let (cluster, prober) = setup();
        cluster
            .spawn_process(HV_A, "/usr/bin/tail -f /var/log/tf-helloVm.log")
            .unwrap();
        let pid = cluster
            .spawn_process(HV_A, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();

        let location = prober.locate_vm("helloVm").await.unwrap().unwrap();
        assert_eq!(location, VmLocation { host: HV_A.into(), pid });
        // Found on the first host; the second was never asked.
        assert!(cluster.calls().unwrap().iter().all(|c| c.host == HV_A));
    }

    #[tokio::test]
    async fn test_locate_vm_fails_fast() {
        let (cluster, prober) = setup();
        cluster
            .spawn_process(HV_B, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();
        cluster.set_unreachable(HV_A, true).unwrap();

        assert!(prober.locate_vm("helloVm").await.is_err());
        // The search stopped at the first host.
        assert!(cluster.calls().unwrap().iter().all(|c| c.host == HV_A));
    }

    #[tokio::test]
    async fn test_locate_vm_stderr_fails_fast() {
        let (cluster, prober) = setup();
        cluster.inject_stderr(Some(HV_A), "ps axwww", "ps: bad option").unwrap();
        let err = prober.locate_vm("helloVm").await.unwrap_err();
        assert!(matches!(err, ProvisionError::RemoteStderr { .. }));
    }

    #[tokio::test]
    async fn test_available_memory() {
        let (_cluster, prober) = setup();
        assert_eq!(prober.available_memory_kb(HV_B).await.unwrap(), 4096 * 1024);
    }
}
