//! QEMU VM lifecycle.
//!
//! A VM is a daemonized `qemu-system` process on one of the hypervisors, named
//! `<prefix>-<name>`. Its existence and location are always re-derived from
//! the hypervisors' process tables.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::commands;
use crate::config::ClusterConfig;
use crate::error::{ProvisionError, Result};
use crate::probe::Prober;
use crate::selector::HypervisorSelector;
use crate::traits::{RemoteExecutor, ResourceLifecycle};
use crate::types::{CreateOutcome, DeferReason, ResourceId, VmLocation, VmSpec};

/// Launches, finds and kills VM processes.
pub struct VmController {
    config: Arc<ClusterConfig>,
    executor: Arc<dyn RemoteExecutor>,
    prober: Prober,
    selector: HypervisorSelector,
}

impl VmController {
    pub fn new(config: Arc<ClusterConfig>, executor: Arc<dyn RemoteExecutor>) -> Self {
        let prober = Prober::new(config.clone(), executor.clone());
        Self {
            selector: HypervisorSelector::new(prober.clone()),
            prober,
            config,
            executor,
        }
    }

    /// Where the VM's process is running, if anywhere.
    pub async fn locate(&self, name: &str) -> Result<Option<VmLocation>> {
        VmSpec::named(name).validate_identity()?;
        self.prober.locate_vm(name).await
    }

    fn id(&self, spec: &VmSpec) -> ResourceId {
        ResourceId::new(self.config.vm_id(&spec.name))
    }
}

#[async_trait]
impl ResourceLifecycle for VmController {
    type Spec = VmSpec;

    /// Place and launch the VM.
    ///
    /// The backing image is not checked; QEMU reports a missing image on stderr.
    #[instrument(skip(self, spec), fields(vm = %spec.name, cpus = spec.cpus, mem_mb = spec.mem_mb))]
    async fn create(&self, spec: &VmSpec) -> Result<CreateOutcome> {
        spec.validate()?;

        let Some(host) = self.selector.select(spec.mem_mb).await else {
            let reason = DeferReason::NoCapacity {
                required_mb: spec.mem_mb,
            };
            warn!(reason = %reason, "deferring VM creation");
            return Ok(CreateOutcome::Deferred(reason));
        };

        let command = commands::qemu_launch(&self.config, spec);
        info!(host = %host, command = %command, "launching VM");
        self.executor
            .run(&host, &command)
            .await?
            .require_clean(&host)
            .map_err(|e| {
                warn!(host = %host, error = %e, "VM launch failed");
                e
            })?;

        let id = self.id(spec);
        info!(id = %id, host = %host, "VM launched");
        Ok(CreateOutcome::Created(id))
    }

    #[instrument(skip(self, spec), fields(vm = %spec.name))]
    async fn read(&self, spec: &VmSpec) -> Result<Option<ResourceId>> {
        spec.validate_identity()?;

        match self.prober.locate_vm(&spec.name).await {
            Ok(Some(_)) => Ok(Some(self.id(spec))),
            Ok(None) => Ok(None),
            Err(e) => {
                warn!(error = %e, "VM search failed, reporting VM as gone");
                Ok(None)
            }
        }
    }

    async fn update(&self, spec: &VmSpec) -> Result<()> {
        warn!(vm = %spec.name, "update requested");
        Err(ProvisionError::Unsupported(
            "VMs cannot be modified in place".into(),
        ))
    }

    /// Kill the VM's QEMU process.
    ///
    /// Deleting a VM that cannot be found is an error.
    #[instrument(skip(self, spec), fields(vm = %spec.name))]
    async fn delete(&self, spec: &VmSpec) -> Result<()> {
        spec.validate_identity()?;

        let location = match self.prober.locate_vm(&spec.name).await {
            Ok(Some(location)) if location.pid > 1 => location,
            Ok(_) => return Err(ProvisionError::VmNotFound(spec.name.clone())),
            Err(e) => {
                warn!(error = %e, "VM search failed");
                return Err(ProvisionError::VmNotFound(spec.name.clone()));
            }
        };

        let command = commands::kill(location.pid);
        info!(host = %location.host, pid = location.pid, "terminating VM");
        let output = self
            .executor
            .run(&location.host, &command)
            .await
            .map_err(|e| ProvisionError::DeleteFailed {
                name: spec.name.clone(),
                pid: location.pid,
                host: location.host.clone(),
                reason: e.to_string(),
            })?;

        if !output.stderr.is_empty() {
            warn!(stderr = %output.stderr, "kill reported diagnostics");
        }
        Ok(())
    }

    /// Whether the VM is running. A failed search counts as "not running".
    #[instrument(skip(self, spec), fields(vm = %spec.name))]
    async fn exists(&self, spec: &VmSpec) -> Result<bool> {
        spec.validate_identity()?;

        match self.prober.locate_vm(&spec.name).await {
            Ok(location) => Ok(location.is_some()),
            Err(e) => {
                warn!(error = %e, "VM search failed, reporting VM as absent");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;

    const CEPH: &str = "192.168.10.20";
    const HV_A: &str = "192.168.3.100";
    const HV_B: &str = "192.168.3.101";

    fn setup() -> (Arc<MockCluster>, VmController) {
        let config = ClusterConfig::new(
            "admin",
            vec![CEPH.into()],
            vec![HV_A.into(), HV_B.into()],
            "/root/.ssh/id_ed25519",
        );
        let cluster = Arc::new(MockCluster::new());
        cluster.add_image("rbd", "helloImg").unwrap();
        cluster.add_hypervisor(HV_A, 4096).unwrap();
        cluster.add_hypervisor(HV_B, 3072).unwrap();
        let controller = VmController::new(Arc::new(config), cluster.clone());
        (cluster, controller)
    }

    fn hello_vm() -> VmSpec {
        VmSpec::named("helloVm")
            .with_cpus(1)
            .with_memory(2048)
            .with_nic(10, "de:ad:be:ef:ca:fe")
            .with_vnc(":10")
            .with_disk("rbd", "helloImg")
    }

    #[tokio::test]
    async fn test_create_launches_on_freest_host() {
        let (cluster, controller) = setup();

        let outcome = controller.create(&hello_vm()).await.unwrap();
        assert_eq!(outcome.id().map(ResourceId::as_str), Some("tf-helloVm"));

        let procs = cluster.processes(HV_A).unwrap();
        assert_eq!(procs.len(), 1);
        assert!(procs[0].args.contains("-name tf-helloVm -smp 1 -m 2048 -vnc :10"));
        assert!(controller.exists(&hello_vm()).await.unwrap());
    }

    #[tokio::test]
    async fn test_second_vm_goes_to_other_host() {
        let (cluster, controller) = setup();
        controller.create(&hello_vm()).await.unwrap();

        let second = VmSpec { name: "otherVm".into(), ..hello_vm() };
        controller.create(&second).await.unwrap();

        // HV_A dropped to 2048MB after the first launch; HV_B has 3072MB.
        assert_eq!(cluster.processes(HV_B).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_defers_without_capacity() {
        let (cluster, controller) = setup();

        let outcome = controller
            .create(&hello_vm().with_memory(8192))
            .await
            .unwrap();
        assert!(outcome.is_deferred());
        assert!(matches!(
            outcome,
            CreateOutcome::Deferred(DeferReason::NoCapacity { required_mb: 8192 })
        ));
        assert!(cluster.processes(HV_A).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_launch_stderr_is_error() {
        let (cluster, controller) = setup();
        cluster
            .inject_stderr(None, "-name tf-helloVm", "qemu-system-x86_64: could not open tap")
            .unwrap();

        let err = controller.create(&hello_vm()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::RemoteStderr { .. }));
    }

    #[tokio::test]
    async fn test_create_missing_backing_image_is_error() {
        let (_cluster, controller) = setup();
        let spec = hello_vm().with_disk("rbd", "missingImg");
        assert!(controller.create(&spec).await.is_err());
    }

    #[tokio::test]
    async fn test_read_sets_id_when_found() {
        let (cluster, controller) = setup();
        assert!(controller.read(&hello_vm()).await.unwrap().is_none());

        cluster
            .spawn_process(HV_B, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();
        let id = controller.read(&VmSpec::named("helloVm")).await.unwrap();
        assert_eq!(id, Some(ResourceId::new("tf-helloVm")));
    }

    #[tokio::test]
    async fn test_read_on_search_error_reports_gone() {
        let (cluster, controller) = setup();
        cluster.set_unreachable(HV_A, true).unwrap();
        assert!(controller.read(&hello_vm()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_unsupported() {
        let (_cluster, controller) = setup();
        assert!(matches!(
            controller.update(&hello_vm()).await,
            Err(ProvisionError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_kills_process() {
        let (cluster, controller) = setup();
        let pid = cluster
            .spawn_process(HV_B, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();

        controller.delete(&VmSpec::named("helloVm")).await.unwrap();

        assert!(cluster.processes(HV_B).unwrap().is_empty());
        let last = cluster.calls().unwrap().pop().unwrap();
        assert_eq!(last.host, HV_B);
        assert_eq!(last.command, format!("kill {}", pid));
        assert!(!controller.exists(&hello_vm()).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_absent_vm_is_error() {
        let (_cluster, controller) = setup();
        let err = controller.delete(&hello_vm()).await.unwrap_err();
        match err {
            ProvisionError::VmNotFound(name) => assert_eq!(name, "helloVm"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_delete_search_error_is_not_found() {
        let (cluster, controller) = setup();
        cluster
            .spawn_process(HV_B, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();
        cluster.set_unreachable(HV_A, true).unwrap();

        let err = controller.delete(&hello_vm()).await.unwrap_err();
        assert!(matches!(err, ProvisionError::VmNotFound(_)));
        assert_eq!(cluster.processes(HV_B).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_ignores_kill_stderr() {
        let (cluster, controller) = setup();
        cluster
            .spawn_process(HV_A, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();
        cluster
            .inject_stderr(Some(HV_A), "kill", "bash: warning: setlocale: LC_ALL")
            .unwrap();

        controller.delete(&hello_vm()).await.unwrap();
    }

    /// Delegates to the mock but faults every `kill`.
    struct KillFails(Arc<MockCluster>);

    #[async_trait]
    impl RemoteExecutor for KillFails {
        async fn run(&self, host: &str, command: &str) -> Result<crate::traits::CommandOutput> {
            if command.starts_with("kill ") {
                return Err(ProvisionError::CommandFailed {
                    host: host.to_string(),
                    code: Some(1),
                    stderr: "kill: Operation not permitted".into(),
                });
            }
            self.0.run(host, command).await
        }
    }

    #[tokio::test]
    async fn test_delete_kill_fault() {
        let (cluster, _) = setup();
        let pid = cluster
            .spawn_process(HV_B, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();
        let config = ClusterConfig::new(
            "admin",
            vec![CEPH.into()],
            vec![HV_A.into(), HV_B.into()],
            "/root/.ssh/id_ed25519",
        );
        let controller = VmController::new(Arc::new(config), Arc::new(KillFails(cluster)));

        match controller.delete(&hello_vm()).await.unwrap_err() {
            ProvisionError::DeleteFailed { name, pid: p, host, reason } => {
                assert_eq!(name, "helloVm");
                assert_eq!(p, pid);
                assert_eq!(host, HV_B);
                assert!(reason.contains("Operation not permitted"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_exists_maps_errors_to_false() {
        let (cluster, controller) = setup();
        cluster
            .spawn_process(HV_B, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();
        cluster.set_unreachable(HV_A, true).unwrap();
        assert!(!controller.exists(&hello_vm()).await.unwrap());
    }

    #[tokio::test]
    async fn test_locate() {
        let (cluster, controller) = setup();
        let pid = cluster
            .spawn_process(HV_B, "/bin/qemu -name tf-helloVm -smp 1")
            .unwrap();
        let location = controller.locate("helloVm").await.unwrap().unwrap();
        assert_eq!(location, VmLocation { host: HV_B.into(), pid });
    }
}
