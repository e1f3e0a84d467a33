//! Dispatch of CLI commands onto the provisioning engine.

use std::sync::Arc;

use anyhow::Result;
use rbdqemu_provisioner::{
    commands as remote, ClusterConfig, CreateOutcome, HypervisorSelector, MockCluster, Prober,
    ProvisionError, RemoteExecutor, ResourceLifecycle, VmController, VolumeController,
};
use serde_json::{json, Value};
use tracing::info;

use crate::cli::{Action, Command};

/// Available memory given to every hypervisor of the development cluster.
pub const DEV_HYPERVISOR_MEMORY_MB: u64 = 16384;

/// What a command printed, plus a failure that happened after the resource
/// was already created.
#[derive(Debug)]
pub struct Report {
    pub output: Value,
    pub partial_failure: Option<ProvisionError>,
}

impl From<Value> for Report {
    fn from(output: Value) -> Self {
        Self {
            output,
            partial_failure: None,
        }
    }
}

/// Run one command against the cluster.
pub async fn dispatch(
    command: &Command,
    config: Arc<ClusterConfig>,
    executor: Arc<dyn RemoteExecutor>,
) -> Result<Report> {
    match command {
        Command::Image { action, image } => {
            let controller = VolumeController::new(config, executor);
            lifecycle(&controller, *action, &image.to_spec()).await
        }
        Command::Vm { action, vm } => {
            let controller = VmController::new(config, executor);
            lifecycle(&controller, *action, &vm.to_spec(*action)?).await
        }
        Command::Select { mem_mb } => {
            let selector = HypervisorSelector::new(Prober::new(config, executor));
            let host = selector.select(*mem_mb).await;
            Ok(json!({ "required_mb": mem_mb, "host": host }).into())
        }
        Command::Locate { name } => {
            let controller = VmController::new(config, executor);
            let location = controller.locate(name).await?;
            Ok(json!({ "name": name, "location": location }).into())
        }
    }
}

async fn lifecycle<L: ResourceLifecycle>(
    controller: &L,
    action: Action,
    spec: &L::Spec,
) -> Result<Report> {
    let report = match action {
        Action::Create => return Ok(create_report(controller.create(spec).await?)),
        Action::Read => {
            let id = controller.read(spec).await?;
            json!({ "id": id })
        }
        Action::Update => {
            controller.update(spec).await?;
            json!({ "updated": true })
        }
        Action::Delete => {
            controller.delete(spec).await?;
            json!({ "deleted": true })
        }
        Action::Exists => {
            let exists = controller.exists(spec).await?;
            json!({ "exists": exists })
        }
    };
    Ok(report.into())
}

fn create_report(outcome: CreateOutcome) -> Report {
    match outcome {
        CreateOutcome::Created(id) => json!({ "status": "created", "id": id }).into(),
        CreateOutcome::CreatedWithError { id, error } => Report {
            output: json!({
                "status": "created_with_error",
                "id": id,
                "error": error.to_string(),
            }),
            partial_failure: Some(error),
        },
        CreateOutcome::Deferred(reason) => {
            json!({ "status": "deferred", "detail": reason.to_string(), "defer": reason }).into()
        }
    }
}

/// Build an in-memory cluster shaped like the configured one.
///
/// Every hypervisor gets [`DEV_HYPERVISOR_MEMORY_MB`]. The resource a command
/// addresses is pre-seeded for every action except create, so a one-shot
/// read, exists or delete has something to find.
pub fn dev_cluster(config: &ClusterConfig, command: &Command) -> Result<MockCluster> {
    let cluster = MockCluster::new();
    for host in &config.qemu_hosts {
        cluster.add_hypervisor(host, DEV_HYPERVISOR_MEMORY_MB)?;
    }

    match command {
        Command::Image { action, image } => {
            cluster.add_pool(&image.pool)?;
            if *action != Action::Create {
                cluster.add_image(&image.pool, &image.name)?;
            }
        }
        Command::Vm { action, vm } => {
            let spec = vm.to_spec(*action)?;
            if !spec.pool.is_empty() && !spec.image.is_empty() {
                cluster.add_image(&spec.pool, &spec.image)?;
            }
            if *action != Action::Create {
                if let Some(host) = config.qemu_hosts.first() {
                    cluster.spawn_process(host, &remote::qemu_launch(config, &spec))?;
                }
            }
        }
        Command::Locate { name } => {
            if let Some(host) = config.qemu_hosts.first() {
                let spec = rbdqemu_provisioner::VmSpec::named(name);
                cluster.spawn_process(host, &remote::qemu_launch(config, &spec))?;
            }
        }
        Command::Select { .. } => {}
    }

    info!(
        hypervisors = config.qemu_hosts.len(),
        "development cluster seeded"
    );
    Ok(cluster)
}
