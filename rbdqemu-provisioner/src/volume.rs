//! RBD image lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::commands;
use crate::config::ClusterConfig;
use crate::error::{ProvisionError, Result};
use crate::probe::Prober;
use crate::selector::HypervisorSelector;
use crate::traits::{RemoteExecutor, ResourceLifecycle};
use crate::types::{CreateOutcome, ResourceId, VolumeSpec};

/// Memory requirement used when picking a hypervisor to run qemu-img:
/// any host with free memory will do.
const REGISTRATION_MEMORY_MB: u64 = 1;

/// Creates, inspects and removes RBD images on the storage-admin host.
pub struct VolumeController {
    config: Arc<ClusterConfig>,
    executor: Arc<dyn RemoteExecutor>,
    prober: Prober,
    selector: HypervisorSelector,
}

impl VolumeController {
    pub fn new(config: Arc<ClusterConfig>, executor: Arc<dyn RemoteExecutor>) -> Self {
        let prober = Prober::new(config.clone(), executor.clone());
        Self {
            selector: HypervisorSelector::new(prober.clone()),
            prober,
            config,
            executor,
        }
    }

    /// Run a command on the storage-admin host; stderr counts as failure.
    async fn run_on_storage_host(&self, command: &str) -> Result<()> {
        let host = self.config.storage_host()?;
        info!(host = %host, command = %command, "running rbd command");
        self.executor
            .run(host, command)
            .await?
            .require_clean(host)?;
        Ok(())
    }

    /// Format the freshly created image through qemu-img on some hypervisor.
    async fn register_image(&self, spec: &VolumeSpec) -> Result<()> {
        let Some(host) = self.selector.select(REGISTRATION_MEMORY_MB).await else {
            warn!(image = %spec.id(), "no hypervisor available, skipping qemu-img registration");
            return Ok(());
        };

        let command = commands::qemu_img_create(&self.config, spec);
        info!(host = %host, command = %command, "registering image");
        self.executor
            .run(&host, &command)
            .await?
            .require_clean(&host)?;
        Ok(())
    }
}

#[async_trait]
impl ResourceLifecycle for VolumeController {
    type Spec = VolumeSpec;

    #[instrument(skip(self, spec), fields(image = %spec.id(), size = %spec.size))]
    async fn create(&self, spec: &VolumeSpec) -> Result<CreateOutcome> {
        spec.validate()?;

        self.run_on_storage_host(&commands::rbd_create(spec))
            .await
            .map_err(|e| {
                warn!(error = %e, "rbd create failed");
                e
            })?;

        // The image exists from here on. Whatever happens next, its id must be
        // reported or the image is orphaned.
        let id = spec.id();
        info!(id = %id, "image created");

        match self.register_image(spec).await {
            Ok(()) => Ok(CreateOutcome::Created(id)),
            Err(error) => {
                warn!(id = %id, error = %error, "image created but qemu-img registration failed");
                Ok(CreateOutcome::CreatedWithError { id, error })
            }
        }
    }

    #[instrument(skip(self, spec), fields(image = %spec.id()))]
    async fn read(&self, spec: &VolumeSpec) -> Result<Option<ResourceId>> {
        spec.validate_identity()?;

        match self.prober.volume_exists(&spec.pool, &spec.name).await {
            Ok(true) => Ok(Some(spec.id())),
            Ok(false) => Ok(None),
            Err(e) => {
                warn!(error = %e, "image probe failed, reporting image as gone");
                Ok(None)
            }
        }
    }

    async fn update(&self, spec: &VolumeSpec) -> Result<()> {
        warn!(image = %spec.id(), "update requested");
        Err(ProvisionError::Unsupported(
            "images cannot be modified in place".into(),
        ))
    }

    #[instrument(skip(self, spec), fields(image = %spec.id()))]
    async fn delete(&self, spec: &VolumeSpec) -> Result<()> {
        spec.validate_identity()?;
        self.run_on_storage_host(&commands::rbd_remove(spec)).await?;
        info!("image removed");
        Ok(())
    }

    #[instrument(skip(self, spec), fields(image = %spec.id()))]
    async fn exists(&self, spec: &VolumeSpec) -> Result<bool> {
        spec.validate_identity()?;
        self.prober.volume_exists(&spec.pool, &spec.name).await
    }
}
