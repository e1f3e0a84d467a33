//! Core abstraction traits.

use async_trait::async_trait;

use crate::error::{ProvisionError, Result};
use crate::types::{CreateOutcome, ResourceId};

/// Captured output of a remote command that exited with status zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// stdout lines joined with '\n'
    pub stdout: String,
    /// stderr lines joined with '\n'
    pub stderr: String,
}

impl CommandOutput {
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Treat anything on stderr as a failure.
    ///
    /// A zero exit status does not imply success for the rbd and qemu tools,
    /// so most callers go through this before looking at stdout.
    pub fn require_clean(self, host: &str) -> Result<Self> {
        if self.stderr.is_empty() {
            Ok(self)
        } else {
            Err(ProvisionError::RemoteStderr {
                host: host.to_string(),
                stderr: self.stderr,
            })
        }
    }
}

/// Runs one shell command on one remote host.
///
/// Implementations return `Err` only when the session could not be started
/// (`Transport`) or the command exited non-zero (`CommandFailed`). stderr on a
/// zero exit is handed back untouched; callers decide whether it matters.
/// There is no timeout: the call returns when the remote command does.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput>;
}

/// Lifecycle operations for one kind of remote resource.
///
/// State is never cached: every call re-derives it from the cluster.
#[async_trait]
pub trait ResourceLifecycle: Send + Sync {
    /// Attributes describing one resource.
    type Spec: Send + Sync;

    /// Create the resource.
    ///
    /// `Err` means nothing was created. Once the primary remote side effect has
    /// happened the outcome always carries the identifier, even when a later
    /// step fails.
    async fn create(&self, spec: &Self::Spec) -> Result<CreateOutcome>;

    /// Refresh the resource's identity; `None` means it is gone.
    async fn read(&self, spec: &Self::Spec) -> Result<Option<ResourceId>>;

    /// In-place modification. Not supported by any resource.
    async fn update(&self, spec: &Self::Spec) -> Result<()>;

    /// Remove the resource.
    async fn delete(&self, spec: &Self::Spec) -> Result<()>;

    /// Whether the resource currently exists.
    async fn exists(&self, spec: &Self::Spec) -> Result<bool>;
}
