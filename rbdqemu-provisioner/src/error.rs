//! Error types for the provisioning engine.

use thiserror::Error;

/// Errors that can occur while provisioning images and VMs.
///
/// "Not found" and "no capacity" are ordinary results of a probe and are not
/// represented here, except for VM deletion where a missing VM is a failure.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// The remote session could not be started.
    #[error("ssh fault on {host}: {reason}")]
    Transport { host: String, reason: String },

    /// The remote command ran but exited non-zero.
    #[error("remote command on {host} exited with {}: {stderr}", exit_code_display(.code))]
    CommandFailed {
        host: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The remote command exited zero but wrote diagnostics to stderr.
    #[error("remote command on {host} reported: {stderr}")]
    RemoteStderr { host: String, stderr: String },

    /// VM could not be located on any hypervisor.
    #[error("Could not locate VM and pid of {0}")]
    VmNotFound(String),

    /// Terminating the VM process failed.
    #[error("Failed to delete {name} pid:{pid} on {host} - {reason}")]
    DeleteFailed {
        name: String,
        pid: u32,
        host: String,
        reason: String,
    },

    /// In-place modification is not supported.
    #[error("feature not implemented: {0}")]
    Unsupported(String),

    /// Output from a remote command did not have the expected shape.
    #[error("Failed to parse {what} output: {detail}")]
    ParseFailed { what: &'static str, detail: String },

    /// Invalid provider configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid resource attributes.
    #[error("Invalid resource attributes: {0}")]
    InvalidSpec(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn exit_code_display(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "no status (terminated by signal)".to_string(),
    }
}

impl ProvisionError {
    /// True for faults raised by the transport or the remote command itself.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::CommandFailed { .. } | Self::RemoteStderr { .. }
        )
    }
}

/// Result type alias for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;
