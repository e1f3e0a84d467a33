//! Remote executor backed by the OpenSSH client.
//!
//! Each call spawns
//! `ssh -i <key> -o StrictHostKeyChecking=no -o BatchMode=yes <user>@<host> <command>`
//! and streams both output pipes line by line into the log while buffering
//! them for the caller.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::config::ClusterConfig;
use crate::error::{ProvisionError, Result};
use crate::traits::{CommandOutput, RemoteExecutor};

/// Executor that shells out to `ssh`.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    /// ssh client binary
    ssh_binary: String,
    /// Remote login name
    user: String,
    /// Identity file
    private_key: String,
}

impl SshExecutor {
    /// Create an executor using the cluster's ssh settings.
    pub fn new(config: &ClusterConfig) -> Self {
        Self {
            ssh_binary: config.ssh_binary.clone(),
            user: config.ssh_user.clone(),
            private_key: config.ssh_private_key.clone(),
        }
    }

    /// Arguments passed to the ssh binary.
    ///
    /// Host keys are not verified and interactive authentication is disabled,
    /// so a missing key fails the session instead of prompting.
    fn ssh_args(&self, host: &str, command: &str) -> Vec<String> {
        vec![
            "-i".to_string(),
            self.private_key.clone(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            format!("{}@{}", self.user, host),
            command.to_string(),
        ]
    }
}

/// Read a pipe to EOF, logging each line and joining them with '\n'.
async fn collect_lines<R>(reader: R, host: &str, stream: &'static str) -> std::io::Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut segments = BufReader::new(reader).split(b'\n');
    let mut lines = Vec::new();

    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment)
            .trim_end_matches('\r')
            .to_string();
        debug!(host = %host, stream, "{}", line);
        lines.push(line);
    }

    Ok(lines.join("\n"))
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    #[instrument(skip(self), fields(user = %self.user))]
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput> {
        info!(host = %host, "connecting");

        let mut child = Command::new(&self.ssh_binary)
            .args(self.ssh_args(host, command))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!(host = %host, error = %e, "Cannot exec ssh");
                ProvisionError::Transport {
                    host: host.to_string(),
                    reason: format!("cannot exec {}: {}", self.ssh_binary, e),
                }
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProvisionError::Internal("ssh stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProvisionError::Internal("ssh stderr not captured".into()))?;

        // Both pipes are drained together so neither can fill up and stall ssh.
        let (stdout, stderr) = tokio::join!(
            collect_lines(stdout, host, "stdout"),
            collect_lines(stderr, host, "stderr"),
        );

        let transport = |e: std::io::Error| ProvisionError::Transport {
            host: host.to_string(),
            reason: e.to_string(),
        };
        let status = child.wait().await.map_err(transport)?;
        let stdout = stdout.map_err(transport)?;
        let stderr = stderr.map_err(transport)?;

        if !status.success() {
            warn!(host = %host, status = ?status.code(), "remote command failed");
            return Err(ProvisionError::CommandFailed {
                host: host.to_string(),
                code: status.code(),
                stderr,
            });
        }

        Ok(CommandOutput { stdout, stderr })
    }
}
