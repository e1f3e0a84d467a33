//! In-memory cluster for testing and development.
//!
//! `MockCluster` implements [`RemoteExecutor`] by interpreting the handful of
//! command lines the engine sends (`rbd`, `qemu-img`, `qemu-system-*`, `ps`,
//! `grep MemAvailable`, `kill`) against simulated Ceph pools and hypervisor
//! process tables. Anything else fails the way a shell would.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::error::{ProvisionError, Result};
use crate::traits::{CommandOutput, RemoteExecutor};

/// A process running on a simulated hypervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockProcess {
    pub pid: u32,
    pub args: String,
}

/// One command received by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub host: String,
    pub command: String,
}

struct StderrRule {
    host: Option<String>,
    pattern: String,
    stderr: String,
}

#[derive(Default)]
struct ClusterState {
    /// pool -> images, in creation order
    pools: HashMap<String, Vec<String>>,
    /// `pool/name` specs registered through qemu-img, with the host used
    registered: Vec<(String, String)>,
    /// hypervisor -> MemAvailable in kB
    memory_kb: HashMap<String, u64>,
    /// hypervisor -> running processes
    processes: HashMap<String, Vec<MockProcess>>,
    unreachable: HashSet<String>,
    stderr_rules: Vec<StderrRule>,
    next_pid: u32,
    calls: Vec<RecordedCall>,
}

/// Simulated Ceph + QEMU cluster.
///
/// Useful for:
/// - Unit and integration testing of the controllers
/// - Rehearsing command sequences without touching real hosts
pub struct MockCluster {
    state: RwLock<ClusterState>,
}

fn lock_poisoned<T>(_: T) -> ProvisionError {
    ProvisionError::Internal("Lock poisoned".to_string())
}

fn failed(host: &str, code: i32, stderr: impl Into<String>) -> ProvisionError {
    ProvisionError::CommandFailed {
        host: host.to_string(),
        code: Some(code),
        stderr: stderr.into(),
    }
}

/// grep -w semantics: `word` bounded by non-word characters.
fn contains_word(haystack: &str, word: &str) -> bool {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    haystack.match_indices(word).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + word.len()..].chars().next();
        !before.map_or(false, is_word) && !after.map_or(false, is_word)
    })
}

impl MockCluster {
    /// Create an empty cluster.
    pub fn new() -> Self {
        info!("Creating mock cluster");
        Self {
            state: RwLock::new(ClusterState {
                next_pid: 1000,
                ..Default::default()
            }),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, ClusterState>> {
        self.state.read().map_err(lock_poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, ClusterState>> {
        self.state.write().map_err(lock_poisoned)
    }

    // =========================================================================
    // Setup
    // =========================================================================

    /// Add a hypervisor with the given available memory.
    pub fn add_hypervisor(&self, host: &str, available_mb: u64) -> Result<()> {
        self.set_available_kb(host, available_mb * 1024)
    }

    /// Set a hypervisor's `MemAvailable` counter in kB.
    pub fn set_available_kb(&self, host: &str, kb: u64) -> Result<()> {
        let mut state = self.write()?;
        state.memory_kb.insert(host.to_string(), kb);
        state.processes.entry(host.to_string()).or_default();
        Ok(())
    }

    /// Create an empty pool.
    pub fn add_pool(&self, pool: &str) -> Result<()> {
        self.write()?.pools.entry(pool.to_string()).or_default();
        Ok(())
    }

    /// Add an existing image, creating its pool if needed.
    pub fn add_image(&self, pool: &str, name: &str) -> Result<()> {
        let mut state = self.write()?;
        let images = state.pools.entry(pool.to_string()).or_default();
        if !images.iter().any(|i| i == name) {
            images.push(name.to_string());
        }
        Ok(())
    }

    /// Start a process on a hypervisor and return its pid.
    pub fn spawn_process(&self, host: &str, args: &str) -> Result<u32> {
        let mut state = self.write()?;
        Ok(Self::spawn_locked(&mut state, host, args))
    }

    fn spawn_locked(state: &mut ClusterState, host: &str, args: &str) -> u32 {
        state.next_pid += 1;
        let pid = state.next_pid;
        state
            .processes
            .entry(host.to_string())
            .or_default()
            .push(MockProcess {
                pid,
                args: args.to_string(),
            });
        pid
    }

    /// Make every ssh session to `host` fail.
    pub fn set_unreachable(&self, host: &str, unreachable: bool) -> Result<()> {
        let mut state = self.write()?;
        if unreachable {
            state.unreachable.insert(host.to_string());
        } else {
            state.unreachable.remove(host);
        }
        Ok(())
    }

    /// Answer commands containing `pattern` with `stderr` and exit status zero,
    /// without executing them. `host = None` matches every host.
    pub fn inject_stderr(&self, host: Option<&str>, pattern: &str, stderr: &str) -> Result<()> {
        self.write()?.stderr_rules.push(StderrRule {
            host: host.map(str::to_string),
            pattern: pattern.to_string(),
            stderr: stderr.to_string(),
        });
        Ok(())
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Images in a pool, in creation order.
    pub fn images(&self, pool: &str) -> Result<Vec<String>> {
        Ok(self.read()?.pools.get(pool).cloned().unwrap_or_default())
    }

    /// `(host, pool/name)` pairs registered through qemu-img.
    pub fn registered_images(&self) -> Result<Vec<(String, String)>> {
        Ok(self.read()?.registered.clone())
    }

    /// Processes running on a hypervisor.
    pub fn processes(&self, host: &str) -> Result<Vec<MockProcess>> {
        Ok(self.read()?.processes.get(host).cloned().unwrap_or_default())
    }

    /// Every command received so far.
    pub fn calls(&self) -> Result<Vec<RecordedCall>> {
        Ok(self.read()?.calls.clone())
    }

    // =========================================================================
    // Command interpretation
    // =========================================================================

    fn execute(&self, host: &str, command: &str) -> Result<CommandOutput> {
        let mut state = self.write()?;
        state.calls.push(RecordedCall {
            host: host.to_string(),
            command: command.to_string(),
        });

        if state.unreachable.contains(host) {
            return Err(failed(
                host,
                255,
                format!("ssh: connect to host {} port 22: No route to host", host),
            ));
        }

        let injected = state.stderr_rules.iter().find(|rule| {
            rule.host.as_deref().map_or(true, |h| h == host) && command.contains(&rule.pattern)
        });
        if let Some(rule) = injected {
            return Ok(CommandOutput::new("", rule.stderr.clone()));
        }

        if command.starts_with("ps ") {
            return Self::process_search(&state, host, command);
        }

        let mut stdout = Vec::new();
        for segment in command.split("&&") {
            let out = Self::run_segment(&mut state, host, segment.trim())?;
            if !out.is_empty() {
                stdout.push(out);
            }
        }
        Ok(CommandOutput::new(stdout.join("\n"), ""))
    }

    fn run_segment(state: &mut ClusterState, host: &str, segment: &str) -> Result<String> {
        let tokens: Vec<&str> = segment.split_whitespace().collect();
        debug!(host = %host, command = %segment, "mock executing");

        match tokens.as_slice() {
            ["rbd", "ls", "-p", pool] => {
                let images = state.pools.get(*pool).ok_or_else(|| {
                    failed(
                        host,
                        2,
                        format!("rbd: error opening pool '{}': (2) No such file or directory", pool),
                    )
                })?;
                Ok(images.join("\n"))
            }
            ["rbd", "create", "--pool", pool, "--image", name, "--size", _size] => {
                let images = state.pools.get_mut(*pool).ok_or_else(|| {
                    failed(host, 2, format!("rbd: error opening pool '{}'", pool))
                })?;
                if images.iter().any(|i| i == name) {
                    return Err(failed(host, 17, "rbd: create error: (17) File exists"));
                }
                images.push(name.to_string());
                Ok(String::new())
            }
            ["rbd", "feature", "disable", spec, ..] => {
                Self::lookup_image(state, host, spec)?;
                Ok(String::new())
            }
            ["rbd", "rm", "--no-progress", spec] => {
                let (pool, name) = Self::lookup_image(state, host, spec)?;
                if let Some(images) = state.pools.get_mut(&pool) {
                    images.retain(|i| *i != name);
                }
                Ok(String::new())
            }
            ["grep", "MemAvailable", "/proc/meminfo"] => match state.memory_kb.get(host) {
                Some(kb) => Ok(format!("MemAvailable:     {} kB", kb)),
                None => Err(failed(host, 1, "")),
            },
            ["kill", pid] => {
                let pid: u32 = pid
                    .parse()
                    .map_err(|_| failed(host, 1, format!("kill: invalid pid {}", pid)))?;
                let procs = state.processes.entry(host.to_string()).or_default();
                let before = procs.len();
                procs.retain(|p| p.pid != pid);
                if procs.len() == before {
                    return Err(failed(host, 1, format!("kill: ({}) - No such process", pid)));
                }
                Ok(String::new())
            }
            [_, "create", "-f", "rbd", target, _size] => {
                // rbd:<pool>/<name>:id=<user>
                let spec = target
                    .strip_prefix("rbd:")
                    .and_then(|t| t.split(':').next())
                    .ok_or_else(|| failed(host, 1, format!("qemu-img: unknown target {}", target)))?;
                Self::lookup_image(state, host, spec)?;
                state.registered.push((host.to_string(), spec.to_string()));
                Ok(format!("Formatting '{}', fmt=rbd", target))
            }
            [_, "-name", ..] => Self::launch(state, host, segment, &tokens),
            [] => Ok(String::new()),
            [binary, ..] => Err(failed(host, 127, format!("sh: 1: {}: not found", binary))),
        }
    }

    fn lookup_image(state: &ClusterState, host: &str, spec: &str) -> Result<(String, String)> {
        let (pool, name) = spec
            .split_once('/')
            .ok_or_else(|| failed(host, 22, format!("rbd: invalid image spec '{}'", spec)))?;
        let found = state
            .pools
            .get(pool)
            .map_or(false, |images| images.iter().any(|i| i == name));
        if !found {
            return Err(failed(
                host,
                2,
                format!("rbd: error opening image {}: (2) No such file or directory", name),
            ));
        }
        Ok((pool.to_string(), name.to_string()))
    }

    fn launch(state: &mut ClusterState, host: &str, segment: &str, tokens: &[&str]) -> Result<String> {
        let option = |flag: &str| {
            tokens
                .iter()
                .position(|t| *t == flag)
                .and_then(|i| tokens.get(i + 1).copied())
        };

        let drive = option("-drive").unwrap_or_default();
        let spec = drive
            .split(',')
            .find_map(|part| part.strip_prefix("file=rbd:"))
            .unwrap_or_default();
        if Self::lookup_image(state, host, spec).is_err() {
            return Err(failed(
                host,
                1,
                format!("{}: -drive {}: error opening image", tokens[0], drive),
            ));
        }

        let mem_kb = option("-m")
            .and_then(|m| m.parse::<u64>().ok())
            .unwrap_or(0)
            * 1024;
        if let Some(avail) = state.memory_kb.get_mut(host) {
            *avail = avail.saturating_sub(mem_kb);
        }

        let pid = Self::spawn_locked(state, host, segment);
        info!(host = %host, pid = pid, "mock VM launched");
        Ok(String::new())
    }

    fn process_search(state: &ClusterState, host: &str, command: &str) -> Result<CommandOutput> {
        let id = command
            .split("grep -w '")
            .nth(1)
            .and_then(|rest| rest.split('\'').next())
            .unwrap_or_default();

        let lines: Vec<String> = state
            .processes
            .get(host)
            .map(|procs| {
                procs
                    .iter()
                    .filter(|p| !id.is_empty() && contains_word(&p.args, id))
                    .map(|p| format!("{} {}", p.pid, p.args))
                    .collect()
            })
            .unwrap_or_default();

        Ok(CommandOutput::new(lines.join("\n"), ""))
    }
}

impl Default for MockCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for MockCluster {
    async fn run(&self, host: &str, command: &str) -> Result<CommandOutput> {
        self.execute(host, command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CEPH: &str = "10.0.0.1";
    const HV: &str = "10.0.1.1";

    #[test]
    fn test_contains_word() {
        assert!(contains_word("qemu -name tf-helloVm -smp 1", "tf-helloVm"));
        assert!(contains_word("qemu -name tf-helloVm-2", "tf-helloVm"));
        assert!(!contains_word("qemu -name tf-helloVmX", "tf-helloVm"));
        assert!(!contains_word("qemu", "tf-helloVm"));
    }

    #[tokio::test]
    async fn test_rbd_create_list_remove() {
        let cluster = MockCluster::new();
        cluster.add_pool("rbd").unwrap();

        cluster
            .run(CEPH, "rbd create --pool rbd --image a --size 6M && rbd feature disable rbd/a object-map")
            .await
            .unwrap();
        let out = cluster.run(CEPH, "rbd ls -p rbd").await.unwrap();
        assert_eq!(out.stdout, "a");

        let err = cluster
            .run(CEPH, "rbd create --pool rbd --image a --size 6M")
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::CommandFailed { code: Some(17), .. }));

        cluster.run(CEPH, "rbd rm --no-progress rbd/a").await.unwrap();
        assert!(cluster.images("rbd").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pool_fails() {
        let cluster = MockCluster::new();
        let err = cluster.run(CEPH, "rbd ls -p nope").await.unwrap_err();
        assert!(matches!(err, ProvisionError::CommandFailed { code: Some(2), .. }));
    }

    #[tokio::test]
    async fn test_meminfo_and_launch() {
        let cluster = MockCluster::new();
        cluster.add_hypervisor(HV, 4096).unwrap();
        cluster.add_image("rbd", "img").unwrap();

        let out = cluster.run(HV, "grep MemAvailable /proc/meminfo").await.unwrap();
        assert_eq!(out.stdout, "MemAvailable:     4194304 kB");

        cluster
            .run(HV, "/bin/qemu -name tf-a -m 1024 -drive format=rbd,file=rbd:rbd/img,cache=writeback -daemonize")
            .await
            .unwrap();
        assert_eq!(cluster.processes(HV).unwrap().len(), 1);

        let out = cluster.run(HV, "grep MemAvailable /proc/meminfo").await.unwrap();
        assert_eq!(out.stdout, "MemAvailable:     3145728 kB");
    }

    #[tokio::test]
    async fn test_launch_without_image_fails() {
        let cluster = MockCluster::new();
        cluster.add_hypervisor(HV, 4096).unwrap();
        let err = cluster
            .run(HV, "/bin/qemu -name tf-a -m 1024 -drive format=rbd,file=rbd:rbd/missing,cache=writeback")
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::CommandFailed { .. }));
        assert!(cluster.processes(HV).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ps_and_kill() {
        let cluster = MockCluster::new();
        let pid = cluster.spawn_process(HV, "/bin/qemu -name tf-a -smp 1").unwrap();
        cluster.spawn_process(HV, "/bin/qemu -name tf-b -smp 1").unwrap();

        let out = cluster
            .run(HV, "ps axwww -o 'pid args' | grep -v grep | grep -w 'tf-a' ; /bin/true")
            .await
            .unwrap();
        assert_eq!(out.stdout, format!("{} /bin/qemu -name tf-a -smp 1", pid));

        cluster.run(HV, &format!("kill {}", pid)).await.unwrap();
        assert!(cluster.run(HV, &format!("kill {}", pid)).await.is_err());
        assert_eq!(cluster.processes(HV).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_and_injected_stderr() {
        let cluster = MockCluster::new();
        cluster.add_pool("rbd").unwrap();
        cluster.set_unreachable(CEPH, true).unwrap();
        let err = cluster.run(CEPH, "rbd ls -p rbd").await.unwrap_err();
        assert!(matches!(err, ProvisionError::CommandFailed { code: Some(255), .. }));

        cluster.set_unreachable(CEPH, false).unwrap();
        cluster.inject_stderr(Some(CEPH), "rbd ls", "rbd: warning").unwrap();
        let out = cluster.run(CEPH, "rbd ls -p rbd").await.unwrap();
        assert_eq!(out.stderr, "rbd: warning");

        assert_eq!(cluster.calls().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let cluster = MockCluster::new();
        let err = cluster.run(HV, "reboot").await.unwrap_err();
        assert!(matches!(err, ProvisionError::CommandFailed { code: Some(127), .. }));
    }
}
