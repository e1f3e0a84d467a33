//! Grammars for the text printed by remote probe commands.
//!
//! - inventory: one image name per line (`rbd ls`), matched exactly
//! - memory: `MemAvailable:<ws><kB><ws>kB`, anything else is an error
//! - process: `<pid> <binary> -name <vm-id> <args...>`, anything else is
//!   reported as a mismatch so the caller can log it and move on

use crate::error::{ProvisionError, Result};

/// True if `listing` has a line exactly equal to `name`.
pub fn inventory_contains(listing: &str, name: &str) -> bool {
    listing
        .lines()
        .any(|line| line.trim_end_matches('\r') == name)
}

/// Available memory in kB from a `/proc/meminfo` line.
pub fn mem_available_kb(output: &str) -> Result<u64> {
    let line = output
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| ProvisionError::ParseFailed {
            what: "meminfo",
            detail: "empty output".into(),
        })?;

    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.first() != Some(&"MemAvailable:") || tokens.len() < 2 {
        return Err(ProvisionError::ParseFailed {
            what: "meminfo",
            detail: format!("unexpected line [{}]", line),
        });
    }

    tokens[1].parse::<u64>().map_err(|e| ProvisionError::ParseFailed {
        what: "meminfo",
        detail: format!("bad counter '{}': {}", tokens[1], e),
    })
}

/// Verdict on one line of process-listing output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessLine {
    /// The line is the VM's process.
    Match { pid: u32 },
    /// The line mentions the id but is not shaped like our QEMU invocation.
    Mismatch(String),
}

/// Match one `ps -o 'pid args'` line against a VM process name.
///
/// Token 0 is the pid, token 1 the binary; tokens 2 and 3 must be `-name` and
/// the exact VM id.
pub fn process_line(line: &str, vm_id: &str) -> ProcessLine {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return ProcessLine::Mismatch(format!("too few fields in [{}]", line));
    }
    if tokens[2] != "-name" || tokens[3] != vm_id {
        return ProcessLine::Mismatch(format!("unexpected process [{}]", line));
    }
    match tokens[0].parse::<u32>() {
        Ok(pid) => ProcessLine::Match { pid },
        Err(_) => ProcessLine::Mismatch(format!("bad pid '{}' in [{}]", tokens[0], line)),
    }
}
