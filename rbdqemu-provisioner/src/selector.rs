//! Hypervisor placement by available memory.

use tracing::{info, instrument, warn};

use crate::probe::Prober;

/// Picks the hypervisor with the most available memory.
#[derive(Clone)]
pub struct HypervisorSelector {
    prober: Prober,
}

impl HypervisorSelector {
    pub fn new(prober: Prober) -> Self {
        Self { prober }
    }

    /// Host with the most `MemAvailable`, if that exceeds `required_mb`.
    ///
    /// Every hypervisor is asked in configured order. Hosts whose probe fails
    /// are skipped rather than failing the selection. The first host seen with
    /// the maximum wins ties. `None` means no capacity, which is not an error.
    #[instrument(skip(self))]
    pub async fn select(&self, required_mb: u64) -> Option<String> {
        let mut max_avail_kb: u64 = 0;
        let mut best_host: Option<&str> = None;

        for host in &self.prober.config().qemu_hosts {
            match self.prober.available_memory_kb(host).await {
                Ok(avail_kb) => {
                    if avail_kb > max_avail_kb {
                        max_avail_kb = avail_kb;
                        best_host = Some(host.as_str());
                    }
                }
                Err(e) => {
                    warn!(host = %host, error = %e, "ignoring hypervisor");
                }
            }
        }

        info!(max_avail_kb = max_avail_kb, best_host = ?best_host, "memory scan complete");

        if max_avail_kb / 1024 > required_mb {
            best_host.map(str::to_string)
        } else {
            warn!(required_mb = required_mb, "No hypervisor with enough free memory");
            None
        }
    }
}
