//! Remote command lines.
//!
//! These are the exact strings an operator would type on the storage-admin
//! host or a hypervisor. Every interpolated value has been validated by the
//! caller, so no quoting is applied.

use crate::config::ClusterConfig;
use crate::types::{VmSpec, VolumeSpec};

/// RBD features disabled on every new image so the kernel/QEMU client can map it.
pub const DISABLED_RBD_FEATURES: [&str; 3] = ["object-map", "fast-diff", "deep-flatten"];

/// Prints the hypervisor's available memory as `MemAvailable:  <kB> kB`.
pub const MEM_AVAILABLE: &str = "grep MemAvailable /proc/meminfo";

/// `rbd ls -p <pool>`
pub fn rbd_list(pool: &str) -> String {
    format!("rbd ls -p {}", pool)
}

/// Create an image and strip the features QEMU cannot use.
pub fn rbd_create(spec: &VolumeSpec) -> String {
    format!(
        "rbd create --pool {pool} --image {name} --size {size} && rbd feature disable {pool}/{name} {features}",
        pool = spec.pool,
        name = spec.name,
        size = spec.size,
        features = DISABLED_RBD_FEATURES.join(" "),
    )
}

/// `rbd rm --no-progress <pool>/<name>`
pub fn rbd_remove(spec: &VolumeSpec) -> String {
    format!("rbd rm --no-progress {}/{}", spec.pool, spec.name)
}

/// Register the image with qemu-img on a hypervisor.
pub fn qemu_img_create(config: &ClusterConfig, spec: &VolumeSpec) -> String {
    format!(
        "{} create -f rbd rbd:{}/{}:id={} {}",
        config.qemu_img, spec.pool, spec.name, config.rbd_user, spec.size
    )
}

/// List processes whose arguments contain `vm_id` as a whole word.
///
/// The trailing `/bin/true` keeps the exit status zero when grep finds nothing.
pub fn process_search(vm_id: &str) -> String {
    format!(
        "ps axwww -o 'pid args' | grep -v grep | grep -w '{}' ; /bin/true",
        vm_id
    )
}

/// Launch a daemonized QEMU process for the VM.
pub fn qemu_launch(config: &ClusterConfig, spec: &VmSpec) -> String {
    let args = [
        config.qemu_system.clone(),
        format!("-name {}", config.vm_id(&spec.name)),
        format!("-smp {}", spec.cpus),
        format!("-m {}", spec.mem_mb),
        format!("-vnc {}", spec.vnc),
        format!(
            "-drive format=rbd,file=rbd:{}/{},cache=writeback",
            spec.pool, spec.image
        ),
        format!(
            "-nic tap,script={}/add_tap{}.sh,model=virtio-net-pci,mac={}",
            config.tap_script_dir.trim_end_matches('/'),
            spec.vlan,
            spec.mac
        ),
        "-vga vmware".to_string(),
        "-enable-kvm".to_string(),
        "-usb".to_string(),
        "-device usb-tablet".to_string(),
        "-daemonize".to_string(),
    ];
    args.join(" ")
}

/// `kill <pid>`
pub fn kill(pid: u32) -> String {
    format!("kill {}", pid)
}
