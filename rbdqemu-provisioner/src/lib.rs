//! # rbdqemu provisioner
//!
//! Lifecycle engine for two kinds of resources on a small private cluster:
//! - **RBD images** in Ceph pools, created on the storage-admin host
//! - **QEMU VMs** launched as daemonized processes on a hypervisor
//!
//! No state is kept locally. Every query re-derives the answer by running
//! commands over ssh and parsing what comes back.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐
//! │ VolumeController │   │   VmController   │
//! └────────┬─────────┘   └────────┬─────────┘
//!          │    HypervisorSelector│
//!          └──────────┬───────────┘
//!                     ▼
//!                  Prober
//!                     │
//!                     ▼
//!       RemoteExecutor (SshExecutor / MockCluster)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rbdqemu_provisioner::{ClusterConfig, MockCluster, ResourceLifecycle, VolumeController, VolumeSpec};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ClusterConfig::new("admin", vec!["ceph1".into()], vec!["hv1".into()], "/root/.ssh/id")
//!         .validated()
//!         .unwrap();
//!     let cluster = Arc::new(MockCluster::new());
//!     let volumes = VolumeController::new(Arc::new(config), cluster);
//!
//!     let outcome = volumes.create(&VolumeSpec::new("rbd", "helloImg", "6M")).await.unwrap();
//! }
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod mock;
pub mod parse;
pub mod probe;
pub mod selector;
pub mod ssh;
pub mod traits;
pub mod types;
pub mod validate;
pub mod vm;
pub mod volume;

pub use config::ClusterConfig;
pub use error::{ProvisionError, Result};
pub use mock::MockCluster;
pub use probe::Prober;
pub use selector::HypervisorSelector;
pub use ssh::SshExecutor;
pub use traits::{CommandOutput, RemoteExecutor, ResourceLifecycle};
pub use types::*;
pub use vm::VmController;
pub use volume::VolumeController;
