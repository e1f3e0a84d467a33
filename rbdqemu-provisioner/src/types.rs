//! Resource attributes and operation outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};
use crate::validate;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Externally visible identifier of a provisioned resource.
///
/// `pool/name` for an RBD image, `<prefix>-<name>` for a VM.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// RESOURCE ATTRIBUTES
// =============================================================================

/// Attributes of an RBD image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Ceph pool the image lives in
    #[serde(rename = "osd_pool")]
    pub pool: String,
    /// Image name, unique within the pool
    #[serde(rename = "img_name")]
    pub name: String,
    /// Size as understood by `rbd create --size`, e.g. "6M"
    #[serde(rename = "img_size", default)]
    pub size: String,
}

impl VolumeSpec {
    pub fn new(pool: impl Into<String>, name: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            pool: pool.into(),
            name: name.into(),
            size: size.into(),
        }
    }

    /// Identity of the image, `pool/name`.
    pub fn id(&self) -> ResourceId {
        ResourceId(format!("{}/{}", self.pool, self.name))
    }

    /// Check the attributes that address an existing image.
    pub fn validate_identity(&self) -> Result<()> {
        validate::token("osd_pool", &self.pool).map_err(ProvisionError::InvalidSpec)?;
        validate::token("img_name", &self.name).map_err(ProvisionError::InvalidSpec)?;
        Ok(())
    }

    /// Check every attribute needed to create the image.
    pub fn validate(&self) -> Result<()> {
        self.validate_identity()?;
        validate::size(&self.size).map_err(ProvisionError::InvalidSpec)?;
        Ok(())
    }
}

/// Attributes of a QEMU virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmSpec {
    /// Logical name; the process is named `<prefix>-<name>`
    pub name: String,
    /// Number of vCPUs
    pub cpus: u32,
    /// Memory in MB
    pub mem_mb: u64,
    /// VLAN the NIC is attached to
    pub vlan: u32,
    /// MAC address of the NIC
    pub mac: String,
    /// VNC display, e.g. ":10"
    pub vnc: String,
    /// Pool of the backing image
    #[serde(rename = "osd_pool")]
    pub pool: String,
    /// Backing RBD image used as the OS disk
    #[serde(rename = "img_name")]
    pub image: String,
}

impl VmSpec {
    /// Spec carrying only the logical name, enough for read/exists/delete.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpus: 0,
            mem_mb: 0,
            vlan: 0,
            mac: String::new(),
            vnc: String::new(),
            pool: String::new(),
            image: String::new(),
        }
    }

    pub fn with_cpus(mut self, cpus: u32) -> Self {
        self.cpus = cpus;
        self
    }

    pub fn with_memory(mut self, mem_mb: u64) -> Self {
        self.mem_mb = mem_mb;
        self
    }

    pub fn with_nic(mut self, vlan: u32, mac: impl Into<String>) -> Self {
        self.vlan = vlan;
        self.mac = mac.into();
        self
    }

    pub fn with_vnc(mut self, vnc: impl Into<String>) -> Self {
        self.vnc = vnc.into();
        self
    }

    pub fn with_disk(mut self, pool: impl Into<String>, image: impl Into<String>) -> Self {
        self.pool = pool.into();
        self.image = image.into();
        self
    }

    /// Check the attributes that address an existing VM.
    pub fn validate_identity(&self) -> Result<()> {
        validate::token("name", &self.name).map_err(ProvisionError::InvalidSpec)
    }

    /// Check every attribute needed to launch the VM.
    pub fn validate(&self) -> Result<()> {
        self.validate_identity()?;
        if self.cpus == 0 {
            return Err(ProvisionError::InvalidSpec("cpus must be at least 1".into()));
        }
        if self.mem_mb == 0 {
            return Err(ProvisionError::InvalidSpec("mem_mb must be at least 1".into()));
        }
        validate::mac(&self.mac).map_err(ProvisionError::InvalidSpec)?;
        validate::vnc(&self.vnc).map_err(ProvisionError::InvalidSpec)?;
        validate::token("osd_pool", &self.pool).map_err(ProvisionError::InvalidSpec)?;
        validate::token("img_name", &self.image).map_err(ProvisionError::InvalidSpec)?;
        Ok(())
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Why a create request did not provision anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum DeferReason {
    /// No hypervisor has more free memory than requested.
    NoCapacity { required_mb: u64 },
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCapacity { required_mb } => {
                write!(f, "no hypervisor with more than {}MB free", required_mb)
            }
        }
    }
}

/// Result of a successful create call.
#[derive(Debug)]
pub enum CreateOutcome {
    /// Resource created.
    Created(ResourceId),
    /// The resource was created but a follow-up step failed. The resource
    /// exists remotely and must be tracked; the error is for the operator.
    CreatedWithError {
        id: ResourceId,
        error: ProvisionError,
    },
    /// Nothing was created; the request should be retried later.
    Deferred(DeferReason),
}

impl CreateOutcome {
    /// Identifier to record, if the resource now exists.
    pub fn id(&self) -> Option<&ResourceId> {
        match self {
            Self::Created(id) | Self::CreatedWithError { id, .. } => Some(id),
            Self::Deferred(_) => None,
        }
    }

    /// Secondary error reported alongside a created resource.
    pub fn error(&self) -> Option<&ProvisionError> {
        match self {
            Self::CreatedWithError { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

/// Where a VM process was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmLocation {
    /// Hypervisor running the process
    pub host: String,
    /// QEMU process id
    pub pid: u32,
}
