//! Domain types for VMs and the passthrough resources they claim.

use std::collections::HashSet;
use std::fmt;

/// Identifier of a VM as reported by `qm list`.
///
/// Opaque to us; only ever compared for equality and passed back to `qm`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VmId(String);

impl VmId {
    /// Create a VM ID from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VmId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VmId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Run state of a VM as reported by `qm list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmStatus {
    /// VM is running
    Running,
    /// VM is stopped
    Stopped,
    /// Any other token, kept verbatim for diagnostics
    Unknown(String),
}

impl From<&str> for VmStatus {
    fn from(s: &str) -> Self {
        match s {
            "running" => VmStatus::Running,
            "stopped" => VmStatus::Stopped,
            other => VmStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmStatus::Running => write!(f, "running"),
            VmStatus::Stopped => write!(f, "stopped"),
            VmStatus::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// One row of the VM listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmRecord {
    pub id: VmId,
    pub name: String,
    pub status: VmStatus,
}

impl VmRecord {
    pub fn new(id: impl Into<VmId>, name: impl Into<String>, status: VmStatus) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status,
        }
    }
}

/// Normalized identity of one physical passthrough resource,
/// e.g. `hostpci:0000:01:00.0` or `hostusb:1-1.2`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceLabel(String);

impl ResourceLabel {
    /// Label a resource of the given device class.
    pub fn new(class: &str, identity: &str) -> Self {
        Self(format!("{class}:{identity}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of resource labels claimed by one VM's configuration.
pub type ResourceSet = HashSet<ResourceLabel>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_status_parsing() {
        assert_eq!(VmStatus::from("running"), VmStatus::Running);
        assert_eq!(VmStatus::from("stopped"), VmStatus::Stopped);
        assert_eq!(
            VmStatus::from("paused"),
            VmStatus::Unknown("paused".to_string())
        );
        assert_eq!(VmStatus::from("paused").to_string(), "paused");
    }

    #[test]
    fn test_resource_label_format() {
        let label = ResourceLabel::new("hostpci", "0000:01:00.0");
        assert_eq!(label.as_str(), "hostpci:0000:01:00.0");
        assert_eq!(label.to_string(), "hostpci:0000:01:00.0");
    }

    #[test]
    fn test_vm_id_equality() {
        assert_eq!(VmId::from("101"), VmId::new(String::from("101")));
        assert_ne!(VmId::from("101"), VmId::from("102"));
    }
}
