//! Detection of VMs that share passthrough resources.
//!
//! Every query spawns its own scan session. Configurations are queried one
//! after another while the `qm list` session stays open, so at most two `qm`
//! processes are alive at a time.

use crate::error::Result;
use crate::host::Host;
use crate::matcher::{LineSourceExt, Matches};
use crate::recognize::label_host_resource;
use crate::scan::{Finish, LineSource};
use crate::types::{ResourceSet, VmId, VmRecord, VmStatus};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Row of `qm list`: id, name and status separated by whitespace.
static LIST_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\S+)\s+(\S+)\s+(\S+)").expect("Invalid list regex"));

/// Line of `qm config`: `key: value`. Section headers like `[special:cloudinit]`
/// never match.
static KEY_VALUE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][\w-]*):\s*(.+)$").expect("Invalid key-value regex"));

/// Records of the VM listing, with the header row dropped.
pub struct VmListing<S> {
    rows: Matches<'static, S>,
    header_seen: bool,
}

impl<S: LineSource> Iterator for VmListing<S> {
    type Item = Result<VmRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.header_seen {
            self.header_seen = true;
            if let Err(e) = self.rows.next()? {
                return Some(Err(e));
            }
        }
        let row = match self.rows.next()? {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };
        Some(Ok(VmRecord::new(
            row.get(1),
            row.get(2),
            VmStatus::from(row.get(3)),
        )))
    }
}

impl<S: LineSource> Finish for VmListing<S> {
    fn finish(self) -> Result<()> {
        self.rows.finish()
    }
}

/// Iterate over every VM defined on the host.
pub fn list_vms<H: Host>(host: &H) -> VmListing<H::Lines> {
    VmListing {
        rows: host.list().matching(&LIST_PATTERN),
        header_seen: false,
    }
}

/// Every passthrough resource claimed by a VM's configuration.
pub fn host_resources<H: Host>(host: &H, vmid: &VmId) -> Result<ResourceSet> {
    let mut labels = host
        .config(vmid)
        .matching(&KEY_VALUE_PATTERN)
        .recognize(label_host_resource);
    let mut resources = ResourceSet::new();
    for label in &mut labels {
        resources.insert(label?);
    }
    labels.finish()?;
    debug!(%vmid, count = resources.len(), "collected host resources");
    Ok(resources)
}

/// Check if a VM claims any resource in `resources`.
///
/// Stops reading the VM's configuration at the first shared resource.
pub fn shares_host_resources<H: Host>(
    host: &H,
    vmid: &VmId,
    resources: &ResourceSet,
) -> Result<bool> {
    let mut labels = host
        .config(vmid)
        .matching(&KEY_VALUE_PATTERN)
        .recognize(label_host_resource);
    let mut shared = None;
    for label in &mut labels {
        let label = label?;
        if resources.contains(&label) {
            shared = Some(label);
            break;
        }
    }
    labels.finish()?;
    if let Some(label) = &shared {
        debug!(%vmid, %label, "found shared host resource");
    }
    Ok(shared.is_some())
}

/// Check if a VM claims any passthrough resource at all.
pub fn has_host_resources<H: Host>(host: &H, vmid: &VmId) -> Result<bool> {
    let mut labels = host
        .config(vmid)
        .matching(&KEY_VALUE_PATTERN)
        .recognize(label_host_resource);
    let found = labels.next().transpose()?.is_some();
    labels.finish()?;
    Ok(found)
}

/// VMs other than `vmid` that claim a resource `vmid` also claims.
///
/// Records come back in listing order.
pub fn mutuals<H: Host>(host: &H, vmid: &VmId) -> Result<Vec<VmRecord>> {
    let resources = host_resources(host, vmid)?;
    if resources.is_empty() {
        debug!(%vmid, "no host resources, nothing can conflict");
        return Ok(Vec::new());
    }

    let mut listing = list_vms(host);
    let mut found = Vec::new();
    for record in &mut listing {
        let record = record?;
        if record.id == *vmid {
            continue;
        }
        if shares_host_resources(host, &record.id, &resources)? {
            debug!(%vmid, mutual = %record.id, status = %record.status, "found mutual VM");
            found.push(record);
        }
    }
    listing.finish()?;
    Ok(found)
}
