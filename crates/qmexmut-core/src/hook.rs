//! Proxmox hookscript dispatch.
//!
//! Proxmox runs the hookscript as `<script> <vmid> <phase>` at each point of a
//! VM's lifecycle. Each invocation is independent of every other one.

use crate::config::HookConfig;
use crate::conflict::mutuals;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::shutdown::stop_mutuals;
use crate::types::VmId;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

/// Lifecycle point at which the hook is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before the VM starts; mutual VMs are shut down here
    PreStart,
    /// After the VM started
    PostStart,
    /// Before the VM stops
    PreStop,
    /// After the VM stopped
    PostStop,
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pre-start" => Ok(Phase::PreStart),
            "post-start" => Ok(Phase::PostStart),
            "pre-stop" => Ok(Phase::PreStop),
            "post-stop" => Ok(Phase::PostStop),
            other => Err(Error::UnknownPhase(other.to_string())),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::PreStart => write!(f, "pre-start"),
            Phase::PostStart => write!(f, "post-start"),
            Phase::PreStop => write!(f, "pre-stop"),
            Phase::PostStop => write!(f, "post-stop"),
        }
    }
}

/// Handle one hook invocation; `args` are the positional arguments after the
/// program name.
pub async fn run_hook<H: Host>(
    host: Arc<H>,
    config: &HookConfig,
    program: &str,
    args: &[String],
) -> Result<()> {
    let [vmid, phase, rest @ ..] = args else {
        return Err(Error::Usage(format!("{program} <vmid> <phase>")));
    };
    if !rest.is_empty() {
        debug!(extra = ?rest, "ignoring extra hook arguments");
    }
    let vmid = VmId::from(vmid.as_str());
    let phase: Phase = phase.parse()?;
    info!(%vmid, %phase, dry_run = config.dry_run, "hook invoked");

    match phase {
        Phase::PreStart => stop_mutuals_of(host, config, vmid).await,
        // TODO: sync `qm set --onboot` of mutual VMs once post-start has a use
        Phase::PostStart | Phase::PreStop | Phase::PostStop => Ok(()),
    }
}

/// Find the VMs conflicting with `vmid` and stop the running ones.
pub async fn stop_mutuals_of<H: Host>(
    host: Arc<H>,
    config: &HookConfig,
    vmid: VmId,
) -> Result<()> {
    let found = {
        let host = Arc::clone(&host);
        // Scanning blocks on child process output.
        tokio::task::spawn_blocking(move || mutuals(&*host, &vmid))
            .await
            .map_err(|e| Error::Task(e.to_string()))??
    };
    info!(count = found.len(), "mutual VMs found");
    stop_mutuals(host, found, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_parsing() {
        assert_eq!("pre-start".parse::<Phase>().unwrap(), Phase::PreStart);
        assert_eq!("post-start".parse::<Phase>().unwrap(), Phase::PostStart);
        assert_eq!("pre-stop".parse::<Phase>().unwrap(), Phase::PreStop);
        assert_eq!("post-stop".parse::<Phase>().unwrap(), Phase::PostStop);

        let err = "pre-migrate".parse::<Phase>().unwrap_err();
        assert!(matches!(err, Error::UnknownPhase(ref p) if p == "pre-migrate"));
    }

    #[test]
    fn test_phase_display_round_trip() {
        for phase in [Phase::PreStart, Phase::PostStart, Phase::PreStop, Phase::PostStop] {
            assert_eq!(phase.to_string().parse::<Phase>().unwrap(), phase);
        }
    }
}
