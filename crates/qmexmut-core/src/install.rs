//! Hookscript installation.
//!
//! Copies the running executable into a snippet storage and registers it as
//! hookscript on every VM that passes through host hardware.

use crate::config::HookConfig;
use crate::conflict::{has_host_resources, list_vms};
use crate::error::{Error, Result};
use crate::host::Host;
use crate::scan::Finish;
use crate::shutdown::join_first_error;
use crate::storage::{find_snippet_store, StorageEntry};
use crate::types::VmId;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Command name under which the executable acts as hookscript.
pub const HOOK_COMMAND_NAME: &str = "qmexmut.hook";

/// Where the hookscript goes and how VMs refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    /// Volume reference passed to `qm set --hookscript`
    pub hookscript: String,
    /// Filesystem destination of the executable
    pub destination: PathBuf,
}

impl InstallPlan {
    /// Plan installation into `store`; `None` if it has no filesystem path.
    pub fn for_store(store: &StorageEntry) -> Option<Self> {
        let dir = store.dir()?;
        Some(Self {
            hookscript: format!("{}:snippets/{}", store.name, HOOK_COMMAND_NAME),
            destination: Path::new(dir).join("snippets").join(HOOK_COMMAND_NAME),
        })
    }
}

/// Install the hookscript and register it on VMs with passthrough hardware.
///
/// Returns the VMs the hookscript was (or under dry run, would be) set on.
pub async fn install<H: Host>(host: Arc<H>, config: &HookConfig) -> Result<Vec<VmId>> {
    let storages = host.storages().await?;
    let plan = find_snippet_store(&storages)
        .and_then(InstallPlan::for_store)
        .ok_or(Error::NoSnippetStorage)?;
    debug!(?plan, "install plan");

    if config.dry_run {
        info!(destination = %plan.destination.display(), "would copy self executable");
    } else {
        copy_self_to(&plan.destination).await?;
        info!(destination = %plan.destination.display(), "copied self executable");
    }

    let candidates = {
        let host = Arc::clone(&host);
        tokio::task::spawn_blocking(move || hookable_vms(&*host))
            .await
            .map_err(|e| Error::Task(e.to_string()))??
    };

    let mut tasks = JoinSet::new();
    for vmid in &candidates {
        if config.dry_run {
            info!(%vmid, hookscript = %plan.hookscript, "would set hookscript");
            continue;
        }
        let host = Arc::clone(&host);
        let vmid = vmid.clone();
        let hookscript = plan.hookscript.clone();
        tasks.spawn(async move { host.set_hookscript(&vmid, &hookscript).await });
    }
    join_first_error(tasks).await?;

    info!(count = candidates.len(), "hookscript installed");
    Ok(candidates)
}

/// VMs whose configuration claims at least one passthrough resource.
fn hookable_vms<H: Host>(host: &H) -> Result<Vec<VmId>> {
    let mut listing = list_vms(host);
    let mut found = Vec::new();
    for record in &mut listing {
        let record = record?;
        if has_host_resources(host, &record.id)? {
            found.push(record.id);
        } else {
            debug!(vmid = %record.id, "no host resources, skipping");
        }
    }
    listing.finish()?;
    Ok(found)
}

/// Copy the running executable to `dest`, replacing it, mode 0755.
pub async fn copy_self_to(dest: &Path) -> Result<()> {
    let io_error = |context: String| move |source: std::io::Error| Error::Io { context, source };

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(io_error(format!("unable to create {}", dest.display())))?;
    copy_self_into(&mut file).await?;
    file.set_permissions(std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(io_error(format!("unable to chmod {}", dest.display())))?;
    file.sync_all()
        .await
        .map_err(io_error(format!("unable to sync {}", dest.display())))
}

/// Stream the running executable into `dst`.
pub async fn copy_self_into<W: AsyncWrite + Unpin + ?Sized>(dst: &mut W) -> Result<()> {
    let exe = std::env::current_exe().map_err(|source| Error::Io {
        context: "unable to get self executable".to_string(),
        source,
    })?;
    let mut src = tokio::fs::File::open(&exe).await.map_err(|source| Error::Io {
        context: format!("unable to open self executable {}", exe.display()),
        source,
    })?;
    let copied = tokio::io::copy(&mut src, dst)
        .await
        .map_err(|source| Error::Io {
            context: "failed to copy self executable".to_string(),
            source,
        })?;
    debug!(bytes = copied, "copied self executable");
    Ok(())
}
