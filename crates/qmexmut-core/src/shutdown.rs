//! Concurrent shutdown of mutual VMs.
//!
//! Each running mutual gets its own task on a [`JoinSet`]. All tasks are
//! joined before returning; the first failure is reported and the others are
//! logged, and no task is cancelled because a sibling failed.

use crate::config::HookConfig;
use crate::error::{Error, Result};
use crate::host::Host;
use crate::types::{VmRecord, VmStatus};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Shut down every running VM in `mutuals`.
///
/// Stopped VMs are left alone and VMs in any other state are reported and
/// left alone. Under dry run nothing is issued.
pub async fn stop_mutuals<H: Host>(
    host: Arc<H>,
    mutuals: Vec<VmRecord>,
    config: &HookConfig,
) -> Result<()> {
    let limit = config
        .max_concurrent_shutdowns
        .map(|max| Arc::new(Semaphore::new(max.get())));
    let mut tasks = JoinSet::new();

    for mutual in mutuals {
        match &mutual.status {
            VmStatus::Running => {}
            VmStatus::Stopped => {
                debug!(vmid = %mutual.id, name = %mutual.name, "mutual VM already stopped");
                continue;
            }
            VmStatus::Unknown(status) => {
                warn!(
                    vmid = %mutual.id,
                    name = %mutual.name,
                    status = %status,
                    "not stopping mutual VM in unknown state"
                );
                continue;
            }
        }

        if config.dry_run {
            info!(vmid = %mutual.id, name = %mutual.name, "would shut down mutual VM");
            continue;
        }

        let host = Arc::clone(&host);
        let limit = limit.clone();
        tasks.spawn(async move {
            let _permit = match limit {
                Some(limit) => match limit.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    Err(e) => return Err(Error::Task(format!("shutdown limiter closed: {e}"))),
                },
                None => None,
            };
            info!(vmid = %mutual.id, name = %mutual.name, "shutting down mutual VM");
            host.shutdown(&mutual.id).await
        });
    }

    join_first_error(tasks).await
}

/// Wait for every task, returning the first error in completion order.
pub(crate) async fn join_first_error(mut tasks: JoinSet<Result<()>>) -> Result<()> {
    let mut first = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.unwrap_or_else(|e| Err(Error::Task(e.to_string())));
        if let Err(e) = result {
            if first.is_none() {
                first = Some(e);
            } else {
                warn!(error = %e, "additional task failure");
            }
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
