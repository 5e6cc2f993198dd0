//! # qmexmut-core
//!
//! Keeps VMs that pass through the same host hardware from running at the
//! same time on a Proxmox VE host.
//!
//! Installed as a hookscript, it runs before a VM starts, finds every other
//! VM whose configuration claims one of the same PCI or USB devices, and
//! shuts down the ones that are running.
//!
//! ## Architecture
//!
//! ```text
//! run_hook(vmid, "pre-start")
//!     │
//!     ▼
//! mutuals(vmid) ─────────────── one process at a time ───────────────┐
//!     │  host_resources(vmid)          qm config <vmid>              │
//!     │  list_vms()                    qm list                       │
//!     │  shares_host_resources(other)  qm config <other> (early exit)│
//!     │                                                              │
//!     │   CommandLines ─▶ Matches ─▶ Labels ─▶ ResourceSet           │
//!     ▼                                                              │
//! stop_mutuals(mutuals) ◀────────────────────────────────────────────┘
//!     ├─▶ qm shutdown <a>  ┐
//!     ├─▶ qm shutdown <b>  ├─ JoinSet, first error wins
//!     └─▶ qm shutdown <c>  ┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use qmexmut_core::{run_hook, HookConfig, ProxmoxHost};
//! use std::sync::Arc;
//!
//! # async fn example() -> qmexmut_core::Result<()> {
//! let config = HookConfig::from_env();
//! let host = Arc::new(ProxmoxHost::new(&config));
//!
//! let args = vec!["101".to_string(), "pre-start".to_string()];
//! run_hook(host, &config, "qmexmut.hook", &args).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod conflict;
pub mod error;
pub mod hook;
pub mod host;
pub mod install;
pub mod matcher;
pub mod recognize;
pub mod scan;
pub mod shutdown;
pub mod storage;
pub mod types;

pub use config::HookConfig;
pub use conflict::{has_host_resources, host_resources, list_vms, mutuals, shares_host_resources};
pub use error::{Error, Result};
pub use hook::{run_hook, stop_mutuals_of, Phase};
pub use host::{Host, ProxmoxHost};
pub use install::{copy_self_into, copy_self_to, install, InstallPlan, HOOK_COMMAND_NAME};
pub use matcher::{Captures, LineSourceExt, Matches};
pub use recognize::{classify, label_host_resource, Labels};
pub use scan::{CommandLines, Finish, LineSource, StaticLines};
pub use shutdown::stop_mutuals;
pub use storage::{find_snippet_store, StorageEntry};
pub use types::{ResourceLabel, ResourceSet, VmId, VmRecord, VmStatus};
