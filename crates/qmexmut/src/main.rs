//! qmexmut entry point.
//!
//! One executable, dispatched on its command name:
//!
//! - **qmexmut.hook**: Proxmox hookscript, `qmexmut.hook <vmid> <phase>`
//! - **anything else**: installer, copies itself into a snippet storage and
//!   registers itself on every VM with passthrough hardware
//!
//! `--ssh <host>` runs the same thing on a remote Proxmox host instead.

mod cli;
mod remote;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use qmexmut_core::{install, run_hook, HookConfig, ProxmoxHost, HOOK_COMMAND_NAME};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout belongs to the commands we run
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("qmexmut=info".parse()?)
                .add_directive("qmexmut_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let _self_removal = if cli.rm { SelfRemoval::arm() } else { None };

    if let Some(server) = &cli.ssh {
        return remote::run_remote(server, &cli.remote_args()).await;
    }

    let command = cli.cmd.clone().unwrap_or_else(command_name);
    let config = cli.apply(HookConfig::from_env());
    tracing::debug!(%command, ?config, "configuration loaded");

    let host = Arc::new(ProxmoxHost::new(&config));
    if command == HOOK_COMMAND_NAME {
        run_hook(host, &config, &command, &cli.args).await?;
    } else {
        if !cli.args.is_empty() {
            tracing::warn!(args = ?cli.args, "installer takes no arguments, ignoring");
        }
        let hooked = install(host, &config)
            .await
            .context("failed to install hookscript")?;
        tracing::info!(count = hooked.len(), vms = ?hooked, "installation complete");
    }
    Ok(())
}

/// Basename of argv[0].
fn command_name() -> String {
    std::env::args_os()
        .next()
        .as_deref()
        .and_then(|arg0| Path::new(arg0).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "qmexmut".to_string())
}

/// Deletes the running executable when dropped.
struct SelfRemoval {
    path: PathBuf,
}

impl SelfRemoval {
    fn arm() -> Option<Self> {
        match std::env::current_exe() {
            Ok(path) => Some(Self { path }),
            Err(e) => {
                tracing::warn!(error = %e, "unable to locate self executable, not removing it");
                None
            }
        }
    }
}

impl Drop for SelfRemoval {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove self executable");
        }
    }
}
