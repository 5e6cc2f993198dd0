//! The hypervisor command surface.
//!
//! Interrogative commands (`qm list`, `qm config`) are exposed as lazily
//! started line sources; state-changing commands (`qm shutdown`, `qm set`)
//! and storage discovery are async and run to completion.

use crate::config::HookConfig;
use crate::error::{Error, Result};
use crate::scan::{describe, CommandLines, LineSource};
use crate::storage::StorageEntry;
use crate::types::VmId;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, info};

/// Trait for the hypervisor host this hook runs on.
///
/// This abstraction lets the conflict and shutdown logic run against a
/// scripted host in tests.
#[async_trait]
pub trait Host: Send + Sync + 'static {
    /// Line source bound to one interrogative command.
    type Lines: LineSource + Send;

    /// Tabular listing of every defined VM, header line first.
    fn list(&self) -> Self::Lines;

    /// `key: value` configuration lines of one VM.
    fn config(&self, vmid: &VmId) -> Self::Lines;

    /// Request a clean shutdown of a VM.
    async fn shutdown(&self, vmid: &VmId) -> Result<()>;

    /// Register a hookscript volume reference on a VM.
    async fn set_hookscript(&self, vmid: &VmId, hookscript: &str) -> Result<()>;

    /// Storages configured on the host.
    async fn storages(&self) -> Result<Vec<StorageEntry>>;
}

/// Proxmox VE host driven through `qm` and `pvesh`.
#[derive(Debug, Clone)]
pub struct ProxmoxHost {
    qm: PathBuf,
    pvesh: PathBuf,
}

impl ProxmoxHost {
    pub fn new(config: &HookConfig) -> Self {
        Self {
            qm: config.qm_path.clone(),
            pvesh: config.pvesh_path.clone(),
        }
    }

    fn qm(&self) -> std::process::Command {
        std::process::Command::new(&self.qm)
    }

    /// Run a state-changing `qm` command with inherited output.
    async fn run_qm(&self, args: &[&str]) -> Result<()> {
        let mut cmd = std::process::Command::new(&self.qm);
        cmd.args(args);
        let command_line = describe(&cmd);
        info!(command = %command_line, "run");

        let status = tokio::process::Command::from(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|source| Error::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if !status.success() {
            return Err(Error::Exit {
                command: command_line,
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Host for ProxmoxHost {
    type Lines = CommandLines;

    fn list(&self) -> CommandLines {
        let mut cmd = self.qm();
        cmd.arg("list");
        CommandLines::new(cmd)
    }

    fn config(&self, vmid: &VmId) -> CommandLines {
        let mut cmd = self.qm();
        cmd.args(["config", vmid.as_str()]);
        CommandLines::new(cmd)
    }

    async fn shutdown(&self, vmid: &VmId) -> Result<()> {
        self.run_qm(&["shutdown", vmid.as_str()]).await
    }

    async fn set_hookscript(&self, vmid: &VmId, hookscript: &str) -> Result<()> {
        self.run_qm(&["set", vmid.as_str(), "--hookscript", hookscript])
            .await
    }

    async fn storages(&self) -> Result<Vec<StorageEntry>> {
        let mut cmd = std::process::Command::new(&self.pvesh);
        cmd.args(["get", "/storage", "--output-format", "json"]);
        let command_line = describe(&cmd);
        debug!(command = %command_line, "querying storages");

        let output = tokio::process::Command::from(cmd)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit())
            .output()
            .await
            .map_err(|source| Error::Spawn {
                command: command_line.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::Exit {
                command: command_line,
                status: output.status,
            });
        }

        serde_json::from_slice(&output.stdout).map_err(|source| Error::Json {
            command: command_line,
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::Finish;
    use std::os::unix::fs::PermissionsExt;

    fn host_with(qm: impl Into<PathBuf>, pvesh: impl Into<PathBuf>) -> ProxmoxHost {
        let mut config = HookConfig::default().with_qm_path(qm);
        config.pvesh_path = pvesh.into();
        ProxmoxHost::new(&config)
    }

    #[test]
    fn test_config_lines_pass_vmid() {
        // `echo` stands in for qm and prints the arguments it was given
        let host = host_with("echo", "pvesh");

        let mut lines = host.config(&VmId::from("101"));
        assert_eq!(lines.next().unwrap().unwrap(), "config 101");
        assert!(lines.next().is_none());
        lines.finish().unwrap();
    }

    #[test]
    fn test_list_command() {
        let host = host_with("echo", "pvesh");
        let mut lines = host.list();
        assert_eq!(lines.command(), "echo list");
        assert_eq!(lines.next().unwrap().unwrap(), "list");
        lines.finish().unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_exit_status() {
        host_with("true", "pvesh")
            .shutdown(&VmId::from("101"))
            .await
            .unwrap();

        let err = host_with("false", "pvesh")
            .shutdown(&VmId::from("102"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Exit { .. }));
        assert_eq!(err.command(), Some("false shutdown 102"));
    }

    #[tokio::test]
    async fn test_set_hookscript_args() {
        let err = host_with("false", "pvesh")
            .set_hookscript(&VmId::from("101"), "local:snippets/qmexmut.hook")
            .await
            .unwrap_err();
        assert_eq!(
            err.command(),
            Some("false set 101 --hookscript local:snippets/qmexmut.hook")
        );
    }

    #[tokio::test]
    async fn test_shutdown_missing_qm() {
        let host = host_with("/nonexistent/qm", "pvesh");
        let err = host.shutdown(&VmId::from("101")).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_storages_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let pvesh = dir.path().join("pvesh");
        std::fs::write(
            &pvesh,
            "#!/bin/sh\necho '[{\"storage\":\"local\",\"content\":\"snippets\",\"path\":\"/var/lib/vz\"}]'\n",
        )
        .unwrap();
        std::fs::set_permissions(&pvesh, std::fs::Permissions::from_mode(0o755)).unwrap();
        let host = host_with("qm", pvesh);

        let storages = host.storages().await.unwrap();
        assert_eq!(storages.len(), 1);
        assert_eq!(storages[0].name, "local");
        assert_eq!(storages[0].dir(), Some("/var/lib/vz"));
    }

    #[tokio::test]
    async fn test_storages_bad_json() {
        // echo prints its arguments, which are not JSON
        let err = host_with("qm", "echo").storages().await.unwrap_err();
        assert!(matches!(err, Error::Json { .. }));
    }

    #[tokio::test]
    async fn test_storages_failed_command() {
        let err = host_with("qm", "false").storages().await.unwrap_err();
        assert!(matches!(err, Error::Exit { .. }));
    }
}
