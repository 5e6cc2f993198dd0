//! Running this executable on a remote Proxmox host over ssh.

use anyhow::{bail, Context, Result};
use qmexmut_core::copy_self_into;
use std::process::Stdio;
use tokio::process::Command;

/// Remote shell script: store stdin in a temporary file and run it.
const REMOTE_SCRIPT: &str =
    r#"self=`mktemp` && cat >$self && chmod +x $self && exec $self --rm "$@""#;

/// Stream the running executable to `server` and run it there with `args`.
pub async fn run_remote(server: &str, args: &[String]) -> Result<()> {
    tracing::info!(server, "running on remote");

    let mut cmd = Command::new("ssh");
    cmd.args(ssh_args(server, args))
        .stdin(Stdio::piped())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());

    let mut child = cmd.spawn().context("failed to start ssh")?;
    let mut stdin = child.stdin.take().context("ssh stdin was not piped")?;

    let copied = copy_self_into(&mut stdin).await;
    // closing stdin ends the remote `cat`
    drop(stdin);

    let status = child.wait().await.context("failed to wait for ssh")?;
    copied.context("failed to stream self executable")?;
    if !status.success() {
        bail!("remote self failed: {status}");
    }
    Ok(())
}

/// Arguments to `ssh`; ssh joins them into one remote command line.
fn ssh_args(server: &str, args: &[String]) -> Vec<String> {
    let mut ssh = vec![
        server.to_string(),
        "sh".to_string(),
        "-c".to_string(),
        shell_quote(REMOTE_SCRIPT),
        "--".to_string(),
    ];
    ssh.extend(args.iter().map(|arg| shell_quote(arg)));
    ssh
}

/// Quote `arg` for a POSIX shell.
fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@+%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
