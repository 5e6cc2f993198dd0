//! Command-line flags.

use clap::Parser;
use qmexmut_core::HookConfig;

#[derive(Parser, Debug)]
#[command(name = "qmexmut")]
#[command(about = "Shut down VMs sharing passthrough hardware before a VM starts", long_about = None)]
pub struct Cli {
    /// Upload to and execute on a remote host using ssh
    #[arg(long, value_name = "HOST")]
    pub ssh: Option<String>,

    /// Remove the executable once done
    #[arg(long)]
    pub rm: bool,

    /// Override the argv[0] command name
    #[arg(long, value_name = "NAME")]
    pub cmd: Option<String>,

    /// Report changes instead of making them
    #[arg(long)]
    pub dry_run: bool,

    /// Shut down at most this many VMs at once
    #[arg(long, value_name = "N")]
    pub max_shutdowns: Option<usize>,

    /// Hook arguments: <vmid> <phase>
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    /// Apply flag overrides on top of the environment configuration.
    pub fn apply(&self, mut config: HookConfig) -> HookConfig {
        if self.dry_run {
            config = config.with_dry_run(true);
        }
        if let Some(max) = self.max_shutdowns {
            config = config.with_max_concurrent_shutdowns(max);
        }
        config
    }

    /// Arguments for the copy started on a remote host.
    ///
    /// `--ssh` and `--rm` are not forwarded; the remote side adds its own
    /// `--rm`.
    pub fn remote_args(&self) -> Vec<String> {
        let mut forwarded = Vec::new();
        if self.dry_run {
            forwarded.push("--dry-run".to_string());
        }
        if let Some(max) = self.max_shutdowns {
            forwarded.push("--max-shutdowns".to_string());
            forwarded.push(max.to_string());
        }
        if let Some(cmd) = &self.cmd {
            forwarded.push("--cmd".to_string());
            forwarded.push(cmd.clone());
        }
        if !self.args.is_empty() {
            forwarded.push("--".to_string());
            forwarded.extend(self.args.iter().cloned());
        }
        forwarded
    }
}
