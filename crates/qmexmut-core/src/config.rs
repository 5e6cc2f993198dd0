//! Hook configuration.
//!
//! Loaded once from the environment before anything runs, optionally
//! overridden from command-line flags, then passed by reference.

use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Configuration shared by the hook and the installer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookConfig {
    /// Report state-changing commands instead of running them (default: false).
    pub dry_run: bool,

    /// `qm` executable (default: `qm` from `PATH`).
    pub qm_path: PathBuf,

    /// `pvesh` executable (default: `pvesh` from `PATH`).
    pub pvesh_path: PathBuf,

    /// Cap on concurrently running shutdowns (default: none).
    pub max_concurrent_shutdowns: Option<NonZeroUsize>,
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            qm_path: PathBuf::from("qm"),
            pvesh_path: PathBuf::from("pvesh"),
            max_concurrent_shutdowns: None,
        }
    }
}

impl HookConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `QMEXMUT_DRY_RUN` | `false` |
    /// | `QMEXMUT_QM` | `qm` |
    /// | `QMEXMUT_PVESH` | `pvesh` |
    /// | `QMEXMUT_MAX_SHUTDOWNS` | unbounded |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();

        Self {
            dry_run: lookup("QMEXMUT_DRY_RUN")
                .map(|v| parse_flag(&v))
                .unwrap_or(default.dry_run),
            qm_path: lookup("QMEXMUT_QM")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.qm_path),
            pvesh_path: lookup("QMEXMUT_PVESH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(default.pvesh_path),
            max_concurrent_shutdowns: lookup("QMEXMUT_MAX_SHUTDOWNS")
                .and_then(|v| v.parse::<NonZeroUsize>().ok())
                .or(default.max_concurrent_shutdowns),
        }
    }

    /// Set dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the `qm` executable.
    pub fn with_qm_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.qm_path = path.into();
        self
    }

    /// Cap concurrent shutdowns; zero means unbounded.
    pub fn with_max_concurrent_shutdowns(mut self, max: usize) -> Self {
        self.max_concurrent_shutdowns = NonZeroUsize::new(max);
        self
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "" | "0" | "false" | "no" | "off"
    )
}
