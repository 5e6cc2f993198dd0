//! Error types for qmexmut-core.

use std::io;
use std::process::ExitStatus;
use thiserror::Error;

/// Result type alias for qmexmut-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while detecting or stopping mutual VMs.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed hook invocation
    #[error("usage: {0}")]
    Usage(String),

    /// Hook invoked with a phase we do not know
    #[error("got unknown phase {0:?}")]
    UnknownPhase(String),

    /// External command could not be started
    #[error("failed to start {command:?}: {source}")]
    Spawn {
        /// Command line that failed
        command: String,
        source: io::Error,
    },

    /// Reading an external command's output failed
    #[error("failed to read output of {command:?}: {source}")]
    Read {
        /// Command line whose output failed
        command: String,
        source: io::Error,
    },

    /// Reaping an external command failed
    #[error("failed to wait for {command:?}: {source}")]
    Wait {
        /// Command line that could not be reaped
        command: String,
        source: io::Error,
    },

    /// External command terminated abnormally
    #[error("command {command:?} failed: {status}")]
    Exit {
        /// Command line that failed
        command: String,
        /// Exit status as reported by the OS
        status: ExitStatus,
    },

    /// External command emitted JSON we could not decode
    #[error("failed to decode JSON from {command:?}: {source}")]
    Json {
        /// Command line that produced the output
        command: String,
        source: serde_json::Error,
    },

    /// No storage can hold the hookscript
    #[error("no storage with a path accepts snippets")]
    NoSnippetStorage,

    /// Filesystem failure during installation
    #[error("{context}: {source}")]
    Io {
        /// What we were doing
        context: String,
        source: io::Error,
    },

    /// A spawned task panicked or could not run
    #[error("task failed: {0}")]
    Task(String),
}

impl Error {
    /// Check if this error comes from an invocation mistake rather than a failure.
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_) | Error::UnknownPhase(_))
    }

    /// Command line this error is attributed to, if any.
    pub fn command(&self) -> Option<&str> {
        match self {
            Error::Spawn { command, .. }
            | Error::Read { command, .. }
            | Error::Wait { command, .. }
            | Error::Exit { command, .. }
            | Error::Json { command, .. } => Some(command),
            _ => None,
        }
    }
}
