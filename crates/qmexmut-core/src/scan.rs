//! Incremental line scanning over an external command's output.
//!
//! A [`CommandLines`] is bound to exactly one external process. The process
//! is spawned lazily on the first call to `next()`, lines are read one at a
//! time as the consumer asks for them, and [`Finish::finish`] tears the
//! process down when the consumer is done, whether it drained the output or
//! stopped early.
//!
//! ```text
//! CommandLines ──▶ Matches (regex) ──▶ Labels (classifier)
//!   next()           next()              next()
//!   finish() ◀────── finish() ◀───────── finish()
//! ```

use crate::error::{Error, Result};
use std::io::{BufRead, BufReader};
use std::os::unix::process::ExitStatusExt;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};
use tracing::{debug, trace, warn};

/// Release of a scan session.
///
/// Implemented by every stage of the scanning pipeline, so a consumer holding
/// the outermost stage can end the whole chain.
pub trait Finish {
    /// Terminate the underlying command if it is still running, reap it, and
    /// report how it ended.
    fn finish(self) -> Result<()>;
}

/// A finite, non-restartable source of output lines.
pub trait LineSource: Iterator<Item = Result<String>> + Finish {}

impl<T: Iterator<Item = Result<String>> + Finish> LineSource for T {}

/// Lines of one external command's standard output.
pub struct CommandLines {
    command: Command,
    display: String,
    child: Option<Child>,
    reader: Option<BufReader<ChildStdout>>,
    /// An error was already handed to the consumer.
    failed: bool,
    exhausted: bool,
}

impl CommandLines {
    /// Bind to a command without starting it.
    pub fn new(mut command: Command) -> Self {
        let display = describe(&command);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        Self {
            command,
            display,
            child: None,
            reader: None,
            failed: false,
            exhausted: false,
        }
    }

    /// The command line, for diagnostics.
    pub fn command(&self) -> &str {
        &self.display
    }

    /// OS process id, once started and until reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn start(&mut self) -> Result<()> {
        debug!(command = %self.display, "starting command");
        let mut child = self.command.spawn().map_err(|source| Error::Spawn {
            command: self.display.clone(),
            source,
        })?;
        let stdout = child.stdout.take();
        self.child = Some(child);
        let stdout = stdout.ok_or_else(|| Error::Spawn {
            command: self.display.clone(),
            source: std::io::Error::other("stdout was not captured"),
        })?;
        self.reader = Some(BufReader::new(stdout));
        Ok(())
    }

    fn read_line(&mut self) -> Option<Result<String>> {
        let reader = self.reader.as_mut()?;
        let mut buf = Vec::new();
        match reader.read_until(b'\n', &mut buf) {
            Ok(0) => {
                self.exhausted = true;
                None
            }
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                let line = String::from_utf8_lossy(&buf).into_owned();
                trace!(command = %self.display, line = %line, "read line");
                Some(Ok(line))
            }
            Err(source) => Some(Err(Error::Read {
                command: self.display.clone(),
                source,
            })),
        }
    }

    /// Kill if still running, then reap.
    fn reap(&mut self) -> Result<()> {
        self.reader = None;
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let wait_error = |source| Error::Wait {
            command: self.display.clone(),
            source,
        };
        let status = match child.try_wait().map_err(wait_error)? {
            Some(status) => status,
            None => {
                debug!(command = %self.display, pid = child.id(), "terminating unfinished command");
                // Fails only if the child already exited, which wait() reports.
                let _ = child.kill();
                child.wait().map_err(wait_error)?
            }
        };
        debug!(command = %self.display, %status, "command reaped");

        if self.failed || status.success() || killed_by_us(status) {
            return Ok(());
        }
        Err(Error::Exit {
            command: self.display.clone(),
            status,
        })
    }
}

impl Iterator for CommandLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.exhausted {
            return None;
        }
        if self.child.is_none() {
            if let Err(e) = self.start() {
                self.failed = true;
                return Some(Err(e));
            }
        }
        let item = self.read_line();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

impl Finish for CommandLines {
    fn finish(mut self) -> Result<()> {
        self.reap()
    }
}

impl Drop for CommandLines {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(e) = self.reap() {
                warn!(error = %e, "error while abandoning command");
            }
        }
    }
}

/// Lines already held in memory, e.g. output captured earlier.
#[derive(Debug, Clone, Default)]
pub struct StaticLines {
    lines: std::vec::IntoIter<String>,
}

impl StaticLines {
    pub fn new<I, L>(lines: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        Self {
            lines: lines.into_iter(),
        }
    }

    /// Split captured output into lines.
    pub fn from_output(output: &str) -> Self {
        Self::new(output.lines())
    }
}

impl Iterator for StaticLines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next().map(Ok)
    }
}

impl Finish for StaticLines {
    fn finish(self) -> Result<()> {
        Ok(())
    }
}

/// SIGKILL is what [`CommandLines::reap`] sends, so it is an expected ending.
fn killed_by_us(status: ExitStatus) -> bool {
    status.signal() == Some(libc::SIGKILL)
}

/// Render a command line the way a shell user would type it.
pub(crate) fn describe(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandLines {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        CommandLines::new(cmd)
    }

    fn is_alive(pid: u32) -> bool {
        // Signal 0 probes for existence without delivering anything.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[test]
    fn test_reads_all_lines() {
        let mut lines = sh("printf 'one\\ntwo\\r\\nthree'");
        let got: Vec<String> = (&mut lines).map(|l| l.unwrap()).collect();
        assert_eq!(got, vec!["one", "two", "three"]);
        lines.finish().expect("clean exit");
    }

    #[test]
    fn test_not_started_until_first_read() {
        let mut lines = sh("echo hi");
        assert!(lines.id().is_none());
        assert_eq!(lines.next().unwrap().unwrap(), "hi");
        assert!(lines.id().is_some());
        lines.finish().unwrap();
    }

    #[test]
    fn test_finish_without_reading_is_ok() {
        let lines = sh("exit 3");
        lines.finish().expect("never started, nothing to report");
    }

    #[test]
    fn test_nonzero_exit_reported() {
        let mut lines = sh("echo partial; exit 3");
        assert_eq!(lines.next().unwrap().unwrap(), "partial");
        assert!(lines.next().is_none());
        let err = lines.finish().unwrap_err();
        assert!(matches!(err, Error::Exit { .. }));
        assert_eq!(err.command(), Some("sh -c echo partial; exit 3"));
    }

    #[test]
    fn test_spawn_failure_is_sticky() {
        let mut lines = CommandLines::new(Command::new("/nonexistent/qmexmut-test"));
        assert!(matches!(lines.next(), Some(Err(Error::Spawn { .. }))));
        assert!(lines.next().is_none());
        assert!(lines.next().is_none());
        lines.finish().expect("error already reported");
    }

    #[test]
    fn test_early_finish_kills_without_error() {
        let mut lines = sh("while true; do echo y; done");
        assert_eq!(lines.next().unwrap().unwrap(), "y");
        let pid = lines.id().expect("started");
        lines.finish().expect("self-induced kill is not an error");
        assert!(!is_alive(pid), "process must be reaped after finish");
    }

    #[test]
    fn test_drop_reaps_unfinished_command() {
        let mut lines = sh("while true; do echo y; done");
        lines.next();
        let pid = lines.id().expect("started");
        drop(lines);
        assert!(!is_alive(pid));
    }

    #[test]
    fn test_describe() {
        let mut cmd = Command::new("qm");
        cmd.args(["config", "101"]);
        assert_eq!(describe(&cmd), "qm config 101");
    }
}
