use std::ffi::OsStr;
use std::process::Output;
use std::time::Duration;

use cephmon_primitives::Primitive;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Runs the external commands behind each primitive under a deadline.
#[derive(Clone, Debug)]
pub(crate) struct CommandRunner {
    timeout: Duration,
}

impl CommandRunner {
    pub(crate) const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Runs `program` and returns its output if it exited successfully.
    ///
    /// Arguments are never logged: some primitives carry secrets on the
    /// command line.
    pub(crate) async fn run<I, S>(
        &self,
        primitive: Primitive,
        program: &'static str,
        args: I,
    ) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = self.output(primitive, program, args).await?;

        if !output.status.success() {
            return Err(Error::NonZeroExit(primitive, output.status));
        }

        Ok(output)
    }

    /// Runs `program` and returns its output whatever the exit status.
    pub(crate) async fn output<I, S>(
        &self,
        primitive: Primitive,
        program: &'static str,
        args: I,
    ) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let executable =
            which::which(program).map_err(|e| Error::MissingBinary(primitive, program, e))?;

        debug!(%primitive, "running {}", executable.display());

        let child = Command::new(&executable)
            .args(args)
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .map_err(|_| Error::TimedOut(primitive, self.timeout))?
            .map_err(|e| Error::Io(primitive, e))?;

        log_lines(primitive, &output);

        Ok(output)
    }
}

// stdout is left to the caller; key retrieval prints secrets there
fn log_lines(primitive: Primitive, output: &Output) {
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        if line.trim().is_empty() {
            continue;
        }

        if output.status.success() {
            info!(%primitive, "{line}");
        } else {
            warn!(%primitive, "{line}");
        }
    }
}
