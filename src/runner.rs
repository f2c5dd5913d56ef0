//! `go test` process management

use crate::event::EventStream;
use anyhow::{Context, Result};
use std::io::BufReader;
use std::path::Path;
use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

/// A running `go test -json` invocation
pub struct GoTest {
    child: Child,
}

impl GoTest {
    /// Command line for `go test -count=1 -json <package_path>` run in `wd`
    pub fn command(go: &str, package_path: &str, wd: &Path) -> Command {
        let mut cmd = Command::new(go);
        cmd.args(["test", "-count=1", "-json", package_path])
            .current_dir(wd)
            .stdout(Stdio::piped());
        cmd
    }

    pub fn spawn(go: &str, package_path: &str, wd: &Path) -> Result<Self> {
        tracing::debug!(go, package_path, wd = %wd.display(), "spawning go test");
        let child = Self::command(go, package_path, wd)
            .spawn()
            .with_context(|| format!("Failed to run {} test in {}", go, wd.display()))?;
        Ok(GoTest { child })
    }

    /// The decoded event stream; can only be taken once
    pub fn events(&mut self) -> Result<EventStream<BufReader<ChildStdout>>> {
        let stdout = self
            .child
            .stdout
            .take()
            .context("go test stdout already taken")?;
        Ok(EventStream::new(BufReader::new(stdout)))
    }

    /// Wait for the process; a non-zero exit (failing tests) is not an error here
    pub fn wait(mut self) -> Result<ExitStatus> {
        self.child.wait().context("Failed to wait for go test")
    }
}
