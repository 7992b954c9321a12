//! Hypervisor connection handle.
//!
//! A [`Connection`] owns one endpoint URI and drives libvirt through the
//! `virsh` binary with structured argument lists. Opening the handle probes
//! the endpoint with a cheap round-trip; once closed, every dependent
//! operation fails with [`Error::EndpointUnavailable`] instead of silently
//! reconnecting. Replacing the endpoint means closing (or dropping) the old
//! handle and opening a new one, so at most one live handle exists per
//! owner.

use std::ffi::OsStr;
use std::io;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{Error, Result};

/// Wall-clock bound on the connection probe.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Live handle to a virtualization daemon, keyed by its connection URI.
#[derive(Debug)]
pub struct Connection {
    uri: String,
    open: bool,
}

impl Connection {
    /// Probe `uri` and return an open handle.
    ///
    /// The probe asks virsh to echo the canonical URI back
    /// (`virsh -c <uri> uri`), which forces the transport to actually
    /// connect. Failure surfaces as [`Error::Connection`] and is never
    /// retried here; callers re-prompt for a new URI instead.
    pub fn open(uri: &str) -> Result<Self> {
        let mut cmd = Command::new("virsh");
        cmd.arg("-c").arg(uri).arg("uri");
        let output = run_with_timeout(cmd, CONNECT_TIMEOUT).map_err(|e| Error::Connection {
            uri: uri.to_string(),
            message: e.to_string(),
        })?;
        if !output.status.success() {
            return Err(Error::Connection {
                uri: uri.to_string(),
                message: stderr_text(&output),
            });
        }
        debug!(uri, "connected to hypervisor endpoint");
        Ok(Self {
            uri: uri.to_string(),
            open: true,
        })
    }

    /// The URI this handle was opened with, preserved verbatim.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Whether the handle is still usable.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Mark the handle closed. Subsequent operations fail with
    /// [`Error::EndpointUnavailable`].
    pub fn close(&mut self) {
        debug!(uri = %self.uri, "closing hypervisor endpoint");
        self.open = false;
    }

    /// Already-closed handle for exercising dependent failure paths.
    #[cfg(test)]
    pub(crate) fn closed(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            open: false,
        }
    }

    /// Build a `virsh -c <uri>` command for a dependent operation.
    pub(crate) fn command(&self) -> Result<Command> {
        if !self.open {
            return Err(Error::EndpointUnavailable);
        }
        let mut cmd = Command::new("virsh");
        cmd.arg("-c").arg(&self.uri);
        Ok(cmd)
    }

    /// Run one virsh round-trip and capture its output.
    ///
    /// Only spawn failures and a closed handle error here; a non-zero exit
    /// is returned to the caller, which maps it onto the typed taxonomy for
    /// its operation.
    pub(crate) fn output<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command()?;
        cmd.args(args);
        Ok(cmd.output()?)
    }

    /// As [`Connection::output`], but bounded by a wall-clock timeout.
    /// Used for streaming operations whose hang would otherwise be
    /// indefinite.
    pub(crate) fn output_with_timeout<I, S>(&self, args: I, timeout: Duration) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = self.command()?;
        cmd.args(args);
        Ok(run_with_timeout(cmd, timeout)?)
    }
}

/// Trimmed stderr of a finished virsh invocation.
pub(crate) fn stderr_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}

/// Trimmed stdout of a finished virsh invocation.
pub(crate) fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Spawn `cmd` and wait for it, killing it once `timeout` elapses.
///
/// Suitable only for commands with small output: both pipes are drained
/// after exit, so a child that fills a pipe buffer before exiting would
/// stall. The probe and upload invocations used here print at most a few
/// lines.
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> io::Result<Output> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = cmd.spawn()?;
    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return child.wait_with_output();
        }
        if Instant::now() >= deadline {
            child.kill()?;
            let _ = child.wait();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("no response within {}s", timeout.as_secs()),
            ));
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
