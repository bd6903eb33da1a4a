// src/exec/backend.rs

//! Process capability interface.
//!
//! The runner only needs three operations: start a command line in its own
//! process group, wait for it, and terminate the whole group. These are
//! platform specific:
//!
//! - On unix the child is placed in a fresh process group (`pgid == pid`)
//!   and termination sends `SIGTERM` to `-pgid`, reaching every process the
//!   command forked.
//! - Elsewhere there is no group signal; termination falls back to killing
//!   the direct child only. A job-object based implementation would be needed
//!   for full tree termination on Windows.

use std::io;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::debug;

/// Starts command lines as isolated processes.
pub trait ProcessLauncher: Send + Sync {
    fn start(&self, command_line: &str) -> io::Result<LaunchedProcess>;
}

/// Runs command lines through `<shell> -c <line>`.
#[derive(Debug, Clone)]
pub struct ShellLauncher {
    shell: String,
}

impl ShellLauncher {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl ProcessLauncher for ShellLauncher {
    fn start(&self, command_line: &str) -> io::Result<LaunchedProcess> {
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(command_line);
            c
        } else {
            let mut c = Command::new(&self.shell);
            c.arg("-c").arg(command_line);
            c
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id();
        debug!(shell = %self.shell, ?pid, "spawned command in new process group");

        Ok(LaunchedProcess {
            group: ProcessGroup { pgid: pid },
            child,
        })
    }
}

/// A started process. Exclusively owned by the worker running it.
#[derive(Debug)]
pub struct LaunchedProcess {
    child: Child,
    group: ProcessGroup,
}

impl LaunchedProcess {
    pub fn pid(&self) -> Option<u32> {
        self.group.pgid
    }

    /// Handle that can terminate this process's group from anywhere.
    pub fn group(&self) -> ProcessGroup {
        self.group
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Non-unix fallback for [`ProcessGroup::terminate`].
    pub fn kill_direct_child(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }
}

/// Copyable handle naming a process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    /// Send a terminate signal to every process in the group.
    ///
    /// Signalling a group whose members have all exited fails with `ESRCH`;
    /// callers treat that as a benign race.
    pub fn terminate(&self) -> io::Result<()> {
        self.signal(Signal::Terminate)
    }

    /// Kill every process in the group outright. Used once the group has
    /// ignored [`ProcessGroup::terminate`] for the grace period.
    pub fn kill(&self) -> io::Result<()> {
        self.signal(Signal::Kill)
    }

    #[cfg(unix)]
    fn signal(&self, signal: Signal) -> io::Result<()> {
        let pgid = self.pgid.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "process has already been reaped")
        })?;
        let pgid = libc::pid_t::try_from(pgid)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
        let signo = match signal {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };

        // SAFETY: kill(2) has no memory-safety preconditions; a negative pid
        // addresses the process group.
        let rc = unsafe { libc::kill(-pgid, signo) };
        if rc == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }

    #[cfg(not(unix))]
    fn signal(&self, _signal: Signal) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process group termination is only available on unix",
        ))
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}

/// Whether the exit status came from a signal rather than `exit()`.
pub fn terminating_signal(status: &ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    }
    #[cfg(not(unix))]
    {
        let _ = status;
        None
    }
}
