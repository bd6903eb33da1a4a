// src/exec/task_runner.rs

//! Per-command lifecycle: spawn, race completion against timeout and kill, publish
//! the terminal state, route output, enqueue exactly one terminal response.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::dispatch::{Dispatcher, Response};
use crate::engine::render::{self, Outcome};
use crate::errors::ChatShellError;
use crate::exec::backend::{LaunchedProcess, ProcessLauncher, terminating_signal};
use crate::exec::output::{OutputSettings, StreamKind, capture, route_stream};
use crate::registry::{CommandRegistry, TerminationReason};
use crate::types::Command;

/// How long a terminated group gets to exit before it is killed outright.
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Everything a worker needs that is shared across commands.
#[derive(Clone)]
pub struct RunContext {
    pub registry: CommandRegistry,
    pub dispatcher: Dispatcher,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub timeout: Option<Duration>,
    pub output: OutputSettings,
}

/// A queued command plus the receiving end of its kill switch.
#[derive(Debug)]
pub struct Job {
    pub command: Command,
    pub cancel: oneshot::Receiver<()>,
}

enum Wake {
    Settled,
    Deadline,
    KillRequested,
    SwitchDropped,
}

/// Run one command to completion. Never returns an error: every failure ends
/// up as a terminal state plus a response.
pub async fn run_command(ctx: RunContext, job: Job) {
    let Job { command, mut cancel } = job;

    // A receiver that has already resolved must not be polled again.
    let mut switch_open = match cancel.try_recv() {
        Ok(()) => {
            info!(command_id = %command.id, "command killed before it started");
            finish(&ctx, &command, Outcome::killed_before_start()).await;
            return;
        }
        Err(TryRecvError::Empty) => true,
        Err(TryRecvError::Closed) => false,
    };

    if command.text.trim().is_empty() {
        finish(&ctx, &command, Outcome::spawn_failed(ChatShellError::EmptyCommand.to_string())).await;
        return;
    }

    let mut process = match ctx.launcher.start(&command.text) {
        Ok(p) => p,
        Err(err) => {
            warn!(command_id = %command.id, error = %err, "failed to start command");
            let raw = err.to_string();
            ctx.dispatcher
                .report(
                    anyhow::Error::new(err)
                        .context(format!("starting command {} (`{}`)", command.id, command.text)),
                )
                .await;
            finish(&ctx, &command, Outcome::spawn_failed(raw)).await;
            return;
        }
    };

    ctx.registry.mark_running(&command.id, process.pid());
    info!(
        command_id = %command.id,
        pid = ?process.pid(),
        cmd = %command.text,
        "command process started"
    );
    ctx.dispatcher
        .audit(&command.requested_by, render::processing(&command))
        .await;

    let stdout = capture(process.take_stdout());
    let stderr = capture(process.take_stderr());
    let mut running = Running {
        process,
        status: None,
        stdout: Capture::Pending(stdout),
        stderr: Capture::Pending(stderr),
    };

    let deadline = async {
        match ctx.timeout {
            Some(t) => sleep(t).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    // A command is done once the shell has exited and both pipes have closed.
    // Background children holding the pipes keep it active, and still in
    // reach of the timeout and the kill switch.
    let reason = loop {
        let wake = tokio::select! {
            biased;
            () = running.settle() => Wake::Settled,
            _ = &mut deadline => Wake::Deadline,
            res = &mut cancel, if switch_open => match res {
                Ok(()) => Wake::KillRequested,
                Err(_) => Wake::SwitchDropped,
            },
        };

        match wake {
            Wake::Settled => break TerminationReason::Exited,
            Wake::Deadline => {
                info!(command_id = %command.id, timeout = ?ctx.timeout, "command exceeded its timeout");
                ctx.dispatcher
                    .audit(
                        &command.requested_by,
                        format!("Command (ID: {}) exceeded timeout; terminating", command.id),
                    )
                    .await;
                stop(&ctx, &command, &mut running).await;
                break TerminationReason::TimedOut;
            }
            Wake::KillRequested => {
                info!(command_id = %command.id, "kill requested; terminating process group");
                ctx.dispatcher
                    .audit(
                        &command.requested_by,
                        format!("Command (ID: {}) terminating after kill request", command.id),
                    )
                    .await;
                stop(&ctx, &command, &mut running).await;
                break TerminationReason::Killed;
            }
            Wake::SwitchDropped => {
                debug!(command_id = %command.id, "kill switch dropped; waiting for exit");
                switch_open = false;
            }
        }
    };

    // Kill requests arriving from here on find the switch closed.
    drop(cancel);

    let status = running
        .status
        .take()
        .unwrap_or_else(|| Err(io::Error::other("command was never reaped")));
    let (exit_code, signal) = match &status {
        Ok(status) => (status.code(), terminating_signal(status)),
        Err(e) => {
            ctx.dispatcher
                .report(anyhow!("waiting for command {}: {e}", command.id))
                .await;
            (None, None)
        }
    };

    info!(
        command_id = %command.id,
        ?exit_code,
        ?signal,
        %reason,
        "command process finished"
    );

    let stdout = collect(&ctx, &command, running.stdout).await;
    let stderr = collect(&ctx, &command, running.stderr).await;

    let outcome = Outcome {
        reason,
        exit_code,
        signal,
        timeout: ctx.timeout,
        spawn_error: None,
        stdout: route_stream(&command.id, StreamKind::Stdout, &stdout, &ctx.output).await,
        stderr: route_stream(&command.id, StreamKind::Stderr, &stderr, &ctx.output).await,
    };

    ctx.dispatcher
        .audit(
            &command.requested_by,
            format!(
                "Command (ID: {}) produced {} bytes of STDOUT and {} bytes of STDERR",
                command.id,
                stdout.len(),
                stderr.len()
            ),
        )
        .await;

    finish(&ctx, &command, outcome).await;
}

/// A started command and whatever of its exit status and output has been
/// collected so far.
struct Running {
    process: LaunchedProcess,
    status: Option<io::Result<ExitStatus>>,
    stdout: Capture,
    stderr: Capture,
}

enum Capture {
    Pending(JoinHandle<Vec<u8>>),
    Done(Result<Vec<u8>, JoinError>),
}

impl Running {
    /// Drive the exit status and both captures to completion. Cancel safe:
    /// whatever finished before the future is dropped stays recorded.
    async fn settle(&mut self) {
        let Running {
            process,
            status,
            stdout,
            stderr,
        } = self;
        let reap = async move {
            if status.is_none() {
                *status = Some(process.wait().await);
            }
        };
        tokio::join!(reap, stdout.settle(), stderr.settle());
    }

    fn abort_captures(&self) {
        for capture in [&self.stdout, &self.stderr] {
            if let Capture::Pending(handle) = capture {
                handle.abort();
            }
        }
    }
}

impl Capture {
    async fn settle(&mut self) {
        if let Capture::Pending(handle) = self {
            let res = handle.await;
            *self = Capture::Done(res);
        }
    }
}

/// Terminate the whole group, then kill it outright if anything is still
/// running or holding the output pipes after the grace period.
async fn stop(ctx: &RunContext, command: &Command, running: &mut Running) {
    let group = running.process.group();
    if let Err(e) = group.terminate() {
        // Usually the group exited between the trigger and the signal.
        ctx.dispatcher
            .report(
                anyhow::Error::new(e)
                    .context(format!("terminating process group of command {}", command.id)),
            )
            .await;
        if let Err(e) = running.process.kill_direct_child() {
            debug!(command_id = %command.id, error = %e, "direct kill failed");
        }
    }

    if timeout(KILL_GRACE, running.settle()).await.is_ok() {
        return;
    }
    warn!(command_id = %command.id, "process group ignored terminate; killing it");

    if let Err(e) = group.kill() {
        debug!(command_id = %command.id, error = %e, "group kill failed");
    }
    if let Err(e) = running.process.kill_direct_child() {
        debug!(command_id = %command.id, error = %e, "direct kill failed");
    }

    if timeout(KILL_GRACE, running.settle()).await.is_ok() {
        return;
    }
    // Something outside the group still holds the pipes.
    warn!(command_id = %command.id, "output pipes still open after kill; abandoning capture");
    running.abort_captures();
    running.settle().await;
}

async fn collect(ctx: &RunContext, command: &Command, capture: Capture) -> Vec<u8> {
    let res = match capture {
        Capture::Done(res) => res,
        Capture::Pending(handle) => handle.await,
    };
    match res {
        Ok(bytes) => bytes,
        Err(e) => {
            ctx.dispatcher
                .report(anyhow!("output capture for command {} failed: {e}", command.id))
                .await;
            Vec::new()
        }
    }
}

/// Publish the terminal state, then enqueue the single terminal response.
async fn finish(ctx: &RunContext, command: &Command, outcome: Outcome) {
    ctx.registry
        .mark_terminal(&command.id, outcome.exit_code, outcome.reason);

    let (text, attachments) = render::outcome(command, outcome);
    ctx.dispatcher
        .audit(&command.requested_by, render::response_audit(command))
        .await;
    ctx.dispatcher.respond(Response { text, attachments }).await;
}
