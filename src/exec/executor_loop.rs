// src/exec/executor_loop.rs

//! Bounded work queue, bounded worker pool and the kill routine.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Semaphore, mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::ShellConfig;
use crate::dispatch::Dispatcher;
use crate::engine::render;
use crate::errors::{ChatShellError, Result};
use crate::exec::task_runner::{Job, RunContext, run_command};
use crate::registry::{CommandRegistry, TerminationReason};
use crate::types::{Command, CommandId};

/// Sizing of the executor.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorSettings {
    pub max_workers: usize,
    pub queue_length: usize,
    /// Fire every kill switch when shutting down.
    pub kill_on_shutdown: bool,
}

impl From<&ShellConfig> for ExecutorSettings {
    fn from(shell: &ShellConfig) -> Self {
        Self {
            max_workers: shell.max_workers,
            queue_length: shell.queue_length,
            kill_on_shutdown: shell.kill_on_shutdown,
        }
    }
}

/// One-shot kill switches for every command that has not finished yet.
///
/// A switch is armed when the command is accepted, so pending commands can be
/// killed before they start.
#[derive(Debug, Clone, Default)]
struct KillSwitches {
    inner: Arc<Mutex<HashMap<CommandId, oneshot::Sender<()>>>>,
}

impl KillSwitches {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CommandId, oneshot::Sender<()>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(&self, id: CommandId) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.lock().insert(id, tx);
        rx
    }

    fn take(&self, id: &CommandId) -> Option<oneshot::Sender<()>> {
        self.lock().remove(id)
    }

    fn take_all(&self) -> Vec<(CommandId, oneshot::Sender<()>)> {
        self.lock().drain().collect()
    }
}

/// Cloneable producer side of the executor.
#[derive(Debug, Clone)]
pub struct ExecutorHandle {
    jobs: mpsc::Sender<Job>,
    kills: mpsc::Sender<CommandId>,
    switches: KillSwitches,
    registry: CommandRegistry,
    dispatcher: Dispatcher,
}

impl ExecutorHandle {
    /// Register `command`, acknowledge it, and queue it for a worker.
    ///
    /// Waits while the queue is full. If the executor is shutting down the
    /// command is marked terminal and `QueueClosed` is returned; the caller
    /// owes the requester a response.
    pub async fn submit(&self, command: Command) -> Result<CommandId> {
        let id = command.id;
        self.registry.insert(command.clone())?;
        let cancel = self.switches.arm(id);

        let ack = self
            .dispatcher
            .audit(&command.requested_by, render::received(&command))
            .await;
        self.dispatcher.respond_text(ack).await;

        let requested_by = command.requested_by.clone();
        if self.jobs.send(Job { command, cancel }).await.is_err() {
            self.switches.take(&id);
            self.registry
                .mark_terminal(&id, None, TerminationReason::SpawnFailed);
            warn!(command_id = %id, sender = %requested_by, "work queue closed; command rejected");
            return Err(ChatShellError::QueueClosed("work"));
        }

        debug!(command_id = %id, "command queued");
        Ok(id)
    }

    /// Ask the kill routine to stop `id`. Returns immediately.
    pub async fn kill(&self, id: CommandId) -> Result<()> {
        self.kills
            .send(id)
            .await
            .map_err(|_| ChatShellError::QueueClosed("kill"))
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }
}

/// Owner of the executor tasks. Dropping it without calling
/// [`Executor::shutdown`] leaves the tasks running.
#[derive(Debug)]
pub struct Executor {
    handle: ExecutorHandle,
    settings: ExecutorSettings,
    stop: watch::Sender<bool>,
    work_loop: JoinHandle<()>,
    kill_loop: JoinHandle<()>,
}

/// Start the work loop and the kill routine.
pub fn spawn_executor(ctx: RunContext, settings: ExecutorSettings) -> Executor {
    let (jobs_tx, jobs_rx) = mpsc::channel::<Job>(settings.queue_length.max(1));
    let (kills_tx, kills_rx) = mpsc::channel::<CommandId>(settings.queue_length.max(1));
    let (stop_tx, stop_rx) = watch::channel(false);
    let switches = KillSwitches::default();

    let handle = ExecutorHandle {
        jobs: jobs_tx,
        kills: kills_tx,
        switches: switches.clone(),
        registry: ctx.registry.clone(),
        dispatcher: ctx.dispatcher.clone(),
    };

    let work_loop = tokio::spawn(work_loop(
        ctx.clone(),
        jobs_rx,
        settings.max_workers.max(1),
        switches.clone(),
        stop_rx.clone(),
    ));
    let kill_loop = tokio::spawn(kill_loop(ctx, kills_rx, switches, stop_rx));

    Executor {
        handle,
        settings,
        stop: stop_tx,
        work_loop,
        kill_loop,
    }
}

impl Executor {
    pub fn handle(&self) -> ExecutorHandle {
        self.handle.clone()
    }

    /// Stop accepting work and wait until every accepted command has
    /// published its terminal state and enqueued its terminal response.
    pub async fn shutdown(self) {
        info!(kill_on_shutdown = self.settings.kill_on_shutdown, "executor shutting down");
        let _ = self.stop.send(true);

        if self.settings.kill_on_shutdown {
            for (id, switch) in self.handle.switches.take_all() {
                if switch.send(()).is_ok() {
                    debug!(command_id = %id, "kill switch fired for shutdown");
                }
            }
        }

        if let Err(e) = self.work_loop.await {
            error!(error = %e, "executor work loop panicked");
        }
        if let Err(e) = self.kill_loop.await {
            error!(error = %e, "kill routine panicked");
        }
        info!("executor stopped");
    }
}

async fn work_loop(
    ctx: RunContext,
    mut jobs: mpsc::Receiver<Job>,
    max_workers: usize,
    switches: KillSwitches,
    mut stop: watch::Receiver<bool>,
) {
    info!(max_workers, "executor loop started");
    let permits = Arc::new(Semaphore::new(max_workers));
    let mut workers = JoinSet::new();

    loop {
        // Only dequeue once a worker slot is free, so the queue stays the
        // only buffer.
        let permit = tokio::select! {
            biased;
            _ = stop.changed() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => break,
            },
        };

        let job = tokio::select! {
            biased;
            _ = stop.changed() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let ctx = ctx.clone();
        let switches = switches.clone();
        workers.spawn(async move {
            let id = job.command.id;
            run_command(ctx, job).await;
            switches.take(&id);
            drop(permit);
        });

        while let Some(res) = workers.try_join_next() {
            log_worker_exit(res);
        }
    }

    // Commands already accepted still get their terminal response.
    jobs.close();
    while let Some(job) = jobs.recv().await {
        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let ctx = ctx.clone();
        let switches = switches.clone();
        workers.spawn(async move {
            let id = job.command.id;
            run_command(ctx, job).await;
            switches.take(&id);
            drop(permit);
        });
    }

    while let Some(res) = workers.join_next().await {
        log_worker_exit(res);
    }
    info!("executor loop finished");
}

fn log_worker_exit(res: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = res {
        error!(error = %e, "command worker panicked");
    }
}

async fn kill_loop(
    ctx: RunContext,
    mut kills: mpsc::Receiver<CommandId>,
    switches: KillSwitches,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        let id = tokio::select! {
            biased;
            _ = stop.changed() => break,
            id = kills.recv() => match id {
                Some(id) => id,
                None => break,
            },
        };
        handle_kill(&ctx, &switches, id).await;
    }

    // Kills already acknowledged still get their follow-up.
    kills.close();
    while let Some(id) = kills.recv().await {
        handle_kill(&ctx, &switches, id).await;
    }
    debug!("kill routine finished");
}

async fn handle_kill(ctx: &RunContext, switches: &KillSwitches, id: CommandId) {
    let registry = &ctx.registry;
    let dispatcher = &ctx.dispatcher;

    let Some(record) = registry.get(&id) else {
        info!(command_id = %id, "kill for unknown command");
        dispatcher.respond_text(render::kill_unknown(&id)).await;
        return;
    };

    if record.state.is_terminal() {
        dispatcher
            .respond_text(render::kill_already_finished(&id))
            .await;
        return;
    }

    match switches.take(&id) {
        Some(switch) => {
            if switch.send(()).is_err() {
                // The worker finished between the state check and the send.
                dispatcher
                    .report(anyhow::anyhow!(
                        "kill for command {id} raced with its exit"
                    ))
                    .await;
                dispatcher
                    .respond_text(render::kill_already_finished(&id))
                    .await;
            } else {
                info!(command_id = %id, "kill switch fired");
                dispatcher
                    .audit(
                        &record.command.requested_by,
                        format!("Kill signalled for command ID: `{id}`"),
                    )
                    .await;
            }
        }
        None => {
            dispatcher
                .respond_text(render::kill_already_requested(&id))
                .await;
        }
    }
}
