// src/engine/mod.rs

//! The engine object that owns every long-lived component.
//!
//! Nothing here is process-global: [`Engine::start`] builds the registry,
//! pipelines and executor, and hands out cloneable [`EngineHandle`]s that the
//! poller (and tests) use to feed messages in. [`Engine::shutdown`] is the
//! shutdown barrier.

pub mod render;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::dispatch::{Dispatcher, Pipelines};
use crate::errors::{ChatShellError, Result};
use crate::exec::{
    Executor, ExecutorHandle, ExecutorSettings, ProcessLauncher, RunContext, ShellLauncher,
    spawn_executor,
};
use crate::intent::{Intent, parse_intent};
use crate::poll::AuthorizationSet;
use crate::registry::CommandRegistry;
use crate::transport::{ChatTransport, RoomInfo};
use crate::types::{Command, CommandId};

/// Cloneable entry point for authorized, deduplicated message text.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    executor: ExecutorHandle,
    dispatcher: Dispatcher,
    registry: CommandRegistry,
    help: Arc<str>,
}

impl EngineHandle {
    /// Classify `text` and act on it. Returns the new command's ID for `cmd`
    /// messages that were accepted.
    pub async fn handle_message(&self, sender: &str, text: &str) -> Option<CommandId> {
        let intent = parse_intent(text);
        debug!(sender = %sender, ?intent, "handling message");
        self.handle_intent(sender, intent).await
    }

    pub async fn handle_intent(&self, sender: &str, intent: Intent) -> Option<CommandId> {
        match intent {
            Intent::Help => {
                self.dispatcher.respond_text(self.help.to_string()).await;
                None
            }
            Intent::Run(text) => self.run(sender, text).await,
            Intent::Kill(id) => {
                let ack = self.dispatcher.audit(sender, render::kill_received(&id)).await;
                self.dispatcher.respond_text(ack).await;
                if let Err(e) = self.executor.kill(id).await {
                    warn!(command_id = %id, error = %e, "kill routine unavailable");
                    self.dispatcher
                        .respond_text(format!("Kill for command ID {id} was not delivered: {e}"))
                        .await;
                }
                None
            }
            Intent::InvalidKill(raw) => {
                let msg = self.dispatcher.audit(sender, render::invalid_kill(&raw)).await;
                self.dispatcher.respond_text(msg).await;
                None
            }
            Intent::List(filter) => {
                let records = self.registry.snapshot(filter);
                self.dispatcher
                    .respond_text(render::listing(filter, &records))
                    .await;
                None
            }
            Intent::Unknown => {
                self.dispatcher.respond_text(render::NOT_FOUND).await;
                None
            }
        }
    }

    async fn run(&self, sender: &str, text: String) -> Option<CommandId> {
        let command = Command::new(text, sender);
        let rejected = command.clone();
        match self.executor.submit(command).await {
            Ok(id) => Some(id),
            Err(ChatShellError::QueueClosed(_)) => {
                let msg = self.dispatcher.audit(sender, render::queue_closed(&rejected)).await;
                self.dispatcher.respond_text(msg).await;
                None
            }
            Err(e) => {
                self.dispatcher
                    .report(anyhow::Error::new(e).context("submitting command"))
                    .await;
                None
            }
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }
}

/// Owner of the pipelines and the executor.
#[derive(Debug)]
pub struct Engine {
    pipelines: Pipelines,
    executor: Executor,
    handle: EngineHandle,
}

impl Engine {
    /// Start with the configured shell.
    pub async fn start(
        config: &ConfigFile,
        transport: Arc<dyn ChatTransport>,
        room: &RoomInfo,
        authorized: &AuthorizationSet,
    ) -> Result<Self> {
        let launcher = Arc::new(ShellLauncher::new(config.shell.program.clone()));
        Self::start_with_launcher(config, transport, room, authorized, launcher).await
    }

    pub async fn start_with_launcher(
        config: &ConfigFile,
        transport: Arc<dyn ChatTransport>,
        room: &RoomInfo,
        authorized: &AuthorizationSet,
        launcher: Arc<dyn ProcessLauncher>,
    ) -> Result<Self> {
        let pipelines = Pipelines::start(transport, &room.id, &room.title, &config.audit_log).await?;
        let dispatcher = pipelines.dispatcher();
        let registry = CommandRegistry::new();

        let ctx = RunContext {
            registry: registry.clone(),
            dispatcher: dispatcher.clone(),
            launcher,
            timeout: config.shell.timeout,
            output: config.output.clone(),
        };
        let executor = spawn_executor(ctx, ExecutorSettings::from(&config.shell));

        let handle = EngineHandle {
            executor: executor.handle(),
            dispatcher,
            registry,
            help: Arc::from(render::help(&authorized.describe())),
        };

        info!(
            room = %room.title,
            shell = %config.shell.program,
            timeout = ?config.shell.timeout,
            max_workers = config.shell.max_workers,
            "engine started"
        );

        Ok(Self {
            pipelines,
            executor,
            handle,
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.handle.registry
    }

    /// Shutdown barrier: stop the executor (every accepted command publishes
    /// its terminal response), then drain the pipelines. The poller must
    /// already be stopped. Returns the number of internal errors reported.
    pub async fn shutdown(self) -> u64 {
        let Engine {
            pipelines,
            executor,
            handle,
        } = self;
        drop(handle);

        executor.shutdown().await;
        pipelines.shutdown().await
    }
}
