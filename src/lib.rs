// src/lib.rs

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod intent;
pub mod logging;
pub mod poll;
pub mod registry;
pub mod transport;
pub mod types;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, load_and_validate};
use crate::engine::Engine;
use crate::poll::{AuthorizationSet, MessagePoller, spawn_poller};
use crate::transport::{ChatTransport, WebexTransport};

/// High-level entry point used by `main.rs`.
///
/// Loads config (file + CLI overrides), builds the Webex transport and serves
/// until Ctrl-C.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config, |raw| args.apply_to(raw))
        .with_context(|| format!("loading config from {}", args.config.display()))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let token = std::env::var(&cfg.transport.token_env).with_context(|| {
        format!(
            "reading access token from environment variable {}",
            cfg.transport.token_env
        )
    })?;
    let transport = WebexTransport::new(
        &cfg.transport.api_base,
        &token,
        cfg.transport.request_timeout,
    )?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C; shutting down");
        }
    };

    let errors = serve(cfg, Arc::new(transport), shutdown).await?;
    if errors > 0 {
        warn!(errors, "internal errors were reported during the run");
    }
    Ok(())
}

/// Startup checks, then poll and execute until `shutdown` resolves, then run
/// the shutdown barrier. Returns the number of internal errors reported.
pub async fn serve(
    cfg: ConfigFile,
    transport: Arc<dyn ChatTransport>,
    shutdown: impl Future<Output = ()>,
) -> Result<u64> {
    let me = transport
        .whoami()
        .await
        .context("looking up the bot identity")?;
    if !me.is_bot {
        bail!(
            "the access token belongs to '{}', which is not a bot account",
            me.display_name
        );
    }

    let room = transport
        .get_room(&cfg.transport.room_id)
        .await
        .with_context(|| format!("looking up room {}", cfg.transport.room_id))?;

    let authorized = AuthorizationSet::resolve(transport.as_ref(), &cfg.authorized_senders).await?;

    info!(
        bot = %me.display_name,
        room = %room.title,
        kind = ?room.kind,
        authorized = %authorized.describe(),
        "startup checks passed"
    );

    let engine = Engine::start(&cfg, Arc::clone(&transport), &room, &authorized).await?;

    let poller = MessagePoller::new(
        transport,
        room,
        &me,
        authorized,
        &cfg.poll,
        engine.handle(),
        Utc::now(),
    );
    let poller = spawn_poller(poller, cfg.poll.interval);

    shutdown.await;
    info!("shutdown requested");

    poller.stop().await;
    let errors = engine.shutdown().await;
    debug!(errors, "shutdown complete");
    Ok(errors)
}

fn print_dry_run(cfg: &ConfigFile) {
    println!("chatshell dry-run");
    println!("  transport.room_id = {}", cfg.transport.room_id);
    println!("  transport.api_base = {}", cfg.transport.api_base);
    println!("  transport.token_env = {}", cfg.transport.token_env);
    println!(
        "  transport.request_timeout = {:?}",
        cfg.transport.request_timeout
    );
    println!("  access.authorized_senders = {:?}", cfg.authorized_senders);
    println!("  shell.program = {}", cfg.shell.program);
    match cfg.shell.timeout {
        Some(t) => println!("  shell.timeout = {t:?}"),
        None => println!("  shell.timeout = disabled"),
    }
    println!("  shell.max_workers = {}", cfg.shell.max_workers);
    println!("  shell.queue_length = {}", cfg.shell.queue_length);
    println!("  shell.kill_on_shutdown = {}", cfg.shell.kill_on_shutdown);
    println!("  poll.interval = {:?}", cfg.poll.interval);
    println!("  poll.batch_size = {}", cfg.poll.batch_size);
    println!(
        "  output.spillover_threshold = {}",
        cfg.output.spillover_threshold
    );
    println!(
        "  output.downloads_dir = {}",
        cfg.output.downloads_dir.display()
    );
    println!("  audit.log_file = {}", cfg.audit_log.display());

    debug!("dry-run complete (nothing started)");
}
