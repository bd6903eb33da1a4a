// src/poll/poller.rs

//! Fixed-interval message poller.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, trace, warn};

use crate::config::PollConfig;
use crate::engine::EngineHandle;
use crate::errors::Result;
use crate::poll::{AuthorizationSet, DedupSet, strip_mention};
use crate::transport::{BotIdentity, ChatTransport, RoomInfo, RoomKind};

/// A message that passed every filter, ready for intent classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub message_id: String,
    /// Canonical sender address.
    pub sender: String,
    /// Text with any leading mention removed.
    pub text: String,
}

pub struct MessagePoller {
    transport: Arc<dyn ChatTransport>,
    room: RoomInfo,
    authorized: AuthorizationSet,
    dedup: DedupSet,
    /// Only set for group rooms.
    mention: Option<String>,
    watermark: DateTime<Utc>,
    batch_size: usize,
    engine: EngineHandle,
}

impl MessagePoller {
    /// Messages created at or before `watermark` are never dispatched.
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        room: RoomInfo,
        bot: &BotIdentity,
        authorized: AuthorizationSet,
        settings: &PollConfig,
        engine: EngineHandle,
        watermark: DateTime<Utc>,
    ) -> Self {
        let mention = match room.kind {
            RoomKind::Group => Some(bot.nickname.clone()),
            RoomKind::Direct => None,
        };
        Self {
            transport,
            room,
            authorized,
            dedup: DedupSet::new(),
            mention,
            watermark,
            batch_size: settings.batch_size,
            engine,
        }
    }

    /// Fetch one batch and return the messages that should be dispatched,
    /// in transport order. Their IDs are already recorded as seen.
    pub async fn poll_once(&mut self) -> Result<Vec<Inbound>> {
        let messages = self
            .transport
            .list_recent_messages(&self.room, self.watermark, self.batch_size)
            .await?;

        let mut inbound = Vec::new();
        for msg in messages {
            if msg.created_at <= self.watermark {
                continue;
            }
            let Some(sender) = self.authorized.authorize(&msg.sender) else {
                trace!(sender = %msg.sender, message_id = %msg.id, "ignoring unauthorized sender");
                continue;
            };
            if !self.dedup.insert(&msg.id) {
                continue;
            }

            let text = match &self.mention {
                Some(nick) => strip_mention(&msg.text, nick),
                None => msg.text.trim(),
            };
            inbound.push(Inbound {
                message_id: msg.id.clone(),
                sender: sender.to_string(),
                text: text.to_string(),
            });
        }
        Ok(inbound)
    }

    /// One poll plus dispatch. A failed listing skips the tick.
    pub async fn tick(&mut self) -> usize {
        let batch = match self.poll_once().await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "listing messages failed; retrying next tick");
                return 0;
            }
        };

        let n = batch.len();
        for msg in batch {
            debug!(message_id = %msg.message_id, sender = %msg.sender, "dispatching message");
            self.engine.handle_message(&msg.sender, &msg.text).await;
        }
        n
    }

    async fn run(mut self, every: Duration, mut stop: watch::Receiver<bool>) {
        info!(room = %self.room.title, every = ?every, "poller started");
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = stop.changed() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!(seen = self.dedup.len(), "poller stopped");
    }
}

/// Running poller task.
#[derive(Debug)]
pub struct PollerHandle {
    stop: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop polling. A dispatch already in progress completes first.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.join.await {
            error!(error = %e, "poller task panicked");
        }
    }
}

pub fn spawn_poller(poller: MessagePoller, every: Duration) -> PollerHandle {
    let (stop, stop_rx) = watch::channel(false);
    let join = tokio::spawn(poller.run(every, stop_rx));
    PollerHandle { stop, join }
}
