// src/dispatch/response.rs

//! Delivery of user-visible responses through the chat transport.

use std::sync::Arc;

use anyhow::anyhow;
use tracing::debug;

use super::pipeline::{PipelineSender, Sink};
use crate::exec::ScratchFile;
use crate::transport::ChatTransport;

/// A user-visible outcome.
///
/// Attachments are scratch files; they are deleted once the consumer is done
/// with the response, whether or not delivery succeeded.
#[derive(Debug)]
pub struct Response {
    pub text: String,
    pub attachments: Vec<ScratchFile>,
}

impl Response {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }
}

pub struct ResponseSink {
    transport: Arc<dyn ChatTransport>,
    room_id: String,
    errors: PipelineSender<anyhow::Error>,
}

impl ResponseSink {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        room_id: impl Into<String>,
        errors: PipelineSender<anyhow::Error>,
    ) -> Self {
        Self {
            transport,
            room_id: room_id.into(),
            errors,
        }
    }

    async fn deliver(&self, text: &str, attachment: Option<&ScratchFile>) {
        let path = attachment.map(|f| f.path());
        match self.transport.send_message(&self.room_id, text, path).await {
            Ok(message_id) => debug!(%message_id, "response delivered"),
            Err(e) => {
                let err = anyhow!("sending response to room {}: {e}", self.room_id);
                let _ = self.errors.send(err).await;
            }
        }
    }
}

impl Sink<Response> for ResponseSink {
    async fn handle(&mut self, response: Response) {
        let Response { text, attachments } = response;
        let mut files = attachments.iter();

        self.deliver(&text, files.next()).await;
        for extra in files {
            let caption = format!("Attached: `{}`", extra.file_name());
            self.deliver(&caption, Some(extra)).await;
        }
        // `attachments` dropped here: scratch files removed.
    }

    async fn finish(&mut self) {}
}
