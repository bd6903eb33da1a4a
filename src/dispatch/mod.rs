// src/dispatch/mod.rs

//! The three decoupled output pipelines.
//!
//! - [`audit`]: lifecycle events appended to the audit log file.
//! - [`response`]: user-visible text (and spilled output files) sent to chat.
//! - [`error_sink`]: unexpected internal errors, logged and counted.
//!
//! Execution never waits on the chat service: workers only enqueue.

pub mod audit;
pub mod error_sink;
pub mod pipeline;
pub mod response;

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

pub use audit::{AuditEntry, AuditSink};
pub use error_sink::ErrorSink;
pub use pipeline::{PipelineHandle, PipelineSender, Sink, spawn_pipeline};
pub use response::{Response, ResponseSink};

use crate::errors::Result;
use crate::transport::ChatTransport;

const AUDIT_QUEUE: usize = 100;
const RESPONSE_QUEUE: usize = 100;
const ERROR_QUEUE: usize = 16;

/// Cloneable producer side of all three pipelines.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    audit: PipelineSender<AuditEntry>,
    responses: PipelineSender<Response>,
    errors: PipelineSender<anyhow::Error>,
}

impl Dispatcher {
    pub fn new(
        audit: PipelineSender<AuditEntry>,
        responses: PipelineSender<Response>,
        errors: PipelineSender<anyhow::Error>,
    ) -> Self {
        Self {
            audit,
            responses,
            errors,
        }
    }

    /// Record `message` in the audit log and hand it back, so callers can
    /// audit and respond with the same text.
    pub async fn audit(&self, sender: &str, message: impl Into<String>) -> String {
        let message = message.into();
        let entry = AuditEntry {
            sender: sender.to_string(),
            message: message.clone(),
        };
        if let Err(e) = self.audit.send(entry).await {
            debug!(error = %e, "audit entry dropped");
        }
        message
    }

    pub async fn respond(&self, response: Response) {
        if let Err(e) = self.responses.send(response).await {
            debug!(error = %e, "response dropped");
        }
    }

    pub async fn respond_text(&self, text: impl Into<String>) {
        self.respond(Response::text(text)).await;
    }

    pub async fn report(&self, err: anyhow::Error) {
        if let Err(e) = self.errors.send(err).await {
            debug!(error = %e, "error report dropped");
        }
    }
}

/// Consumer tasks for the three pipelines.
#[derive(Debug)]
pub struct Pipelines {
    dispatcher: Dispatcher,
    response: PipelineHandle,
    audit: PipelineHandle,
    errors: PipelineHandle,
    error_count: Arc<AtomicU64>,
}

impl Pipelines {
    /// Open the audit log and start all consumers.
    ///
    /// Failing to open the audit log is a startup error.
    pub async fn start(
        transport: Arc<dyn ChatTransport>,
        room_id: &str,
        room_title: &str,
        audit_log: &Path,
    ) -> Result<Self> {
        let audit_sink = AuditSink::open(audit_log, room_title).await?;

        let error_count = Arc::new(AtomicU64::new(0));
        let (errors_tx, errors) = spawn_pipeline(
            "errors",
            ERROR_QUEUE,
            ErrorSink::new(Arc::clone(&error_count)),
        );
        let (audit_tx, audit) = spawn_pipeline("audit", AUDIT_QUEUE, audit_sink);
        let (responses_tx, response) = spawn_pipeline(
            "responses",
            RESPONSE_QUEUE,
            ResponseSink::new(transport, room_id, errors_tx.clone()),
        );

        Ok(Self {
            dispatcher: Dispatcher::new(audit_tx, responses_tx, errors_tx),
            response,
            audit,
            errors,
            error_count,
        })
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Drain responses, then the audit log, then errors. Returns the number
    /// of internal errors reported over the pipelines' lifetime.
    pub async fn shutdown(self) -> u64 {
        self.response.drain().await;
        self.audit.drain().await;
        self.errors.drain().await;

        let errors = self.error_count.load(Ordering::SeqCst);
        info!(errors, "dispatch pipelines shut down");
        errors
    }
}
