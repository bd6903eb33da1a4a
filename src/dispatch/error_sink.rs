// src/dispatch/error_sink.rs

//! Internal errors: logged, counted, never sent to chat.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::error;

use super::pipeline::Sink;

pub struct ErrorSink {
    count: Arc<AtomicU64>,
}

impl ErrorSink {
    pub fn new(count: Arc<AtomicU64>) -> Self {
        Self { count }
    }
}

impl Sink<anyhow::Error> for ErrorSink {
    async fn handle(&mut self, err: anyhow::Error) {
        self.count.fetch_add(1, Ordering::SeqCst);
        error!(error = %format!("{err:#}"), "internal error");
    }

    async fn finish(&mut self) {}
}
