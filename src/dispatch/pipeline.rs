// src/dispatch/pipeline.rs

//! Generic single-consumer pipeline.
//!
//! Each pipeline is a bounded mpsc queue drained by one Tokio task. Producers
//! bump an outstanding counter before enqueueing and the consumer drops it
//! after handling the item, so `outstanding() == 0` means everything sent so
//! far has been fully processed.
//!
//! Shutdown is explicit: [`PipelineHandle::drain`] closes the queue (later
//! sends fail with `QueueClosed`), lets the consumer finish every buffered
//! item, and waits for it to exit.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{ChatShellError, Result};

/// The consumer side of a pipeline.
pub trait Sink<T>: Send + 'static {
    fn handle(&mut self, item: T) -> impl Future<Output = ()> + Send;

    /// Called once after the last item, before the consumer exits.
    fn finish(&mut self) -> impl Future<Output = ()> + Send;
}

/// Cloneable producer handle.
#[derive(Debug)]
pub struct PipelineSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    outstanding: Arc<AtomicUsize>,
}

impl<T> Clone for PipelineSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            outstanding: Arc::clone(&self.outstanding),
        }
    }
}

impl<T: Send> PipelineSender<T> {
    pub async fn send(&self, item: T) -> Result<()> {
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(item).await.is_err() {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            return Err(ChatShellError::QueueClosed(self.name));
        }
        Ok(())
    }

    /// Items sent but not yet fully handled.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }
}

/// Owner handle used to shut a pipeline down.
#[derive(Debug)]
pub struct PipelineHandle {
    name: &'static str,
    stop: Option<oneshot::Sender<()>>,
    join: JoinHandle<usize>,
}

impl PipelineHandle {
    /// Close the queue, drain buffered items, and wait for the consumer.
    /// Returns how many items the consumer handled over its lifetime.
    pub async fn drain(mut self) -> usize {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match self.join.await {
            Ok(handled) => {
                info!(pipeline = self.name, handled, "pipeline drained");
                handled
            }
            Err(e) => {
                warn!(pipeline = self.name, error = %e, "pipeline consumer task failed");
                0
            }
        }
    }
}

/// Spawn a consumer task for `sink` behind a queue of `capacity` items.
pub fn spawn_pipeline<T, S>(
    name: &'static str,
    capacity: usize,
    mut sink: S,
) -> (PipelineSender<T>, PipelineHandle)
where
    T: Send + 'static,
    S: Sink<T>,
{
    let (tx, mut rx) = mpsc::channel::<T>(capacity.max(1));
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
    let outstanding = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&outstanding);

    let join = tokio::spawn(async move {
        debug!(pipeline = name, "pipeline consumer started");
        let mut handled = 0usize;

        loop {
            tokio::select! {
                biased;

                item = rx.recv() => match item {
                    Some(item) => {
                        sink.handle(item).await;
                        counter.fetch_sub(1, Ordering::SeqCst);
                        handled += 1;
                    }
                    None => break,
                },

                _ = &mut stop_rx => {
                    rx.close();
                    while let Some(item) = rx.recv().await {
                        sink.handle(item).await;
                        counter.fetch_sub(1, Ordering::SeqCst);
                        handled += 1;
                    }
                    break;
                }
            }
        }

        sink.finish().await;
        debug!(pipeline = name, handled, "pipeline consumer finished");
        handled
    });

    (
        PipelineSender {
            name,
            tx,
            outstanding,
        },
        PipelineHandle {
            name,
            stop: Some(stop_tx),
            join,
        },
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Collect(Arc<Mutex<Vec<u32>>>, Arc<Mutex<bool>>);

    impl Sink<u32> for Collect {
        async fn handle(&mut self, item: u32) {
            tokio::task::yield_now().await;
            self.0.lock().unwrap().push(item);
        }

        async fn finish(&mut self) {
            *self.1.lock().unwrap() = true;
        }
    }

    #[tokio::test]
    async fn drain_processes_everything_buffered_then_rejects_sends() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let finished = Arc::new(Mutex::new(false));
        let (tx, handle) = spawn_pipeline("test", 64, Collect(seen.clone(), finished.clone()));

        for i in 0..50 {
            tx.send(i).await.unwrap();
        }

        assert_eq!(handle.drain().await, 50);
        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
        assert!(*finished.lock().unwrap());
        assert_eq!(tx.outstanding(), 0);

        assert!(matches!(
            tx.send(99).await,
            Err(ChatShellError::QueueClosed("test"))
        ));
        assert_eq!(tx.outstanding(), 0);
    }
}
