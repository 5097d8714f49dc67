//! Async event fan-out to integration plugins
//!
//! `publish` enqueues to a bounded queue and returns immediately; when the
//! queue is full the newest event is dropped with a logged warning, so the
//! publisher is never blocked by a slow bus. A single dispatcher task
//! delivers each event to every subscriber in turn, which keeps events about
//! the same artifact in publish order for any one subscriber. A panic or
//! error inside one subscriber's handler is caught and logged; it never
//! reaches the publisher or the other subscribers.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use quarry_core::{ArtifactEvent, ArtifactEventKind, RepositoryEvent, RepositoryEventKind};
use quarry_plugin::{IntegrationPlugin, Plugin};

/// A lifecycle event flowing through the bus
#[derive(Debug, Clone)]
pub enum Event {
    Artifact(ArtifactEvent),
    Repository(RepositoryEvent),
}

/// Bounded async event bus
pub struct EventBus {
    tx: Mutex<Option<mpsc::Sender<Event>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    dropped: AtomicU64,
}

impl EventBus {
    /// Start the dispatcher with a bounded queue
    pub fn start(capacity: usize, subscribers: Vec<Arc<dyn IntegrationPlugin>>) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(dispatch(rx, subscribers));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: tokio::sync::Mutex::new(Some(worker)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event without blocking
    ///
    /// Overflow policy: when the queue is full the event being published
    /// (the newest) is dropped and a warning is logged.
    pub fn publish(&self, event: Event) {
        let tx = self.tx.lock().unwrap();
        let Some(tx) = tx.as_ref() else {
            tracing::warn!("event bus is closed, dropping event");
            return;
        };

        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("event queue full, dropping newest event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("event dispatcher stopped, dropping event");
            }
        }
    }

    /// Events dropped due to queue overflow
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for the dispatcher to drain it
    pub async fn shutdown(&self) {
        {
            let mut tx = self.tx.lock().unwrap();
            tx.take();
        }
        let handle = {
            let mut worker = self.worker.lock().await;
            worker.take()
        };
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn dispatch(mut rx: mpsc::Receiver<Event>, subscribers: Vec<Arc<dyn IntegrationPlugin>>) {
    while let Some(event) = rx.recv().await {
        for subscriber in &subscribers {
            deliver(subscriber.clone(), &event).await;
        }
    }
}

/// One delivery attempt per subscriber per event, with panic isolation
async fn deliver(subscriber: Arc<dyn IntegrationPlugin>, event: &Event) {
    let name = subscriber.name().to_string();
    let handler = async {
        match event {
            Event::Artifact(e) => match e.kind {
                ArtifactEventKind::Uploaded | ArtifactEventKind::Updated => {
                    subscriber.on_artifact_uploaded(e).await
                }
                ArtifactEventKind::Deleted => subscriber.on_artifact_deleted(e).await,
            },
            Event::Repository(e) => match e.kind {
                RepositoryEventKind::Created => subscriber.on_repository_created(e).await,
                // No dedicated hooks for the remaining repository events
                RepositoryEventKind::Updated | RepositoryEventKind::Deleted => Ok(()),
            },
        }
    };

    match AssertUnwindSafe(handler).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            tracing::warn!(subscriber = %name, error = %e, "integration handler failed");
        }
        Err(_) => {
            tracing::warn!(subscriber = %name, "integration handler panicked");
        }
    }
}
