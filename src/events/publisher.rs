use super::lifecycle::IndexingEvent;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{trace, warn};
use uuid::Uuid;

/// An event stamped with the run it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct PublishedEvent {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub event: IndexingEvent,
    pub published_at: DateTime<Utc>,
}

impl PublishedEvent {
    pub fn name(&self) -> &'static str {
        self.event.name()
    }
}

/// Fan-out of run events to in-process listeners
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, run_id: Uuid, event: IndexingEvent) {
        trace!(%run_id, event = event.name(), "Publishing run event");
        // No receivers is fine
        let _ = self.sender.send(PublishedEvent {
            run_id,
            event,
            published_at: Utc::now(),
        });
    }

    /// Every event of every run
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Events of `run_id` only, from now on
    pub fn watch_run(&self, run_id: Uuid) -> RunEvents {
        RunEvents {
            run_id,
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(crate::constants::defaults::EVENT_CHANNEL_CAPACITY)
    }
}

/// Listener filtered to one run. A slow listener loses the oldest events
/// and keeps going.
#[derive(Debug)]
pub struct RunEvents {
    run_id: Uuid,
    receiver: broadcast::Receiver<PublishedEvent>,
}

impl RunEvents {
    /// Next event of the run, `None` once the publisher is gone
    pub async fn next(&mut self) -> Option<PublishedEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(published) if published.run_id == self.run_id => return Some(published),
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!(run_id = %self.run_id, missed, "Run event listener lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Events of the run already buffered, without waiting
    pub fn drain(&mut self) -> Vec<IndexingEvent> {
        let mut drained = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(published) if published.run_id == self.run_id => drained.push(published.event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(missed)) => {
                    warn!(run_id = %self.run_id, missed, "Run event listener lagged");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return drained,
            }
        }
    }
}
