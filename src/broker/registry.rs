//! Subscriber registry
//!
//! The registry is the live set of connected subscribers. It has no state of
//! its own beyond that set: subscribers are inserted on connect, removed on
//! disconnect, and iterated on broadcast.
//!
//! Concurrency notes:
//! - The set sits behind a `std::sync::Mutex` that is never held across an
//!   `.await`. `broadcast` clones a snapshot under the lock and sends after
//!   releasing it, so a subscriber that connects mid-broadcast may miss that
//!   broadcast and one that disconnects mid-broadcast sees at most one attempt.
//! - Sends to different subscribers run concurrently and each is bounded by
//!   `send_timeout`, so a slow peer only delays itself.
//! - A subscriber whose send fails, or that is already closed when the
//!   snapshot is taken, is evicted. Eviction closes the handle, which makes
//!   the transport tear its socket down.
//! - The transport talks to the registry through [`SubscriberEvent`]s on a
//!   channel; see [`SubscriberRegistry::spawn_event_loop`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message as WsMessage;

use crate::subscriber::{Subscriber, SubscriberId, SubscriberState};
use crate::utils::error::SubscriberSendFailure;

/// Connection lifecycle events produced by the subscriber transport.
#[derive(Debug)]
pub enum SubscriberEvent {
    Connected(Subscriber),
    Inbound { id: SubscriberId, text: String },
    Disconnected(SubscriberId),
}

/// Outcome of one broadcast.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that were open at snapshot time and got a send attempt.
    pub attempted: usize,
    pub delivered: usize,
    pub skipped: Vec<(SubscriberId, SubscriberSendFailure)>,
}

#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
    send_timeout: Duration,
}

impl SubscriberRegistry {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            send_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Subscriber>> {
        // Every mutation is a single insert/remove, so a poisoned map is still whole.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Add a subscriber. Registering an id that is already present keeps the
    /// existing entry.
    pub fn register(&self, subscriber: Subscriber) {
        let mut subscribers = self.lock();
        if subscribers.contains_key(&subscriber.id) {
            debug!(subscriber = %subscriber.id, "already registered");
            return;
        }
        info!(subscriber = %subscriber.id, "subscriber connected");
        subscribers.insert(subscriber.id.clone(), subscriber);
    }

    /// Remove and close a subscriber. Unknown ids are ignored.
    pub fn unregister(&self, id: &SubscriberId) {
        if let Some(subscriber) = self.lock().remove(id) {
            subscriber.close();
            info!(subscriber = %id, "subscriber disconnected");
        }
    }

    fn evict(&self, id: &SubscriberId) {
        if let Some(subscriber) = self.lock().remove(id) {
            subscriber.close();
            info!(subscriber = %id, "subscriber evicted");
        }
    }

    /// Data a subscriber sent back. Logged, never processed.
    pub fn inbound(&self, id: &SubscriberId, text: &str) {
        info!(subscriber = %id, bytes = text.len(), "received from subscriber: {text}");
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn ids(&self) -> Vec<SubscriberId> {
        self.lock().keys().cloned().collect()
    }

    pub fn state(&self, id: &SubscriberId) -> Option<SubscriberState> {
        self.lock().get(id).map(Subscriber::state)
    }

    fn snapshot(&self) -> Vec<Subscriber> {
        self.lock().values().cloned().collect()
    }

    /// Send `text` to every open subscriber.
    ///
    /// Failures are recorded per subscriber in the report and never abort
    /// delivery to the rest. Failed subscribers are evicted.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        let frame = WsMessage::text(text.to_owned());
        let mut report = BroadcastReport::default();

        let mut pending = Vec::new();
        for subscriber in self.snapshot() {
            if subscriber.is_open() {
                pending.push(subscriber);
            } else {
                warn!(subscriber = %subscriber.id, "subscriber not ready, skipping");
                self.evict(&subscriber.id);
                report
                    .skipped
                    .push((subscriber.id, SubscriberSendFailure::NotOpen));
            }
        }

        report.attempted = pending.len();
        let results = join_all(pending.iter().map(|subscriber| {
            let frame = frame.clone();
            async move { subscriber.send(frame, self.send_timeout).await }
        }))
        .await;

        for (subscriber, result) in pending.into_iter().zip(results) {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(subscriber = %subscriber.id, "failed to forward message: {e}");
                    self.evict(&subscriber.id);
                    report.skipped.push((subscriber.id, e));
                }
            }
        }

        debug!(
            attempted = report.attempted,
            delivered = report.delivered,
            skipped = report.skipped.len(),
            "broadcast finished"
        );
        report
    }

    /// Apply one transport event.
    pub fn apply(&self, event: SubscriberEvent) {
        match event {
            SubscriberEvent::Connected(subscriber) => self.register(subscriber),
            SubscriberEvent::Inbound { id, text } => self.inbound(&id, &text),
            SubscriberEvent::Disconnected(id) => self.unregister(&id),
        }
    }

    /// Consume transport events until every sender is dropped.
    pub fn spawn_event_loop(
        self: Arc<Self>,
        mut events: UnboundedReceiver<SubscriberEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                self.apply(event);
            }
            debug!("subscriber event loop closed");
        })
    }
}
