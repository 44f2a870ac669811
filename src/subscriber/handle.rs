//! Subscriber handle
//!
//! `Subscriber` models one connected WebSocket peer. It holds the sending side
//! of a bounded per-connection queue that the transport's writer task drains
//! onto the socket, plus a close signal shared by every clone of the handle.
//! Whoever closes the handle (the registry after a failed send, or the
//! transport on disconnect) wakes [`Subscriber::closed`], which the writer
//! task waits on to tear the socket down.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::Sender;
use tokio::sync::watch;
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::utils::error::SubscriberSendFailure;

pub type SubscriberId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    Open,
    /// Terminal. A closed subscriber never reopens.
    Closed,
}

#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: SubscriberId,
    sender: Sender<WsMessage>,
    closed: Arc<watch::Sender<bool>>,
}

impl Subscriber {
    /// Create an open subscriber with a fresh `client-<uuid>` id.
    pub fn new(sender: Sender<WsMessage>) -> Self {
        Self::with_id(format!("client-{}", Uuid::new_v4()), sender)
    }

    pub fn with_id(id: impl Into<SubscriberId>, sender: Sender<WsMessage>) -> Self {
        Self {
            id: id.into(),
            sender,
            closed: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Open until closed explicitly or until the transport drops its queue.
    pub fn state(&self) -> SubscriberState {
        if !*self.closed.borrow() && !self.sender.is_closed() {
            SubscriberState::Open
        } else {
            SubscriberState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == SubscriberState::Open
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    /// Resolves once [`close`](Self::close) has been called on any clone.
    pub async fn closed(&self) {
        let mut closed = self.closed.subscribe();
        // the sender lives in `self`, so this only ends once the flag is set
        let _ = closed.wait_for(|closed| *closed).await;
    }

    /// Queue one frame for this subscriber, waiting at most `timeout` for room.
    ///
    /// A failed or timed-out send closes the subscriber.
    pub async fn send(
        &self,
        frame: WsMessage,
        timeout: Duration,
    ) -> Result<(), SubscriberSendFailure> {
        if !self.is_open() {
            return Err(SubscriberSendFailure::NotOpen);
        }

        match tokio::time::timeout(timeout, self.sender.send(frame)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => {
                self.close();
                Err(SubscriberSendFailure::Closed)
            }
            Err(_) => {
                self.close();
                Err(SubscriberSendFailure::TimedOut(timeout))
            }
        }
    }
}
