//! Relay engine
//!
//! `Relay::submit` is the whole submit-and-broadcast operation:
//! - decode and validate the payload
//! - append the message to the store
//! - broadcast the message text to every open subscriber
//!
//! Persistence strictly precedes broadcast. A message that could not be
//! recorded is rejected and never reaches a subscriber, while a recorded
//! message whose delivery fails for some subscribers is still accepted.
//! Store appends are not retried.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::broker::message::{NewMessage, Submission};
use crate::broker::registry::SubscriberRegistry;
use crate::persistence::{MessageStore, SequenceId};
use crate::utils::error::{Rejection, StoreError};

pub struct Relay {
    store: Arc<dyn MessageStore>,
    registry: Arc<SubscriberRegistry>,
}

impl Relay {
    pub fn new(store: Arc<dyn MessageStore>, registry: Arc<SubscriberRegistry>) -> Self {
        Self { store, registry }
    }

    /// Relay a raw submission body. `Ok` carries the assigned sequence id.
    pub async fn submit(&self, payload: &[u8]) -> Result<SequenceId, Rejection> {
        let submission = Submission::from_json(payload).inspect_err(|rejection| {
            warn!("rejected submission: {rejection}");
        })?;
        self.submit_submission(submission).await
    }

    /// Relay an already decoded submission.
    pub async fn submit_submission(
        &self,
        submission: Submission,
    ) -> Result<SequenceId, Rejection> {
        let message = submission.validate().inspect_err(|rejection| {
            warn!("rejected submission: {rejection}");
        })?;

        let sequence_id = self.persist(message.clone()).await.map_err(|e| {
            error!(channel = message.channel_tag(), "failed to store message: {e}");
            Rejection::PersistenceFailure
        })?;

        let report = self.registry.broadcast(message.text()).await;
        info!(
            sequence_id,
            sender = message.sender(),
            channel = message.channel_tag(),
            delivered = report.delivered,
            skipped = report.skipped.len(),
            "message relayed"
        );

        Ok(sequence_id)
    }

    async fn persist(&self, message: NewMessage) -> Result<SequenceId, StoreError> {
        let store = Arc::clone(&self.store);
        // sled flushes block, keep them off the async workers
        tokio::task::spawn_blocking(move || store.append(&message))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("store", &"dyn MessageStore")
            .field("registry", &self.registry)
            .finish()
    }
}
