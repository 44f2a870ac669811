//! The `persistence` module is the durable record of accepted messages.
//!
//! Callers only depend on the [`MessageStore`] contract: an append that either
//! commits the record and hands back a fresh sequence id, or fails with a
//! [`StoreError`]. [`SledStore`] implements it on top of `sled`.

pub mod sled_store;

use crate::broker::message::NewMessage;
use crate::utils::error::StoreError;

pub use sled_store::{SledStore, StoredMessage};

/// Store-assigned identifier of a persisted message.
pub type SequenceId = u64;

/// Append-only message log.
///
/// Implementations must serialize id assignment so that ids stay unique and
/// strictly increasing under concurrent appends, and must only return `Ok`
/// once the record is durable.
pub trait MessageStore: Send + Sync {
    fn append(&self, message: &NewMessage) -> Result<SequenceId, StoreError>;
}
