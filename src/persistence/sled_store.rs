//! Message log backed by `sled`
//!
//! Records live in a single `messages` tree. Keys are big-endian sequence ids,
//! so tree order is sequence order and the last key is the highest id handed
//! out so far. Values are JSON-encoded [`StoredMessage`]s.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::{Db, IVec, Tree};
use tracing::{debug, error};

use super::{MessageStore, SequenceId};
use crate::broker::message::NewMessage;
use crate::utils::error::StoreError;

const MESSAGES_TREE: &str = "messages";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub sequence_id: SequenceId,
    pub sender: String,
    pub text: String,
    pub sent_at: i64,
    pub received_at: i64,
    pub channel_tag: String,
    /// Milliseconds since the UNIX epoch at which the relay wrote the record.
    pub stored_at: i64,
}

pub struct SledStore {
    db: Db,
    messages: Tree,
    append_lock: Mutex<()>,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// A throwaway database that is removed when dropped.
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self, StoreError> {
        let messages = db.open_tree(MESSAGES_TREE)?;
        Ok(Self {
            db,
            messages,
            append_lock: Mutex::new(()),
        })
    }

    pub fn get(&self, sequence_id: SequenceId) -> Result<Option<StoredMessage>, StoreError> {
        match self.messages.get(sequence_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Highest sequence id written so far, if any.
    pub fn last_sequence_id(&self) -> Result<Option<SequenceId>, StoreError> {
        match self.messages.last()? {
            Some((key, _)) => decode_key(&key).map(Some),
            None => Ok(None),
        }
    }
}

fn decode_key(key: &IVec) -> Result<SequenceId, StoreError> {
    let bytes: [u8; 8] = key
        .as_ref()
        .try_into()
        .map_err(|_| StoreError::Corrupt(format!("{} byte key", key.len())))?;
    Ok(SequenceId::from_be_bytes(bytes))
}

impl SledStore {
    /// Append with a caller-supplied flush. A failed flush rolls the insert
    /// back so the record is never visible without having been acknowledged.
    pub(super) fn append_with<F>(
        &self,
        message: &NewMessage,
        flush: F,
    ) -> Result<SequenceId, StoreError>
    where
        F: FnOnce(&Db) -> sled::Result<usize>,
    {
        // Poisoning only means another append panicked; the tree itself is still consistent.
        let _guard = self
            .append_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let sequence_id = self.last_sequence_id()?.map_or(1, |last| last + 1);
        let record = StoredMessage {
            sequence_id,
            sender: message.sender().to_string(),
            text: message.text().to_string(),
            sent_at: message.sent_at(),
            received_at: message.received_at(),
            channel_tag: message.channel_tag().to_string(),
            stored_at: Utc::now().timestamp_millis(),
        };
        let serialized = serde_json::to_vec(&record)?;

        let key = sequence_id.to_be_bytes();
        self.messages.insert(key, serialized)?;
        if let Err(e) = flush(&self.db) {
            self.messages.remove(key)?;
            if let Err(rollback) = self.db.flush() {
                error!(sequence_id, "failed to flush rollback: {rollback}");
            }
            return Err(e.into());
        }

        debug!(sequence_id, channel = %record.channel_tag, "message stored");
        Ok(sequence_id)
    }
}

impl MessageStore for SledStore {
    fn append(&self, message: &NewMessage) -> Result<SequenceId, StoreError> {
        self.append_with(message, |db| db.flush())
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .field("messages", &self.messages.len())
            .finish()
    }
}
