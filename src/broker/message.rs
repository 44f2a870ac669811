//! Submission decoding and validation
//!
//! A [`Submission`] is whatever the submitter sent, every field optional. The
//! only way to get a [`NewMessage`] (what the store accepts) is through
//! [`Submission::validate`], so an unvalidated record can never be persisted.
//!
//! Wire names are camelCase (`sender`, `text`, `sentAt`, `receivedAt`,
//! `channelTag`). The field names used by the SIM gateway firmware (`from`,
//! `sentStamp`, `receivedStamp`, `sim`) are accepted as aliases.

use serde::{Deserialize, Serialize};

use crate::utils::error::Rejection;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    #[serde(alias = "from")]
    pub sender: Option<String>,
    pub text: Option<String>,
    #[serde(alias = "sentStamp")]
    pub sent_at: Option<i64>,
    #[serde(alias = "receivedStamp")]
    pub received_at: Option<i64>,
    #[serde(alias = "sim")]
    pub channel_tag: Option<String>,
}

impl Submission {
    /// Decode a raw request body.
    ///
    /// Bytes that are not JSON are `MalformedPayload`. JSON that is not an
    /// object, or whose fields have the wrong type, is `MissingFields`.
    pub fn from_json(payload: &[u8]) -> Result<Self, Rejection> {
        let value: serde_json::Value =
            serde_json::from_slice(payload).map_err(|_| Rejection::MalformedPayload)?;
        serde_json::from_value(value).map_err(|_| Rejection::MissingFields)
    }

    /// Require all five fields to be present, strings non-empty and
    /// timestamps non-zero.
    pub fn validate(self) -> Result<NewMessage, Rejection> {
        let present = |s: Option<String>| s.filter(|s| !s.is_empty());
        let nonzero = |n: Option<i64>| n.filter(|n| *n != 0);

        match (
            present(self.sender),
            present(self.text),
            nonzero(self.sent_at),
            nonzero(self.received_at),
            present(self.channel_tag),
        ) {
            (Some(sender), Some(text), Some(sent_at), Some(received_at), Some(channel_tag)) => {
                Ok(NewMessage {
                    sender,
                    text,
                    sent_at,
                    received_at,
                    channel_tag,
                })
            }
            _ => Err(Rejection::MissingFields),
        }
    }
}

/// A fully validated message that has not been assigned a sequence id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    sender: String,
    text: String,
    sent_at: i64,
    received_at: i64,
    channel_tag: String,
}

impl NewMessage {
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// The only part of a message that is forwarded to subscribers.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sent_at(&self) -> i64 {
        self.sent_at
    }

    pub fn received_at(&self) -> i64 {
        self.received_at
    }

    pub fn channel_tag(&self) -> &str {
        &self.channel_tag
    }
}
