//! The `error` module defines the error types used within `simrelay`.
//!
//! Errors are split by scope: a [`Rejection`] ends a single submission, a
//! [`SubscriberSendFailure`] affects a single subscriber during a broadcast,
//! [`StoreError`] comes out of the message store, and [`ServerError`] is only
//! produced while starting the listeners.

use std::time::Duration;

use thiserror::Error;

/// Reason a submission was not accepted by the relay.
///
/// The `Display` text is the reason reported back to the submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("payload could not be parsed")]
    MalformedPayload,
    #[error("missing required fields")]
    MissingFields,
    #[error("storage failure")]
    PersistenceFailure,
}

/// Failure raised by a [`MessageStore`](crate::persistence::MessageStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("corrupt key in message tree: {0}")]
    Corrupt(String),
    #[error("store task failed: {0}")]
    Task(String),
}

/// Why a broadcast skipped one subscriber. Never escalated past the registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriberSendFailure {
    #[error("subscriber is not open")]
    NotOpen,
    #[error("subscriber outbound queue is closed")]
    Closed,
    #[error("send did not complete within {0:?}")]
    TimedOut(Duration),
}

/// Errors that stop the relay binary from starting or serving.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),
}
