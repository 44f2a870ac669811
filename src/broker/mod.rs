//! The broker is the relay core: submission validation, the subscriber
//! registry, and the submit-then-broadcast engine tying them to the store.

pub mod engine;
pub mod message;
pub mod registry;

pub use engine::Relay;
pub use registry::{BroadcastReport, SubscriberEvent, SubscriberRegistry};
