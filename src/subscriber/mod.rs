//! The `subscriber` module defines the representation of a connected peer.
//!
//! A [`Subscriber`] is the connection handle the registry owns for as long as
//! the WebSocket stays up.

pub mod handle;
pub use handle::{Subscriber, SubscriberId, SubscriberState};
