//! The `transport` module holds the two network adapters around the relay
//! core: the HTTP ingress that accepts submissions and the WebSocket server
//! that subscribers connect to. Neither contains relay logic; they only turn
//! network traffic into `Relay::submit` calls and registry events.

pub mod http;
pub mod message;
pub mod websocket;

pub use http::{router, serve_http};
pub use message::IngressResponse;
pub use websocket::serve_websocket;

#[cfg(test)]
mod tests;
