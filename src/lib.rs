//! # simrelay
//!
//! `simrelay` accepts messages over HTTP, records them durably, and fans the
//! message text out to every subscriber connected over WebSockets. It was
//! built to sit between SMS/SIM gateways posting received messages and the
//! small devices that display them.
//!
//! ## Core Modules
//!
//! - `broker`: submission validation, the subscriber registry, and the relay
//!   engine that persists then broadcasts.
//! - `subscriber`: the handle for one connected WebSocket peer.
//! - `persistence`: the message store contract and its `sled` implementation.
//! - `transport`: the HTTP ingress and the WebSocket subscriber server.
//! - `config`: settings from file and environment.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod config;
pub mod persistence;
pub mod subscriber;
pub mod transport;
pub mod utils;
