//! Minimal text relay: clients register a name, list who is online, and send
//! greetings that the relay forwards to the named peer.
//!
//! Each module focuses on a concrete responsibility:
//!
//! - [`codec`] parses `<command>:<argument>` frames and owns the
//!   newline-delimited framing used in both directions.
//! - [`handle`] is the send-capable reference to one live connection.
//! - [`registry`] maps registered names to connection handles.
//! - [`router`] resolves a recipient and queues a chat frame on its
//!   connection.
//! - [`connection`] runs the per-connection command loop and releases the
//!   registry entry when the connection ends.
//! - [`relay`] binds the listener and spawns a handler per connection.
//! - [`client`] and [`demo`] drive the relay as ordinary protocol clients.
//!
//! Integration tests use this crate directly against a relay bound to an
//! ephemeral port.

pub mod cli;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod demo;
pub mod error;
pub mod handle;
pub mod registry;
pub mod relay;
pub mod router;
