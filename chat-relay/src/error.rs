//! Error taxonomy for the relay.
//!
//! Per-connection errors never leave the task that owns the connection. Only
//! [`RelayError`] reaches the caller of the listener.

use std::{io, net::SocketAddr};

use thiserror::Error;

/// Failures while turning inbound bytes into commands.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame has no `:` separating command from argument.
    #[error("malformed message: missing ':' separator")]
    MalformedMessage,

    #[error("frame exceeds {limit} bytes")]
    FrameTooLong { limit: usize },
}

impl ProtocolError {
    /// Whether the connection can keep reading after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedMessage)
    }
}

/// Commands that are well-formed but not valid for the session.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("chat attempted before register")]
    NotRegistered,

    #[error("user name cannot be empty")]
    InvalidName,
}

/// Why a frame could not be queued on a connection.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error("outbound queue full")]
    Backlogged,
}

/// Errors while reading the next frame from a connection.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Fatal listener errors reported to the process.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to bind {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to read local address")]
    LocalAddr(#[source] io::Error),
}
