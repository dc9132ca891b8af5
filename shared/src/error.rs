//! Error types for the synchronization layer
//!
//! Only `Transport::open` hands an error back to the caller. Failures after a
//! connection is opened are reported through `ConnectionState`, and bad
//! records are counted and dropped by the frame decoder.

use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to start network runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid peer address '{0}'")]
    InvalidAddress(String),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// Record is not UTF-8 JSON
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Record is JSON but not a known message with all required fields
    #[error("protocol violation ({kind}): {reason}")]
    Protocol { kind: String, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LobbyError {
    #[error("map payload has {tiles} tiles, expected {width}x{height}")]
    InvalidMap { width: u32, height: u32, tiles: usize },

    #[error("cannot start the game from lobby state {0}")]
    NotReady(String),

    #[error("only the host can start the game")]
    NotHost,
}
