//! Error types for the call channel.

use std::io;

use serde_json::Value;
use thiserror::Error;

/// Errors raised while reading or writing frames.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error during read or write.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the stream between frames.
    #[error("peer closed the stream")]
    Closed,

    /// Missing Content-Length header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// Invalid header format.
    #[error("invalid header format")]
    InvalidHeader,

    /// The announced frame length exceeds the accepted maximum.
    #[error("frame of {length} bytes exceeds the {limit} byte limit")]
    FrameTooLarge {
        /// Announced payload length.
        length: usize,
        /// Maximum accepted payload length.
        limit: usize,
    },
}

/// Errors surfaced by [`Channel`](super::Channel) calls.
///
/// [`ChannelError::Broken`] is deliberately distinct from
/// [`ChannelError::Remote`]: the former means the peer is gone, the latter
/// means the peer answered with an application error.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The transport is closed or failed; no response will arrive.
    #[error("channel '{label}' is broken: {reason}")]
    Broken {
        /// Channel label used in diagnostics.
        label: String,
        /// Why the channel stopped.
        reason: String,
    },

    /// The peer answered with a JSON-RPC error object.
    #[error("remote error {code}: {message}")]
    Remote {
        /// JSON-RPC error code.
        code: i64,
        /// Error message supplied by the peer.
        message: String,
        /// Optional structured error payload.
        data: Option<Value>,
    },

    /// No response arrived within the requested bound.
    #[error("no response to '{method}' within {timeout_ms}ms")]
    Timeout {
        /// Method that was invoked.
        method: String,
        /// The bound that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// A message could not be encoded or decoded.
    #[error("JSON codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl ChannelError {
    /// Returns `true` when the error means the peer is gone.
    #[must_use]
    pub const fn is_broken(&self) -> bool {
        matches!(self, Self::Broken { .. })
    }
}
