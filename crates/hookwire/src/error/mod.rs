//! Errors raised by plugin supervision.
//!
//! Every variant carries the plugin identity so a host juggling several
//! supervisors can attribute failures. I/O errors are wrapped in `Arc` to
//! satisfy the `result_large_err` Clippy lint.

use std::sync::Arc;

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::channel::ChannelError;
use crate::supervisor::SupervisorState;

/// Errors surfaced by [`Supervisor`](crate::Supervisor) operations and hook
/// calls.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The bundle descriptor itself is unusable.
    #[error("invalid bundle for plugin '{plugin}': {message}")]
    InvalidBundle {
        /// Plugin identity, possibly empty.
        plugin: String,
        /// What is wrong with the descriptor.
        message: String,
    },

    /// The executable path escapes the bundle root.
    #[error("executable path '{path}' for plugin '{plugin}' is invalid: {reason}")]
    InvalidExecutablePath {
        /// Plugin identity.
        plugin: String,
        /// The path as given in the descriptor.
        path: String,
        /// Why the path was rejected.
        reason: String,
    },

    /// The executable could not be spawned.
    #[error("failed to launch plugin '{plugin}' from {path}: {source}")]
    ExecutableLaunchFailed {
        /// Plugin identity.
        plugin: String,
        /// Absolute executable path.
        path: Utf8PathBuf,
        /// Underlying spawn error.
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The handshake did not complete within the startup bound.
    #[error("plugin '{plugin}' did not complete its handshake within {timeout_ms}ms")]
    StartTimeout {
        /// Plugin identity.
        plugin: String,
        /// Startup bound in milliseconds.
        timeout_ms: u64,
    },

    /// The process went away or misbehaved during the handshake.
    #[error("handshake with plugin '{plugin}' failed: {reason}")]
    HandshakeFailed {
        /// Plugin identity.
        plugin: String,
        /// Failure description.
        reason: String,
    },

    /// The plugin rejected activation.
    #[error("plugin '{plugin}' failed to activate: {message}")]
    ActivationFailed {
        /// Plugin identity.
        plugin: String,
        /// Error message returned by the plugin.
        message: String,
    },

    /// `start` was called on a supervisor that is not freshly created.
    #[error("plugin '{plugin}' cannot be started from state {state}")]
    AlreadyStarted {
        /// Plugin identity.
        plugin: String,
        /// State observed when `start` was called.
        state: SupervisorState,
    },

    /// A hook was called before `start` or after `stop`.
    #[error("plugin '{plugin}' is not running (state {state})")]
    NotRunning {
        /// Plugin identity.
        plugin: String,
        /// State observed when the hook was called.
        state: SupervisorState,
    },

    /// The transport to the plugin was lost.
    #[error("channel to plugin '{plugin}' is broken: {reason}")]
    ChannelBroken {
        /// Plugin identity.
        plugin: String,
        /// Failure description.
        reason: String,
    },

    /// The plugin returned an application-level error for a hook call.
    #[error("plugin '{plugin}' failed hook '{method}' ({code}): {message}")]
    HookInvocation {
        /// Plugin identity.
        plugin: String,
        /// Wire method that failed.
        method: String,
        /// JSON-RPC error code.
        code: i64,
        /// Error message returned by the plugin.
        message: String,
    },

    /// A hook call did not complete within the configured call bound.
    #[error("plugin '{plugin}' did not answer '{method}' within {timeout_ms}ms")]
    HookTimeout {
        /// Plugin identity.
        plugin: String,
        /// Wire method that timed out.
        method: String,
        /// Call bound in milliseconds.
        timeout_ms: u64,
    },

    /// Hook arguments or results could not be encoded or decoded.
    #[error("failed to encode or decode '{method}': {source}")]
    Codec {
        /// Wire method involved.
        method: String,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The process could not be confirmed dead during `stop`.
    #[error("failed to stop plugin '{plugin}': {reason}")]
    StopFailed {
        /// Plugin identity.
        plugin: String,
        /// Failure description.
        reason: String,
    },
}

impl SupervisorError {
    /// Returns `true` when the error reports a lost transport.
    #[must_use]
    pub const fn is_channel_broken(&self) -> bool {
        matches!(self, Self::ChannelBroken { .. })
    }

    /// Maps a channel failure observed while calling `method`.
    pub(crate) fn from_channel(plugin: &str, method: &str, error: ChannelError) -> Self {
        match error {
            ChannelError::Broken { reason, .. } => Self::ChannelBroken {
                plugin: plugin.to_owned(),
                reason,
            },
            ChannelError::Remote { code, message, .. } => Self::HookInvocation {
                plugin: plugin.to_owned(),
                method: method.to_owned(),
                code,
                message,
            },
            ChannelError::Timeout { timeout_ms, .. } => Self::HookTimeout {
                plugin: plugin.to_owned(),
                method: method.to_owned(),
                timeout_ms,
            },
            ChannelError::Codec(source) => Self::Codec {
                method: method.to_owned(),
                source,
            },
        }
    }
}
