//! Payloads exchanged by feature hooks.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A slash command invocation routed to a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandArgs {
    /// Full command text, including the trigger.
    pub command: String,
    /// Invoking user, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Channel the command was issued in, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
}

impl CommandArgs {
    /// Builds arguments carrying only the command text.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Returns the trigger word without its leading slash.
    #[must_use]
    pub fn trigger(&self) -> &str {
        let first = self.command.split_whitespace().next().unwrap_or_default();
        first.strip_prefix('/').unwrap_or(first)
    }
}

/// A plugin's answer to a slash command.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CommandResponse {
    /// Text shown to the user.
    pub text: String,
    /// Whether only the invoking user sees the response.
    #[serde(default)]
    pub ephemeral: bool,
}

impl CommandResponse {
    /// Builds a response visible in the channel.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ephemeral: false,
        }
    }
}

/// A post about to be stored.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Post {
    /// Post identifier.
    #[serde(default)]
    pub id: String,
    /// Channel the post belongs to.
    #[serde(default)]
    pub channel_id: String,
    /// Author.
    #[serde(default)]
    pub user_id: String,
    /// Message body.
    pub message: String,
}

/// What a plugin decided about a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum PostVerdict {
    /// Store the post unchanged.
    Allow,
    /// Store this post instead.
    Replace {
        /// The rewritten post.
        post: Post,
    },
    /// Drop the post.
    Reject {
        /// Reason shown to the author.
        reason: String,
    },
}

/// Application-level failure returned by a plugin's hook implementation.
///
/// Crosses the wire as a JSON-RPC error and reaches the host as
/// [`SupervisorError::HookInvocation`](crate::SupervisorError::HookInvocation).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HookError {
    message: String,
}

impl HookError {
    /// Builds an error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
