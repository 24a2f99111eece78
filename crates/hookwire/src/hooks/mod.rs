//! Host-facing hook capability set and its cross-process proxy.
//!
//! [`Hooks`] is what host features call. [`HookProxy`] implements it by
//! encoding arguments, handing the call to a [`HookDispatch`] and decoding
//! the result. The proxy knows nothing about processes or restarts; the
//! supervisor's dispatcher owns that.

mod types;


use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub use self::types::{CommandArgs, CommandResponse, HookError, Post, PostVerdict};
use crate::error::SupervisorError;
use crate::protocol;

/// Hooks the host may invoke on a running plugin.
pub trait Hooks: Send + Sync {
    /// Lifecycle hook run before the plugin is disabled.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the call cannot be delivered or the
    /// plugin reports a failure.
    fn on_deactivate(&self) -> Result<(), SupervisorError>;

    /// Tells the plugin its configuration changed.
    ///
    /// # Errors
    ///
    /// As [`Hooks::on_deactivate`].
    fn on_configuration_change(&self) -> Result<(), SupervisorError>;

    /// Runs a slash command registered by the plugin.
    ///
    /// # Errors
    ///
    /// As [`Hooks::on_deactivate`].
    fn execute_command(&self, args: &CommandArgs) -> Result<CommandResponse, SupervisorError>;

    /// Lets the plugin allow, rewrite or reject a post.
    ///
    /// # Errors
    ///
    /// As [`Hooks::on_deactivate`].
    fn message_will_be_posted(&self, post: &Post) -> Result<PostVerdict, SupervisorError>;
}

/// Delivers one encoded hook call to a plugin.
pub trait HookDispatch: Send + Sync {
    /// Sends `method` with `params` and returns the raw result.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::ChannelBroken`] when the plugin is gone and
    /// [`SupervisorError::HookInvocation`] when it answered with an error.
    fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, SupervisorError>;
}

/// Forwards [`Hooks`] calls through a [`HookDispatch`].
#[derive(Clone)]
pub struct HookProxy {
    dispatcher: Arc<dyn HookDispatch>,
}

impl HookProxy {
    /// Binds a proxy to `dispatcher`.
    #[must_use]
    pub fn new(dispatcher: Arc<dyn HookDispatch>) -> Self {
        Self { dispatcher }
    }

    fn call<P, R>(&self, method: &str, params: Option<&P>) -> Result<R, SupervisorError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let encoded = params
            .map(serde_json::to_value)
            .transpose()
            .map_err(|source| codec_error(method, source))?;
        let result = self.dispatcher.dispatch(method, encoded)?;
        serde_json::from_value(result).map_err(|source| codec_error(method, source))
    }

    fn call_unit(&self, method: &str) -> Result<(), SupervisorError> {
        self.dispatcher.dispatch(method, None).map(drop)
    }
}

fn codec_error(method: &str, source: serde_json::Error) -> SupervisorError {
    SupervisorError::Codec {
        method: method.to_owned(),
        source,
    }
}

impl Hooks for HookProxy {
    fn on_deactivate(&self) -> Result<(), SupervisorError> {
        self.call_unit(protocol::DEACTIVATE)
    }

    fn on_configuration_change(&self) -> Result<(), SupervisorError> {
        self.call_unit(protocol::CONFIGURATION_CHANGE)
    }

    fn execute_command(&self, args: &CommandArgs) -> Result<CommandResponse, SupervisorError> {
        self.call(protocol::EXECUTE_COMMAND, Some(args))
    }

    fn message_will_be_posted(&self, post: &Post) -> Result<PostVerdict, SupervisorError> {
        self.call(protocol::MESSAGE_WILL_BE_POSTED, Some(post))
    }
}

impl std::fmt::Debug for HookProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookProxy").finish_non_exhaustive()
    }
}
