//! Plugin-side runtime.
//!
//! A plugin executable implements [`Plugin`] and hands it to [`serve`] from
//! `main`. The runtime speaks the channel protocol over the process's stdin
//! and stdout, so plugins must never write to stdout themselves; stderr is
//! forwarded to the host log.
//!
//! ```no_run
//! use hookwire::plugin::{Plugin, serve};
//!
//! struct Quiet;
//!
//! impl Plugin for Quiet {}
//!
//! fn main() -> Result<(), hookwire::plugin::PluginRuntimeError> {
//!     serve(Quiet)
//! }
//! ```

#[cfg(all(test, unix))]
mod tests;

use std::io::{Read, Write};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::ApiClient;
use crate::channel::{
    Channel, ClosedCallback, IncomingHandler, RpcError, decode_params, encode_result,
};
use crate::hooks::{CommandArgs, CommandResponse, HookError, Post, PostVerdict};
use crate::protocol::{self, ActivateParams};

const PLUGIN_TARGET: &str = "hookwire::plugin";

/// Behaviour of a plugin process. Every hook has a default.
pub trait Plugin: Send + Sync + 'static {
    /// Handshake hook. `api` stays valid for the life of the process.
    ///
    /// # Errors
    ///
    /// Returning an error fails the host's `start` with
    /// [`SupervisorError::ActivationFailed`](crate::SupervisorError::ActivationFailed).
    fn on_activate(&self, _api: &ApiClient) -> Result<(), HookError> {
        Ok(())
    }

    /// Lifecycle hook run before the plugin is disabled.
    ///
    /// # Errors
    ///
    /// The error is reported to the host caller verbatim.
    fn on_deactivate(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// The plugin's configuration changed.
    ///
    /// # Errors
    ///
    /// The error is reported to the host caller verbatim.
    fn on_configuration_change(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Runs a slash command.
    ///
    /// # Errors
    ///
    /// The default implementation rejects every command.
    fn execute_command(&self, args: &CommandArgs) -> Result<CommandResponse, HookError> {
        Err(HookError::new(format!(
            "command not implemented: {}",
            args.trigger()
        )))
    }

    /// Inspects a post before it is stored. Allows everything by default.
    ///
    /// # Errors
    ///
    /// The error is reported to the host caller verbatim.
    fn message_will_be_posted(&self, _post: &Post) -> Result<PostVerdict, HookError> {
        Ok(PostVerdict::Allow)
    }
}

/// Errors that stop the plugin runtime.
#[derive(Debug, Error)]
pub enum PluginRuntimeError {
    /// The channel could not be started.
    #[error("failed to start plugin channel: {0}")]
    Channel(#[source] Arc<std::io::Error>),
}

/// Serves `plugin` over stdin and stdout until the host disconnects or asks
/// it to shut down.
///
/// # Errors
///
/// Returns [`PluginRuntimeError`] if the channel cannot be started.
pub fn serve<P: Plugin>(plugin: P) -> Result<(), PluginRuntimeError> {
    serve_io(plugin, std::io::stdin(), std::io::stdout())
}

/// Serves `plugin` over an arbitrary stream pair.
///
/// # Errors
///
/// Returns [`PluginRuntimeError`] if the channel cannot be started.
pub fn serve_io<P, R, W>(plugin: P, reader: R, writer: W) -> Result<(), PluginRuntimeError>
where
    P: Plugin,
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (done_tx, done_rx) = mpsc::channel();
    let closed_tx = done_tx.clone();
    let server = HookServer {
        plugin,
        shutdown: done_tx,
    };
    let on_closed: ClosedCallback = Box::new(move |reason: &str| {
        debug!(target: PLUGIN_TARGET, reason, "host disconnected");
        drop(closed_tx.send(()));
    });
    let channel = Channel::spawn("plugin", reader, writer, Arc::new(server), Some(on_closed))
        .map_err(|err| PluginRuntimeError::Channel(Arc::new(err)))?;

    // A disconnect means the reader is gone, which also ends the session.
    drop(done_rx.recv());
    channel.close();
    info!(target: PLUGIN_TARGET, "plugin runtime stopped");
    Ok(())
}

struct HookServer<P> {
    plugin: P,
    shutdown: Sender<()>,
}

fn hook_failure(error: &HookError) -> RpcError {
    RpcError::application(error.message())
}

impl<P: Plugin> IncomingHandler for HookServer<P> {
    fn handle_request(
        &self,
        channel: &Channel,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RpcError> {
        match method {
            protocol::ACTIVATE => {
                let request: ActivateParams = decode_params(params)?;
                debug!(
                    target: PLUGIN_TARGET,
                    plugin = %request.plugin_id,
                    "activating"
                );
                let api = ApiClient::new(channel.clone());
                self.plugin
                    .on_activate(&api)
                    .map_err(|err| hook_failure(&err))?;
                Ok(Value::Null)
            }
            protocol::DEACTIVATE => {
                self.plugin
                    .on_deactivate()
                    .map_err(|err| hook_failure(&err))?;
                Ok(Value::Null)
            }
            protocol::CONFIGURATION_CHANGE => {
                self.plugin
                    .on_configuration_change()
                    .map_err(|err| hook_failure(&err))?;
                Ok(Value::Null)
            }
            protocol::EXECUTE_COMMAND => {
                let args: CommandArgs = decode_params(params)?;
                let response = self
                    .plugin
                    .execute_command(&args)
                    .map_err(|err| hook_failure(&err))?;
                encode_result(&response)
            }
            protocol::MESSAGE_WILL_BE_POSTED => {
                let post: Post = decode_params(params)?;
                let verdict = self
                    .plugin
                    .message_will_be_posted(&post)
                    .map_err(|err| hook_failure(&err))?;
                encode_result(&verdict)
            }
            other => Err(RpcError::method_not_found(other)),
        }
    }

    fn handle_notification(&self, _channel: &Channel, method: &str, _params: Option<Value>) {
        if method == protocol::SHUTDOWN {
            info!(target: PLUGIN_TARGET, "shutdown requested by host");
            drop(self.shutdown.send(()));
        } else {
            debug!(target: PLUGIN_TARGET, method, "ignoring notification");
        }
    }
}
