//! Spawn and handshake shared by `start` and crash relaunches.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::state::Generation;
use super::{Core, SUPERVISOR_TARGET, lifecycle};
use crate::api::ApiServer;
use crate::channel::{Channel, ChannelError, ClosedCallback};
use crate::config::duration_millis;
use crate::error::SupervisorError;
use crate::protocol::{self, ActivateParams};

/// Log target for lines a plugin writes to stderr.
pub const PLUGIN_STDERR_TARGET: &str = "hookwire::plugin_stderr";

impl Core {
    /// Spawns the executable and completes the activation handshake within
    /// the startup timeout. On failure no process survives.
    pub(super) fn launch(&self, number: u64) -> Result<Generation, SupervisorError> {
        let plugin = self.bundle.id();
        let deadline = Instant::now() + self.config.startup_timeout();
        let mut child = self.spawn_child(number)?;
        let pid = child.id();

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            abort_child(plugin, &mut child);
            return Err(SupervisorError::HandshakeFailed {
                plugin: plugin.to_owned(),
                reason: String::from("failed to capture plugin stdio"),
            });
        };
        if let Some(stderr) = child.stderr.take() {
            forward_stderr(plugin, pid, stderr);
        }

        let server = ApiServer::new(self.host_api());
        let channel = match Channel::spawn(
            format!("{plugin}#{number}"),
            stdout,
            stdin,
            Arc::new(server),
            Some(crash_monitor(self.this.clone(), number)),
        ) {
            Ok(channel) => channel,
            Err(err) => {
                abort_child(plugin, &mut child);
                return Err(SupervisorError::HandshakeFailed {
                    plugin: plugin.to_owned(),
                    reason: format!("failed to start channel: {err}"),
                });
            }
        };

        let params = ActivateParams {
            plugin_id: plugin.to_owned(),
        };
        let remaining = deadline.saturating_duration_since(Instant::now());
        let handshake = serde_json::to_value(&params)
            .map_err(ChannelError::from)
            .and_then(|value| channel.invoke_timeout(protocol::ACTIVATE, Some(value), remaining));

        match handshake {
            Ok(_) => {
                info!(
                    target: SUPERVISOR_TARGET,
                    plugin,
                    pid,
                    generation = number,
                    "plugin activated"
                );
                Ok(Generation {
                    number,
                    child,
                    channel,
                })
            }
            Err(err) => {
                channel.close();
                abort_child(plugin, &mut child);
                Err(self.handshake_error(err))
            }
        }
    }

    fn spawn_child(&self, number: u64) -> Result<Child, SupervisorError> {
        let executable = self.bundle.executable();
        debug!(
            target: SUPERVISOR_TARGET,
            plugin = self.bundle.id(),
            executable = %executable,
            generation = number,
            "spawning plugin process"
        );

        Command::new(executable)
            .current_dir(self.bundle.root_dir())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| SupervisorError::ExecutableLaunchFailed {
                plugin: self.bundle.id().to_owned(),
                path: executable.to_owned(),
                source: Arc::new(err),
            })
    }

    fn handshake_error(&self, error: ChannelError) -> SupervisorError {
        let plugin = self.bundle.id().to_owned();
        match error {
            ChannelError::Timeout { .. } => SupervisorError::StartTimeout {
                plugin,
                timeout_ms: duration_millis(self.config.startup_timeout()),
            },
            ChannelError::Remote { message, .. } => {
                SupervisorError::ActivationFailed { plugin, message }
            }
            other @ (ChannelError::Broken { .. } | ChannelError::Codec(_)) => {
                SupervisorError::HandshakeFailed {
                    plugin,
                    reason: other.to_string(),
                }
            }
        }
    }
}

/// Builds the close callback that reports an unexpected exit of
/// `generation` to the supervisor.
fn crash_monitor(core: Weak<Core>, generation: u64) -> ClosedCallback {
    Box::new(move |reason: &str| {
        if let Some(core) = core.upgrade() {
            core.channel_closed(generation, reason);
        }
    })
}

fn abort_child(plugin: &str, child: &mut Child) {
    if let Err(reason) = lifecycle::force_kill(child) {
        warn!(
            target: SUPERVISOR_TARGET,
            plugin,
            reason = %reason,
            "failed to reap aborted plugin process"
        );
    }
}

fn forward_stderr(plugin: &str, pid: u32, stderr: impl Read + Send + 'static) {
    let owner = plugin.to_owned();
    let spawned = thread::Builder::new()
        .name(format!("hookwire-{plugin}-stderr"))
        .spawn(move || {
            for line in BufReader::new(stderr).lines() {
                let Ok(text) = line else {
                    break;
                };
                debug!(target: PLUGIN_STDERR_TARGET, plugin = %owner, pid, "{text}");
            }
        });
    if let Err(err) = spawned {
        warn!(
            target: SUPERVISOR_TARGET,
            plugin,
            error = %err,
            "failed to forward plugin stderr"
        );
    }
}
