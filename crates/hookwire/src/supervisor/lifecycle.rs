//! Process termination helpers.

use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::SUPERVISOR_TARGET;
use super::state::Generation;
use crate::channel::Channel;
use crate::protocol;

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Waits up to `grace` for the child to exit, then kills it.
///
/// Returns an error description when the child cannot be confirmed dead.
pub(super) fn terminate_child(
    plugin: &str,
    child: &mut Child,
    grace: Duration,
) -> Result<(), String> {
    let deadline = Instant::now() + grace;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                debug!(
                    target: SUPERVISOR_TARGET,
                    plugin,
                    pid = child.id(),
                    ?status,
                    "plugin process exited"
                );
                return Ok(());
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL_INTERVAL),
            Ok(None) => break,
            Err(err) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    plugin,
                    pid = child.id(),
                    error = %err,
                    "failed to check process status"
                );
                break;
            }
        }
    }

    warn!(
        target: SUPERVISOR_TARGET,
        plugin,
        pid = child.id(),
        grace_ms = crate::config::duration_millis(grace),
        "plugin did not exit within its grace period, killing"
    );
    force_kill(child)
}

/// Kills and reaps the child.
pub(super) fn force_kill(child: &mut Child) -> Result<(), String> {
    // Killing an already exited child can fail; reaping still succeeds.
    let kill_result = child.kill();
    match child.wait() {
        Ok(_) => Ok(()),
        Err(wait_err) => Err(match kill_result {
            Ok(()) => format!("failed to reap process {}: {wait_err}", child.id()),
            Err(kill_err) => format!(
                "failed to kill process {}: {kill_err}; reap failed: {wait_err}",
                child.id()
            ),
        }),
    }
}

/// Tears down a generation that is no longer wanted without ceremony.
pub(super) fn discard(plugin: &str, mut generation: Generation) {
    generation.channel.close();
    if let Err(reason) = force_kill(&mut generation.child) {
        warn!(
            target: SUPERVISOR_TARGET,
            plugin,
            generation = generation.number,
            reason = %reason,
            "failed to reap plugin process"
        );
    }
}

/// Asks a running generation to exit, escalating to a kill after `grace`.
///
/// The grace period starts immediately: the shutdown notification is written
/// from a helper thread so a plugin that stopped draining stdin cannot stall
/// the caller behind a blocked write.
pub(super) fn shut_down(
    plugin: &str,
    mut generation: Generation,
    grace: Duration,
) -> Result<(), String> {
    request_exit(plugin, &generation.channel);
    let outcome = terminate_child(plugin, &mut generation.child, grace);
    generation.channel.close();
    outcome
}

fn request_exit(plugin: &str, channel: &Channel) {
    let notifier = channel.clone();
    let owner = plugin.to_owned();
    let spawned = thread::Builder::new()
        .name(format!("hookwire-{plugin}-shutdown"))
        .spawn(move || {
            if let Err(err) = notifier.notify(protocol::SHUTDOWN, None) {
                debug!(
                    target: SUPERVISOR_TARGET,
                    plugin = %owner,
                    error = %err,
                    "could not deliver shutdown notification"
                );
            }
            notifier.close();
        });
    if let Err(err) = spawned {
        warn!(
            target: SUPERVISOR_TARGET,
            plugin,
            error = %err,
            "failed to spawn shutdown thread; closing stdin instead"
        );
        channel.close();
    }
}
