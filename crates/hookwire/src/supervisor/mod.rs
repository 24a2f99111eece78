//! Supervision of one out-of-process plugin.
//!
//! A [`Supervisor`] owns a plugin process end to end. It validates the
//! executable path at construction, launches the process and performs the
//! activation handshake within a bounded startup timeout, forwards hook calls
//! from any number of threads, and relaunches the plugin after a crash.
//!
//! Recovery is passive. The channel's reader thread watches each process and
//! marks the supervisor crashed when the process goes away, but the
//! replacement is only launched by the next hook call. The call that observes
//! a broken channel always fails; calls after a successful relaunch reach the
//! new process. At most one relaunch is in flight at a time: callers that hit
//! the crash concurrently wait for its outcome instead of spawning their own.

mod launch;
mod lifecycle;
mod state;


use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tracing::{debug, info, warn};

pub use self::launch::PLUGIN_STDERR_TARGET;
pub use self::state::SupervisorState;
use self::state::Lifecycle;
use crate::api::HostApi;
use crate::bundle::{self, BundleDescriptor, ResolvedBundle};
use crate::channel::Channel;
use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::hooks::{HookDispatch, HookProxy};

/// Log target for supervisor operations.
pub(crate) const SUPERVISOR_TARGET: &str = "hookwire::supervisor";

/// Owns one plugin process and keeps its hook surface available.
///
/// Dropping the supervisor kills the plugin without a grace period, even
/// while [`HookProxy`] clones are still alive; their later calls fail with
/// [`SupervisorError::NotRunning`]. Call [`Supervisor::stop`] first for an
/// orderly shutdown.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use hookwire::{BundleDescriptor, Hooks, InMemoryHostApi, Supervisor};
///
/// let bundle = BundleDescriptor::new("demo", "/opt/plugins/demo", "bin/demo-plugin");
/// let supervisor = Supervisor::new(&bundle)?;
/// supervisor.start(Some(Arc::new(InMemoryHostApi::default())))?;
/// supervisor.hooks().on_configuration_change()?;
/// supervisor.stop()?;
/// # Ok::<(), hookwire::SupervisorError>(())
/// ```
pub struct Supervisor {
    core: Arc<Core>,
}

struct Core {
    bundle: ResolvedBundle,
    config: SupervisorConfig,
    lifecycle: Mutex<Lifecycle>,
    settled: Condvar,
    host_api: Mutex<Option<Arc<dyn HostApi>>>,
    generations: AtomicU64,
    restarts: AtomicU64,
    this: Weak<Core>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Supervisor {
    /// Validates `bundle` with the default configuration.
    ///
    /// No process is spawned and the executable is not required to exist.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidExecutablePath`] when the executable
    /// escapes the bundle root, or [`SupervisorError::InvalidBundle`] when the
    /// descriptor is otherwise unusable.
    pub fn new(bundle: &BundleDescriptor) -> Result<Self, SupervisorError> {
        Self::with_config(bundle, SupervisorConfig::default())
    }

    /// Validates `bundle` and applies `config`.
    ///
    /// # Errors
    ///
    /// As [`Supervisor::new`].
    pub fn with_config(
        bundle: &BundleDescriptor,
        config: SupervisorConfig,
    ) -> Result<Self, SupervisorError> {
        let resolved = bundle::resolve(bundle)?;
        debug!(
            target: SUPERVISOR_TARGET,
            plugin = resolved.id(),
            executable = %resolved.executable(),
            "supervisor created"
        );
        let core = Arc::new_cyclic(|this| Core {
            bundle: resolved,
            config,
            lifecycle: Mutex::new(Lifecycle::Created),
            settled: Condvar::new(),
            host_api: Mutex::new(None),
            generations: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            this: this.clone(),
        });
        Ok(Self { core })
    }

    /// Launches the plugin and injects `host_api`, which is retained for
    /// every later relaunch.
    ///
    /// Blocks until the handshake completes, the launch fails, or the startup
    /// timeout elapses. A failed start leaves no process behind and returns
    /// the supervisor to [`SupervisorState::Created`].
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::ExecutableLaunchFailed`] when the process
    /// cannot be spawned, [`SupervisorError::StartTimeout`] when the handshake
    /// does not complete in time, [`SupervisorError::HandshakeFailed`] or
    /// [`SupervisorError::ActivationFailed`] when the plugin exits or refuses
    /// activation, and [`SupervisorError::AlreadyStarted`] unless the
    /// supervisor is freshly created.
    pub fn start(&self, host_api: Option<Arc<dyn HostApi>>) -> Result<(), SupervisorError> {
        self.core.start(host_api)
    }

    /// Returns the hook proxy bound to this supervisor.
    #[must_use]
    pub fn hooks(&self) -> HookProxy {
        let dispatcher: Arc<dyn HookDispatch> = Arc::clone(&self.core) as Arc<dyn HookDispatch>;
        HookProxy::new(dispatcher)
    }

    /// Shuts the plugin down. Idempotent.
    ///
    /// Waits for an in-flight start or relaunch, asks the plugin to exit,
    /// and kills it if it is still alive after the grace period. The
    /// supervisor ends [`SupervisorState::Stopped`] even on error.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::StopFailed`] when the process cannot be
    /// confirmed dead.
    pub fn stop(&self) -> Result<(), SupervisorError> {
        self.core.stop()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SupervisorState {
        self.core.lifecycle().state()
    }

    /// Returns the PID of the running plugin process.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        match &*self.core.lifecycle() {
            Lifecycle::Running(generation) => Some(generation.child.id()),
            _ => None,
        }
    }

    /// Returns the validated bundle.
    #[must_use]
    pub fn bundle(&self) -> &ResolvedBundle {
        &self.core.bundle
    }

    /// Returns how many crash relaunches have succeeded.
    #[must_use]
    pub fn restarts(&self) -> u64 {
        self.core.restarts.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("plugin", &self.core.bundle.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Core {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        lock(&self.lifecycle)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, Lifecycle>) -> MutexGuard<'a, Lifecycle> {
        self.settled
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn host_api(&self) -> Option<Arc<dyn HostApi>> {
        lock(&self.host_api).clone()
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn plugin(&self) -> &str {
        self.bundle.id()
    }

    /// Replaces the lifecycle and wakes everyone waiting on a transition.
    fn settle(&self, mut guard: MutexGuard<'_, Lifecycle>, next: Lifecycle) -> Lifecycle {
        let previous = std::mem::replace(&mut *guard, next);
        drop(guard);
        self.settled.notify_all();
        previous
    }

    fn start(&self, host_api: Option<Arc<dyn HostApi>>) -> Result<(), SupervisorError> {
        {
            let mut guard = self.lifecycle();
            if !matches!(*guard, Lifecycle::Created) {
                return Err(SupervisorError::AlreadyStarted {
                    plugin: self.plugin().to_owned(),
                    state: guard.state(),
                });
            }
            *guard = Lifecycle::Starting;
        }
        *lock(&self.host_api) = host_api;

        let outcome = self.launch(self.next_generation());
        let guard = self.lifecycle();
        match outcome {
            Ok(generation) => {
                self.settle(guard, Lifecycle::Running(generation));
                Ok(())
            }
            Err(err) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    plugin = self.plugin(),
                    error = %err,
                    "plugin failed to start"
                );
                self.settle(guard, Lifecycle::Created);
                Err(err)
            }
        }
    }

    fn stop(&self) -> Result<(), SupervisorError> {
        let mut guard = self.lifecycle();
        while guard.is_transitional() {
            guard = self.wait(guard);
        }
        let previous = self.settle(guard, Lifecycle::Stopped);

        let Lifecycle::Running(generation) = previous else {
            debug!(
                target: SUPERVISOR_TARGET,
                plugin = self.plugin(),
                state = %previous.state(),
                "stop with no running process"
            );
            return Ok(());
        };

        info!(
            target: SUPERVISOR_TARGET,
            plugin = self.plugin(),
            pid = generation.child.id(),
            generation = generation.number,
            "stopping plugin"
        );
        lifecycle::shut_down(self.plugin(), generation, self.config.shutdown_grace()).map_err(
            |reason| SupervisorError::StopFailed {
                plugin: self.plugin().to_owned(),
                reason,
            },
        )
    }

    /// Kills the running process without a grace period and leaves the
    /// lifecycle `Stopped`, so surviving hook proxies fail with `NotRunning`.
    fn abandon(&self) {
        let mut guard = self.lifecycle();
        while guard.is_transitional() {
            guard = self.wait(guard);
        }
        if let Lifecycle::Running(generation) = self.settle(guard, Lifecycle::Stopped) {
            debug!(
                target: SUPERVISOR_TARGET,
                plugin = self.plugin(),
                pid = generation.child.id(),
                "supervisor dropped; killing plugin"
            );
            lifecycle::discard(self.plugin(), generation);
        }
    }

    /// Returns the channel to forward on, relaunching a crashed plugin first.
    fn acquire_channel(&self) -> Result<(u64, Channel), SupervisorError> {
        let mut guard = self.lifecycle();
        let mut waited_for_relaunch = false;
        loop {
            if let Some(current) = guard.running_channel() {
                return Ok(current);
            }
            match guard.state() {
                SupervisorState::Crashed => {
                    if waited_for_relaunch {
                        let reason = guard.crash_reason().unwrap_or("relaunch failed");
                        return Err(self.channel_broken(reason));
                    }
                    *guard = Lifecycle::Restarting;
                    drop(guard);
                    return self.relaunch();
                }
                SupervisorState::Restarting => {
                    waited_for_relaunch = true;
                    guard = self.wait(guard);
                }
                SupervisorState::Starting => guard = self.wait(guard),
                state => {
                    return Err(SupervisorError::NotRunning {
                        plugin: self.plugin().to_owned(),
                        state,
                    });
                }
            }
        }
    }

    /// Launches a replacement process. The caller must have moved the
    /// lifecycle to `Restarting`.
    fn relaunch(&self) -> Result<(u64, Channel), SupervisorError> {
        let number = self.next_generation();
        info!(
            target: SUPERVISOR_TARGET,
            plugin = self.plugin(),
            generation = number,
            "relaunching plugin"
        );
        let outcome = self.launch(number);
        let guard = self.lifecycle();
        match outcome {
            Ok(generation) => {
                let current = (generation.number, generation.channel.clone());
                self.restarts.fetch_add(1, Ordering::Relaxed);
                self.settle(guard, Lifecycle::Running(generation));
                Ok(current)
            }
            Err(err) => {
                warn!(
                    target: SUPERVISOR_TARGET,
                    plugin = self.plugin(),
                    generation = number,
                    error = %err,
                    "relaunch failed; the next hook call will retry"
                );
                self.settle(
                    guard,
                    Lifecycle::Crashed {
                        generation: number,
                        reason: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Handles a broken channel observed by a call on `number`.
    ///
    /// Relaunches once unless another caller already did or is doing so.
    fn recover(&self, number: u64) {
        let mut guard = self.lifecycle();
        while guard.state() == SupervisorState::Restarting {
            guard = self.wait(guard);
        }
        if guard.generation_number() != Some(number) {
            // Already relaunched by someone else, or never running again.
            return;
        }

        let previous = self.settle(guard, Lifecycle::Restarting);
        if let Lifecycle::Running(generation) = previous {
            warn!(
                target: SUPERVISOR_TARGET,
                plugin = self.plugin(),
                generation = number,
                "plugin channel broke"
            );
            lifecycle::discard(self.plugin(), generation);
        }
        // Failures are logged and leave the supervisor crashed for the next
        // caller to retry.
        drop(self.relaunch());
    }

    /// Crash monitor entry point, called from the reader thread of
    /// generation `number` once its channel stops.
    fn channel_closed(&self, number: u64, reason: &str) {
        let guard = self.lifecycle();
        if guard.state() != SupervisorState::Running || guard.generation_number() != Some(number) {
            return;
        }
        let previous = self.settle(
            guard,
            Lifecycle::Crashed {
                generation: number,
                reason: reason.to_owned(),
            },
        );
        if let Lifecycle::Running(generation) = previous {
            warn!(
                target: SUPERVISOR_TARGET,
                plugin = self.plugin(),
                pid = generation.child.id(),
                generation = number,
                reason,
                "plugin process went away"
            );
            lifecycle::discard(self.plugin(), generation);
        }
    }

    fn channel_broken(&self, reason: &str) -> SupervisorError {
        SupervisorError::ChannelBroken {
            plugin: self.plugin().to_owned(),
            reason: reason.to_owned(),
        }
    }

    fn forward(
        &self,
        number: u64,
        channel: &Channel,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, SupervisorError> {
        let outcome = match self.config.call_timeout() {
            Some(limit) => channel.invoke_timeout(method, params, limit),
            None => channel.invoke(method, params),
        };
        outcome.map_err(|err| {
            let mapped = SupervisorError::from_channel(self.plugin(), method, err);
            if mapped.is_channel_broken() {
                self.recover(number);
            }
            mapped
        })
    }
}

impl HookDispatch for Core {
    fn dispatch(&self, method: &str, params: Option<Value>) -> Result<Value, SupervisorError> {
        let (number, channel) = self.acquire_channel()?;
        self.forward(number, &channel, method, params)
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.core.abandon();
    }
}
