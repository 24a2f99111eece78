//! Timing configuration for plugin supervision.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default bound on spawn plus handshake for every launch attempt.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time a plugin gets to exit after a graceful shutdown request.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Converts a duration to whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Timing configuration for a [`Supervisor`](crate::Supervisor).
///
/// Values are stored as milliseconds so the struct deserialises from plain
/// configuration files.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use hookwire::SupervisorConfig;
///
/// let config = SupervisorConfig::default()
///     .with_startup_timeout(Duration::from_millis(500))
///     .with_call_timeout(Some(Duration::from_secs(1)));
///
/// assert_eq!(config.startup_timeout(), Duration::from_millis(500));
/// assert_eq!(config.shutdown_grace(), Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default = "default_startup_timeout_ms")]
    startup_timeout_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    shutdown_grace_ms: u64,
    #[serde(default)]
    call_timeout_ms: Option<u64>,
}

fn default_startup_timeout_ms() -> u64 {
    duration_millis(DEFAULT_STARTUP_TIMEOUT)
}

fn default_shutdown_grace_ms() -> u64 {
    duration_millis(DEFAULT_SHUTDOWN_GRACE)
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            startup_timeout_ms: default_startup_timeout_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            call_timeout_ms: None,
        }
    }
}

impl SupervisorConfig {
    /// Overrides the bound on each spawn plus handshake attempt.
    #[must_use]
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout_ms = duration_millis(timeout);
        self
    }

    /// Overrides the graceful shutdown window before a forced kill.
    #[must_use]
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = duration_millis(grace);
        self
    }

    /// Bounds individual hook calls; `None` waits for the plugin indefinitely.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout_ms = timeout.map(duration_millis);
        self
    }

    /// Returns the bound on each spawn plus handshake attempt.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    /// Returns the graceful shutdown window.
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// Returns the per-call bound, if any.
    #[must_use]
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_ms.map(Duration::from_millis)
    }
}
