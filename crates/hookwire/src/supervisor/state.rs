//! Supervisor lifecycle states.

use std::fmt;
use std::process::Child;

use crate::channel::Channel;

/// Externally visible supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Path validated, nothing running.
    Created,
    /// Initial spawn and handshake in progress.
    Starting,
    /// Handshake complete; hooks are forwarded.
    Running,
    /// The process exited or its channel broke; the next hook call relaunches.
    Crashed,
    /// A replacement process is being launched.
    Restarting,
    /// Terminal; the process is gone.
    Stopped,
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Crashed => "crashed",
            Self::Restarting => "restarting",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// One launched plugin process and its channel.
pub(super) struct Generation {
    pub(super) number: u64,
    pub(super) child: Child,
    pub(super) channel: Channel,
}

/// Internal lifecycle carrying the resources owned in each state.
pub(super) enum Lifecycle {
    Created,
    Starting,
    Running(Generation),
    Crashed {
        /// Last generation launched or attempted.
        generation: u64,
        reason: String,
    },
    Restarting,
    Stopped,
}

impl Lifecycle {
    pub(super) const fn state(&self) -> SupervisorState {
        match self {
            Self::Created => SupervisorState::Created,
            Self::Starting => SupervisorState::Starting,
            Self::Running(_) => SupervisorState::Running,
            Self::Crashed { .. } => SupervisorState::Crashed,
            Self::Restarting => SupervisorState::Restarting,
            Self::Stopped => SupervisorState::Stopped,
        }
    }

    /// Returns the generation number the state refers to, if any.
    pub(super) const fn generation_number(&self) -> Option<u64> {
        match self {
            Self::Running(generation) => Some(generation.number),
            Self::Crashed { generation, .. } => Some(*generation),
            Self::Created | Self::Starting | Self::Restarting | Self::Stopped => None,
        }
    }

    pub(super) fn running_channel(&self) -> Option<(u64, Channel)> {
        match self {
            Self::Running(generation) => Some((generation.number, generation.channel.clone())),
            _ => None,
        }
    }

    pub(super) fn crash_reason(&self) -> Option<&str> {
        match self {
            Self::Crashed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Whether a start or relaunch is in flight.
    pub(super) const fn is_transitional(&self) -> bool {
        matches!(self, Self::Starting | Self::Restarting)
    }
}
