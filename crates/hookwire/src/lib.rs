//! Out-of-process plugin supervision.
//!
//! `hookwire` runs each plugin as an independent executable and talks to it
//! over a JSON-RPC call channel on the child's standard streams. The host
//! side revolves around [`Supervisor`], which validates the bundle, launches
//! the process with a bounded handshake, exposes the plugin's hooks through a
//! [`HookProxy`], relaunches the plugin after a crash and shuts it down.
//! The plugin side is the [`plugin`] runtime, which a plugin executable's
//! `main` hands its [`Plugin`] implementation to.
//!
//! # Architecture
//!
//! Control flows from the supervisor through the spawned process's
//! [`Channel`] to the hook proxy and its callers. Failure flows the other way:
//! a process exit breaks the channel, the channel's reader thread reports it,
//! and the next hook call drives the relaunch. The [`HostApi`] supplied to
//! [`Supervisor::start`] is served to every process generation, so a plugin
//! relaunched after a crash sees the same host capabilities.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use hookwire::{BundleDescriptor, CommandArgs, Hooks, InMemoryHostApi, Supervisor};
//!
//! let bundle = BundleDescriptor::new("echo", "/opt/plugins/echo", "bin/echo-plugin");
//! let supervisor = Supervisor::new(&bundle)?;
//! supervisor.start(Some(Arc::new(InMemoryHostApi::default())))?;
//!
//! let response = supervisor.hooks().execute_command(&CommandArgs::new("/echo hi"))?;
//! println!("{}", response.text);
//!
//! supervisor.stop()?;
//! # Ok::<(), hookwire::SupervisorError>(())
//! ```

pub mod api;
pub mod bundle;
pub mod channel;
pub mod config;
pub mod error;
pub mod hooks;
pub mod plugin;
pub mod protocol;
pub mod supervisor;

pub use self::api::{ApiClient, ApiError, CommandRegistration, HostApi, InMemoryHostApi, LogLevel};
pub use self::bundle::{BundleDescriptor, ResolvedBundle};
pub use self::channel::{Channel, ChannelError};
pub use self::config::SupervisorConfig;
pub use self::error::SupervisorError;
pub use self::hooks::{
    CommandArgs, CommandResponse, HookDispatch, HookError, HookProxy, Hooks, Post, PostVerdict,
};
pub use self::plugin::{Plugin, PluginRuntimeError};
pub use self::supervisor::{Supervisor, SupervisorState};
