//! End-to-end test support for hookwire.
//!
//! The crate ships the `fixture-plugin` binary, a real plugin process whose
//! behaviour is selected by a mode file in its bundle directory, together
//! with the helpers tests use to stage bundles and inspect the processes the
//! supervisor launched.
//!
//! - [`fixture`]: the fixture plugin and its modes
//!
//! The integration tests under `tests/` drive the binary through
//! [`hookwire::Supervisor`] exactly as an embedding host would.

pub mod fixture;

pub use fixture::{FixtureError, FixtureMode, FixturePlugin, FixtureSettings};
