//! Plugin process used by the hookwire end-to-end tests.
//!
//! Reads its mode from the `fixture-mode` file in the working directory,
//! which the supervisor sets to the bundle root.

use hookwire_e2e::FixtureError;

fn main() -> Result<(), FixtureError> {
    hookwire_e2e::fixture::run()
}
