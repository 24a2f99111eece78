//! Behaviour-driven tests for plugin supervision.
#![cfg(unix)]

mod support;

use std::sync::Arc;
use std::time::Duration;

use hookwire::{
    BundleDescriptor, Hooks, InMemoryHostApi, Supervisor, SupervisorConfig, SupervisorError,
};
use hookwire_e2e::{FixtureMode, FixtureSettings};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use support::{StagedBundle, activations, host_api, poll_until, test_config};

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    bundle: Option<StagedBundle>,
    config: SupervisorConfig,
    settings: FixtureSettings,
    api: Option<Arc<InMemoryHostApi>>,
    supervisor: Option<Supervisor>,
    construction_error: Option<SupervisorError>,
    start_error: Option<SupervisorError>,
    call_error: Option<SupervisorError>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self {
            bundle: None,
            config: test_config(),
            settings: FixtureSettings::default(),
            api: None,
            supervisor: None,
            construction_error: None,
            start_error: None,
            call_error: None,
        }
    }
}

impl Drop for TestWorld {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            drop(supervisor.stop());
        }
    }
}

#[fixture]
fn world() -> TestWorld {
    TestWorld::default()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn bundle(world: &TestWorld) -> &StagedBundle {
    world.bundle.as_ref().expect("no bundle staged")
}

fn supervisor(world: &TestWorld) -> &Supervisor {
    world.supervisor.as_ref().expect("no supervisor created")
}

fn create(world: &mut TestWorld, descriptor: &BundleDescriptor) {
    match Supervisor::with_config(descriptor, world.config) {
        Ok(created) => world.supervisor = Some(created),
        Err(error) => world.construction_error = Some(error),
    }
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a fixture bundle in {mode} mode")]
fn given_bundle(world: &mut TestWorld, mode: String) {
    let mode: FixtureMode = mode.trim_matches('"').parse().expect("known fixture mode");
    world.bundle = Some(StagedBundle::new(mode));
}

#[given("a startup timeout of {millis} milliseconds")]
fn given_startup_timeout(world: &mut TestWorld, millis: u64) {
    world.config = world
        .config
        .with_startup_timeout(Duration::from_millis(millis));
}

#[given("the plugin exits on its first deactivation")]
fn given_crash_once(world: &mut TestWorld) {
    world.settings.exit_on_first_deactivate = true;
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("a supervisor is created for executable {executable}")]
fn when_created_for(world: &mut TestWorld, executable: String) {
    let descriptor = bundle(world).descriptor_for(executable.trim_matches('"'));
    create(world, &descriptor);
}

#[when("the supervisor is started")]
fn when_started(world: &mut TestWorld) {
    if world.supervisor.is_none() {
        let descriptor = bundle(world).descriptor().clone();
        create(world, &descriptor);
    }
    let api = host_api(&world.settings);
    world.api = Some(Arc::clone(&api));
    if let Err(error) = supervisor(world).start(Some(api)) {
        world.start_error = Some(error);
    }
}

#[when("the supervisor is stopped")]
fn when_stopped(world: &mut TestWorld) {
    supervisor(world).stop().expect("stop succeeds");
}

#[when("the deactivate hook is called")]
fn when_deactivate(world: &mut TestWorld) {
    world.call_error = supervisor(world).hooks().on_deactivate().err();
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("construction fails with an invalid executable path")]
fn then_invalid_path(world: &mut TestWorld) {
    let error = world
        .construction_error
        .as_ref()
        .expect("construction should have failed");
    assert!(
        matches!(error, SupervisorError::InvalidExecutablePath { .. }),
        "unexpected error: {error}"
    );
    assert!(world.supervisor.is_none());
}

#[then("no plugin process was spawned")]
fn then_nothing_spawned(world: &mut TestWorld) {
    assert!(bundle(world).pids().is_empty());
}

#[then("the start fails with a startup timeout")]
fn then_start_timeout(world: &mut TestWorld) {
    let error = world.start_error.as_ref().expect("start should have failed");
    assert!(
        matches!(error, SupervisorError::StartTimeout { .. }),
        "unexpected error: {error}"
    );
}

#[then("no plugin process is left running")]
fn then_no_live_process(world: &mut TestWorld) {
    let live = bundle(world).live_pids();
    assert!(live.is_empty(), "live plugin processes: {live:?}");
}

#[then("the supervisor is {state}")]
fn then_state(world: &mut TestWorld, state: String) {
    assert_eq!(
        supervisor(world).state().to_string(),
        state.trim_matches('"')
    );
}

#[then("the call fails with a broken channel")]
fn then_call_broken(world: &mut TestWorld) {
    let error = world.call_error.as_ref().expect("call should have failed");
    assert!(error.is_channel_broken(), "unexpected error: {error}");
}

#[then("the deactivate hook recovers within {seconds} seconds")]
fn then_recovers(world: &mut TestWorld, seconds: u64) {
    let hooks = supervisor(world).hooks();
    let recovered = poll_until(Duration::from_secs(seconds), || hooks.on_deactivate().ok());
    assert!(recovered.is_some(), "hook surface never recovered");
}

#[then("the plugin has been activated {count} times")]
fn then_activations(world: &mut TestWorld, count: u64) {
    let api = world.api.as_ref().expect("no host API injected");
    assert_eq!(activations(api), count);
}

#[then("the supervisor has restarted {count} time")]
fn then_restarts(world: &mut TestWorld, count: u64) {
    assert_eq!(supervisor(world).restarts(), count);
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(
    path = "tests/features/plugin_supervision.feature",
    name = "An escaping executable path is rejected"
)]
fn escaping_path_rejected(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_supervision.feature",
    name = "A plugin that never completes the handshake times out"
)]
fn handshake_timeout(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_supervision.feature",
    name = "A healthy plugin starts and stops"
)]
fn start_and_stop(world: TestWorld) {
    drop(world);
}

#[scenario(
    path = "tests/features/plugin_supervision.feature",
    name = "A crashed plugin is relaunched by later calls"
)]
fn crash_recovery(world: TestWorld) {
    drop(world);
}
