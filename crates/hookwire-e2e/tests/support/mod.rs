//! Helpers for staging fixture bundles and inspecting their processes.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use hookwire::{BundleDescriptor, InMemoryHostApi, SupervisorConfig};
use hookwire_e2e::fixture::{self, FixtureMode, FixtureSettings};
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tempfile::TempDir;

/// Plugin identifier used for every staged bundle.
pub const PLUGIN_ID: &str = "fixture";

/// Executable path relative to the bundle root.
pub const EXECUTABLE: &str = "bin/fixture-plugin";

/// A temporary bundle directory holding the fixture binary.
pub struct StagedBundle {
    dir: TempDir,
    descriptor: BundleDescriptor,
}

impl StagedBundle {
    /// Stages the fixture binary under a fresh bundle root with `mode`.
    pub fn new(mode: FixtureMode) -> Self {
        let dir = tempfile::Builder::new()
            .prefix("hookwire-bundle-")
            .tempdir_in(env!("CARGO_TARGET_TMPDIR"))
            .expect("bundle tempdir");
        let bin_dir = dir.path().join("bin");
        fs::create_dir_all(&bin_dir).expect("bundle bin dir");

        // A hard link keeps the binary inside the root without a write
        // handle that could make exec fail with ETXTBSY.
        let source = Path::new(env!("CARGO_BIN_EXE_fixture-plugin"));
        let target = dir.path().join(EXECUTABLE);
        if fs::hard_link(source, &target).is_err() {
            fs::copy(source, &target).expect("copy fixture binary");
        }
        mode.write_to(dir.path()).expect("write fixture mode");

        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
        let descriptor = BundleDescriptor::new(PLUGIN_ID, root, EXECUTABLE);
        Self { dir, descriptor }
    }

    /// Returns the descriptor naming the staged executable.
    pub fn descriptor(&self) -> &BundleDescriptor {
        &self.descriptor
    }

    /// Returns a descriptor for the same root with another executable path.
    pub fn descriptor_for(&self, executable: &str) -> BundleDescriptor {
        BundleDescriptor::new(PLUGIN_ID, self.descriptor.root_dir.clone(), executable)
    }

    /// Rewrites the mode file; later launches pick up the new mode.
    pub fn set_mode(&self, mode: FixtureMode) {
        mode.write_to(self.dir.path()).expect("rewrite fixture mode");
    }

    /// Returns every PID the fixture recorded in this bundle, oldest first.
    pub fn pids(&self) -> Vec<i32> {
        fixture::recorded_pids(self.dir.path()).expect("read fixture pids")
    }

    /// Returns the recorded PIDs that still name a live process.
    pub fn live_pids(&self) -> Vec<i32> {
        self.pids().into_iter().filter(|pid| is_alive(*pid)).collect()
    }
}

/// Reports whether `pid` names a process that can still be signalled.
pub fn is_alive(pid: i32) -> bool {
    kill(Pid::from_raw(pid), None).is_ok()
}

/// Timing suited to tests: quick shutdown, bounded startup.
pub fn test_config() -> SupervisorConfig {
    SupervisorConfig::default()
        .with_startup_timeout(Duration::from_secs(10))
        .with_shutdown_grace(Duration::from_millis(500))
}

/// Builds a host API serving `settings` as the plugin configuration.
pub fn host_api(settings: &FixtureSettings) -> Arc<InMemoryHostApi> {
    let configuration = serde_json::to_value(settings).expect("encode settings");
    Arc::new(InMemoryHostApi::with_configuration(configuration))
}

/// Reads the activation counter the fixture keeps in the host KV store.
pub fn activations(api: &InMemoryHostApi) -> u64 {
    api.kv_value(fixture::ACTIVATIONS_KEY)
        .map(|bytes| {
            String::from_utf8(bytes)
                .expect("utf-8 counter")
                .parse()
                .expect("numeric counter")
        })
        .unwrap_or(0)
}

/// Calls `attempt` every 100 ms until it returns `Some` or `window` passes.
pub fn poll_until<T>(window: Duration, mut attempt: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + window;
    loop {
        if let Some(value) = attempt() {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(100));
    }
}
