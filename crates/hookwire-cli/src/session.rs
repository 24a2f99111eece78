//! The `check` and `run` actions.

use std::io::Write;
use std::sync::Arc;

use camino::Utf8Path;
use hookwire::{
    CommandArgs, HookProxy, Hooks, HostApi, InMemoryHostApi, Post, Supervisor, SupervisorError,
};
use serde_json::{Value, json};
use tracing::info;

use crate::cli::{BundleArgs, HookName, RunArgs};
use crate::{CLI_TARGET, CliError};

pub(crate) fn check(bundle: &BundleArgs, stdout: &mut dyn Write) -> Result<(), CliError> {
    let resolved = hookwire::bundle::resolve(&bundle.descriptor())?;
    write_line(
        stdout,
        &json!({
            "plugin": resolved.id(),
            "root": resolved.root_dir().as_str(),
            "executable": resolved.executable().as_str(),
        }),
    )
}

pub(crate) fn run(args: &RunArgs, stdout: &mut dyn Write) -> Result<(), CliError> {
    let configuration = load_configuration(args.config.as_deref())?;
    let host_api = Arc::new(InMemoryHostApi::with_configuration(configuration));
    let supervisor = Supervisor::with_config(&args.bundle.descriptor(), args.supervisor_config())?;

    let shared: Arc<dyn HostApi> = Arc::clone(&host_api) as Arc<dyn HostApi>;
    supervisor.start(Some(shared))?;
    info!(
        target: CLI_TARGET,
        plugin = supervisor.bundle().id(),
        pid = supervisor.pid(),
        "plugin running"
    );

    let outcome = drive(&supervisor, &host_api, args, stdout);
    // Always stop, even after a failed session.
    let stopped = supervisor.stop();
    let failed = outcome?;
    stopped?;

    if failed > 0 {
        return Err(CliError::HooksFailed {
            failed,
            total: args.hooks.len(),
        });
    }
    Ok(())
}

fn drive(
    supervisor: &Supervisor,
    host_api: &InMemoryHostApi,
    args: &RunArgs,
    stdout: &mut dyn Write,
) -> Result<usize, CliError> {
    let hooks = supervisor.hooks();
    let mut failed = 0;
    for hook in &args.hooks {
        let line = match invoke(&hooks, *hook, args) {
            Ok(result) => json!({"hook": hook_label(*hook), "status": "ok", "result": result}),
            Err(err) => {
                failed += 1;
                json!({"hook": hook_label(*hook), "status": "error", "error": err.to_string()})
            }
        };
        write_line(stdout, &line)?;
    }

    if args.until_signal {
        wait_for_signal()?;
    }

    let commands: Vec<String> = host_api
        .commands()
        .into_iter()
        .map(|command| command.trigger)
        .collect();
    write_line(
        stdout,
        &json!({
            "plugin": supervisor.bundle().id(),
            "restarts": supervisor.restarts(),
            "commands": commands,
        }),
    )?;
    Ok(failed)
}

fn invoke(hooks: &HookProxy, hook: HookName, args: &RunArgs) -> Result<Value, SupervisorError> {
    match hook {
        HookName::Deactivate => hooks.on_deactivate().map(|()| Value::Null),
        HookName::ConfigurationChange => hooks.on_configuration_change().map(|()| Value::Null),
        HookName::ExecuteCommand => {
            let response = hooks.execute_command(&CommandArgs::new(args.command.clone()))?;
            Ok(json!(response))
        }
        HookName::MessageWillBePosted => {
            let post = Post {
                message: args.message.clone(),
                ..Post::default()
            };
            let verdict = hooks.message_will_be_posted(&post)?;
            Ok(json!(verdict))
        }
    }
}

const fn hook_label(hook: HookName) -> &'static str {
    match hook {
        HookName::Deactivate => "deactivate",
        HookName::ConfigurationChange => "configuration-change",
        HookName::ExecuteCommand => "execute-command",
        HookName::MessageWillBePosted => "message-will-be-posted",
    }
}

fn load_configuration(path: Option<&Utf8Path>) -> Result<Value, CliError> {
    let Some(file) = path else {
        return Ok(Value::Null);
    };
    let text = std::fs::read_to_string(file).map_err(|source| CliError::ReadConfig {
        path: file.to_string(),
        source: Arc::new(source),
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::ParseConfig {
        path: file.to_string(),
        source,
    })
}

fn write_line(stdout: &mut dyn Write, value: &Value) -> Result<(), CliError> {
    writeln!(stdout, "{value}").map_err(|err| CliError::Output(Arc::new(err)))
}

#[cfg(unix)]
fn wait_for_signal() -> Result<(), CliError> {
    use signal_hook::consts::signal::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).map_err(|err| CliError::Signal(Arc::new(err)))?;
    info!(target: CLI_TARGET, "waiting for SIGINT or SIGTERM");
    if let Some(signal) = signals.forever().next() {
        info!(target: CLI_TARGET, signal, "shutdown signal received");
    }
    Ok(())
}

#[cfg(not(unix))]
fn wait_for_signal() -> Result<(), CliError> {
    tracing::warn!(
        target: CLI_TARGET,
        "waiting for signals is only supported on unix; stopping immediately"
    );
    Ok(())
}
