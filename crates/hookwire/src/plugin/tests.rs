//! Plugin runtime tests driven by an in-process host channel.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::api::{ApiServer, CommandRegistration, HostApi, InMemoryHostApi};
use crate::channel::{ChannelError, codes};

#[derive(Default)]
struct EchoPlugin {
    api: Mutex<Option<ApiClient>>,
}

impl Plugin for EchoPlugin {
    fn on_activate(&self, api: &ApiClient) -> Result<(), HookError> {
        api.register_command(&CommandRegistration::new("echo"))
            .map_err(|err| HookError::new(err.to_string()))?;
        *self.api.lock().expect("api lock") = Some(api.clone());
        Ok(())
    }

    fn execute_command(&self, args: &CommandArgs) -> Result<CommandResponse, HookError> {
        if args.trigger() != "echo" {
            return Err(HookError::new("unknown command"));
        }
        let text = args
            .command
            .split_once(' ')
            .map(|(_, rest)| rest)
            .unwrap_or_default();
        Ok(CommandResponse::text(text))
    }

    fn message_will_be_posted(&self, post: &Post) -> Result<PostVerdict, HookError> {
        if post.message.contains("spam") {
            Ok(PostVerdict::Reject {
                reason: String::from("no spam"),
            })
        } else {
            Ok(PostVerdict::Allow)
        }
    }
}

struct DefaultPlugin;

impl Plugin for DefaultPlugin {}

struct Session {
    host: Channel,
    host_stream: UnixStream,
    host_api: Arc<InMemoryHostApi>,
    runtime: JoinHandle<Result<(), PluginRuntimeError>>,
}

fn start_session<P: Plugin>(plugin: P) -> Session {
    let (host_end, plugin_end) = UnixStream::pair().expect("socket pair");
    let host_api = Arc::new(InMemoryHostApi::default());
    let shared: Arc<dyn HostApi> = Arc::clone(&host_api) as Arc<dyn HostApi>;
    let host_stream = host_end.try_clone().expect("clone");
    let host = Channel::spawn(
        "host",
        host_end.try_clone().expect("clone"),
        host_end,
        Arc::new(ApiServer::new(Some(shared))),
        None,
    )
    .expect("spawn host channel");
    let reader = plugin_end.try_clone().expect("clone");
    let runtime = thread::spawn(move || serve_io(plugin, reader, plugin_end));
    Session {
        host,
        host_stream,
        host_api,
        runtime,
    }
}

fn activate(session: &Session) -> Result<Value, ChannelError> {
    session
        .host
        .invoke(protocol::ACTIVATE, Some(json!({"plugin_id": "echo"})))
}

#[fixture]
fn echo_session() -> Session {
    let session = start_session(EchoPlugin::default());
    activate(&session).expect("activation succeeds");
    session
}

#[rstest]
fn activation_may_call_the_host_api(echo_session: Session) {
    assert_eq!(
        echo_session.host_api.commands(),
        vec![CommandRegistration::new("echo")]
    );
}

#[rstest]
fn execute_command_round_trips(echo_session: Session) {
    let result = echo_session
        .host
        .invoke(
            protocol::EXECUTE_COMMAND,
            Some(json!({"command": "/echo hi there"})),
        )
        .expect("command succeeds");

    assert_eq!(result, json!({"text": "hi there", "ephemeral": false}));
}

#[rstest]
fn hook_errors_become_application_errors(echo_session: Session) {
    let error = echo_session
        .host
        .invoke(protocol::EXECUTE_COMMAND, Some(json!({"command": "/other"})))
        .expect_err("unknown command");

    assert!(matches!(
        error,
        ChannelError::Remote {
            code: codes::APPLICATION_ERROR,
            ..
        }
    ));
}

#[rstest]
fn post_verdicts_are_encoded(echo_session: Session) {
    let result = echo_session
        .host
        .invoke(
            protocol::MESSAGE_WILL_BE_POSTED,
            Some(json!({"message": "buy spam"})),
        )
        .expect("hook succeeds");

    assert_eq!(result, json!({"verdict": "reject", "reason": "no spam"}));
}

#[rstest]
fn defaults_allow_posts_and_reject_commands() {
    let session = start_session(DefaultPlugin);
    activate(&session).expect("activation succeeds");

    let verdict = session
        .host
        .invoke(
            protocol::MESSAGE_WILL_BE_POSTED,
            Some(json!({"message": "anything"})),
        )
        .expect("hook succeeds");
    assert_eq!(verdict, json!({"verdict": "allow"}));

    let error = session
        .host
        .invoke(protocol::EXECUTE_COMMAND, Some(json!({"command": "/x"})))
        .expect_err("commands not implemented");
    assert!(error.to_string().contains("command not implemented: x"));
}

#[rstest]
fn unknown_hook_is_method_not_found(echo_session: Session) {
    let error = echo_session
        .host
        .invoke("plugin.unknown", None)
        .expect_err("unknown hook");

    assert!(matches!(
        error,
        ChannelError::Remote {
            code: codes::METHOD_NOT_FOUND,
            ..
        }
    ));
}

#[rstest]
fn shutdown_notification_stops_the_runtime(echo_session: Session) {
    echo_session
        .host
        .notify(protocol::SHUTDOWN, None)
        .expect("notify");

    echo_session
        .runtime
        .join()
        .expect("runtime thread")
        .expect("runtime exits cleanly");
}

#[rstest]
fn host_disconnect_stops_the_runtime(echo_session: Session) {
    echo_session
        .host_stream
        .shutdown(Shutdown::Both)
        .expect("shutdown socket");

    echo_session
        .runtime
        .join()
        .expect("runtime thread")
        .expect("runtime exits cleanly");
}
