//! Host API round trips between an [`ApiServer`] and an [`ApiClient`].

use std::os::unix::net::UnixStream;
use std::sync::Arc;

use rstest::{fixture, rstest};
use serde::Deserialize;
use serde_json::{Value, json};

use super::*;
use crate::channel::{Channel, IncomingHandler, RpcError};

struct NoHooks;

impl IncomingHandler for NoHooks {
    fn handle_request(
        &self,
        _channel: &Channel,
        method: &str,
        _params: Option<Value>,
    ) -> Result<Value, RpcError> {
        Err(RpcError::method_not_found(method))
    }
}

struct Connected {
    host_api: Arc<InMemoryHostApi>,
    client: ApiClient,
    _host: Channel,
}

fn connect(host_api: Option<Arc<dyn HostApi>>) -> (Channel, ApiClient) {
    let (host_end, plugin_end) = UnixStream::pair().expect("socket pair");
    let host = Channel::spawn(
        "host",
        host_end.try_clone().expect("clone"),
        host_end,
        Arc::new(ApiServer::new(host_api)),
        None,
    )
    .expect("spawn host channel");
    let plugin = Channel::spawn(
        "plugin",
        plugin_end.try_clone().expect("clone"),
        plugin_end,
        Arc::new(NoHooks),
        None,
    )
    .expect("spawn plugin channel");
    (host, ApiClient::new(plugin))
}

#[fixture]
fn connected() -> Connected {
    let host_api = Arc::new(InMemoryHostApi::with_configuration(
        json!({"greeting": "hello", "limit": 3}),
    ));
    let shared: Arc<dyn HostApi> = Arc::clone(&host_api) as Arc<dyn HostApi>;
    let (host, client) = connect(Some(shared));
    Connected {
        host_api,
        client,
        _host: host,
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct DemoConfig {
    greeting: String,
    limit: u32,
}

#[rstest]
fn configuration_loads_as_typed_value(connected: Connected) {
    let config: DemoConfig = connected
        .client
        .load_configuration()
        .expect("configuration loads");

    assert_eq!(
        config,
        DemoConfig {
            greeting: String::from("hello"),
            limit: 3,
        }
    );
}

#[rstest]
fn kv_round_trips_through_the_host(connected: Connected) {
    let client = &connected.client;

    assert_eq!(client.kv_get("counter").expect("get"), None);
    client.kv_set("counter", b"\x01\x02").expect("set");
    assert_eq!(
        client.kv_get("counter").expect("get"),
        Some(vec![1_u8, 2_u8])
    );
    assert_eq!(connected.host_api.kv_value("counter"), Some(vec![1_u8, 2_u8]));

    client.kv_delete("counter").expect("delete");
    assert_eq!(client.kv_get("counter").expect("get"), None);
}

#[rstest]
fn commands_register_and_unregister(connected: Connected) {
    let mut registration = CommandRegistration::new("echo");
    registration.description = String::from("Echo text back");
    connected
        .client
        .register_command(&registration)
        .expect("register");

    assert_eq!(connected.host_api.commands(), vec![registration]);

    connected
        .client
        .unregister_command("echo")
        .expect("unregister");
    assert!(connected.host_api.commands().is_empty());
}

#[rstest]
fn host_rejections_surface_as_host_errors(connected: Connected) {
    let error = connected
        .client
        .register_command(&CommandRegistration::new(""))
        .expect_err("empty trigger rejected");

    assert!(matches!(error, ApiError::Host { .. }), "got {error}");
}

#[rstest]
fn log_messages_reach_the_host(connected: Connected) {
    connected
        .client
        .log(LogLevel::Warn, "disk almost full")
        .expect("log");

    assert_eq!(
        connected.host_api.log_entries(),
        vec![(LogLevel::Warn, String::from("disk almost full"))]
    );
}

#[rstest]
fn missing_host_api_reports_unavailable() {
    let (_host, client) = connect(None);

    let error = client.kv_get("anything").expect_err("no host API");

    assert_eq!(error, ApiError::Unavailable);
}
