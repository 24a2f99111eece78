//! Channel tests over in-process socket pairs.

use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rstest::{fixture, rstest};
use serde_json::{Value, json};

use super::*;

struct EchoHandler;

impl IncomingHandler for EchoHandler {
    fn handle_request(
        &self,
        channel: &Channel,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, RpcError> {
        match method {
            "echo" => Ok(params.unwrap_or(Value::Null)),
            "fail" => Err(RpcError::application("boom")),
            "sleep" => {
                thread::sleep(Duration::from_millis(300));
                Ok(Value::Null)
            }
            "callback" => channel
                .invoke("echo", params)
                .map_err(|err| RpcError::internal(err.to_string())),
            other => Err(RpcError::method_not_found(other)),
        }
    }
}

#[derive(Default)]
struct RecordingHandler {
    notifications: Mutex<Vec<String>>,
}

impl IncomingHandler for RecordingHandler {
    fn handle_request(
        &self,
        _channel: &Channel,
        method: &str,
        _params: Option<Value>,
    ) -> Result<Value, RpcError> {
        Err(RpcError::method_not_found(method))
    }

    fn handle_notification(&self, _channel: &Channel, method: &str, _params: Option<Value>) {
        self.notifications
            .lock()
            .expect("notifications lock")
            .push(method.to_owned());
    }
}

fn spawn_over(
    stream: UnixStream,
    label: &str,
    handler: Arc<dyn IncomingHandler>,
    on_closed: Option<ClosedCallback>,
) -> Channel {
    let reader = stream.try_clone().expect("clone stream");
    Channel::spawn(label, reader, stream, handler, on_closed).expect("spawn channel")
}

struct Peers {
    host: Channel,
    plugin: Channel,
}

#[fixture]
fn peers() -> Peers {
    let (left, right) = UnixStream::pair().expect("socket pair");
    Peers {
        host: spawn_over(left, "host", Arc::new(EchoHandler), None),
        plugin: spawn_over(right, "plugin", Arc::new(EchoHandler), None),
    }
}

#[rstest]
fn invoke_returns_peer_result(peers: Peers) {
    let result = peers
        .host
        .invoke("echo", Some(json!({"value": 42})))
        .expect("echo succeeds");

    assert_eq!(result, json!({"value": 42}));
}

#[rstest]
fn typed_request_decodes_result(peers: Peers) {
    let result: Vec<u32> = peers
        .plugin
        .request("echo", &vec![1, 2, 3])
        .expect("echo succeeds");

    assert_eq!(result, vec![1, 2, 3]);
}

#[rstest]
fn application_error_is_remote_not_broken(peers: Peers) {
    let error = peers.host.invoke("fail", None).expect_err("should fail");

    assert!(!error.is_broken());
    match error {
        ChannelError::Remote { code, message, .. } => {
            assert_eq!(code, codes::APPLICATION_ERROR);
            assert_eq!(message, "boom");
        }
        other => panic!("expected remote error, got {other}"),
    }
}

#[rstest]
fn unknown_method_reports_method_not_found(peers: Peers) {
    let error = peers.host.invoke("missing", None).expect_err("should fail");

    assert!(matches!(
        error,
        ChannelError::Remote {
            code: codes::METHOD_NOT_FOUND,
            ..
        }
    ));
}

#[rstest]
fn concurrent_invokes_get_their_own_results(peers: Peers) {
    let handles: Vec<_> = (0..16)
        .map(|index| {
            let channel = peers.host.clone();
            thread::spawn(move || {
                let result = channel
                    .invoke("echo", Some(json!(index)))
                    .expect("echo succeeds");
                (index, result)
            })
        })
        .collect();

    for handle in handles {
        let (index, result) = handle.join().expect("caller thread");
        assert_eq!(result, json!(index));
    }
}

#[rstest]
fn handler_may_call_back_over_the_same_channel(peers: Peers) {
    let result = peers
        .host
        .invoke("callback", Some(json!("round trip")))
        .expect("nested call succeeds");

    assert_eq!(result, json!("round trip"));
}

#[rstest]
fn invoke_timeout_expires_and_channel_stays_usable(peers: Peers) {
    let error = peers
        .host
        .invoke_timeout("sleep", None, Duration::from_millis(50))
        .expect_err("should time out");

    assert!(matches!(error, ChannelError::Timeout { timeout_ms: 50, .. }));
    let result = peers
        .host
        .invoke("echo", Some(json!("still alive")))
        .expect("echo after timeout");
    assert_eq!(result, json!("still alive"));
}

#[rstest]
fn notifications_reach_the_handler() {
    let (left, right) = UnixStream::pair().expect("socket pair");
    let recorder = Arc::new(RecordingHandler::default());
    let host = spawn_over(left, "host", Arc::new(EchoHandler), None);
    let handler: Arc<dyn IncomingHandler> = Arc::clone(&recorder) as Arc<dyn IncomingHandler>;
    let _plugin = spawn_over(right, "plugin", handler, None);

    host.notify("plugin.shutdown", None).expect("notify");

    let mut seen = Vec::new();
    for _ in 0..100 {
        seen = recorder.notifications.lock().expect("lock").clone();
        if !seen.is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(seen, vec![String::from("plugin.shutdown")]);
}

#[rstest]
fn peer_exit_breaks_pending_and_later_calls() {
    let (left, right) = UnixStream::pair().expect("socket pair");
    let (closed_tx, closed_rx) = mpsc::channel();
    let on_closed: ClosedCallback = Box::new(move |reason: &str| {
        closed_tx.send(reason.to_owned()).expect("report close");
    });
    let host = spawn_over(left, "host", Arc::new(EchoHandler), Some(on_closed));

    // The peer reads one request and disappears without answering.
    let peer = thread::spawn(move || {
        FrameReader::new(&right)
            .receive()
            .expect("request frame");
        drop(right);
    });

    let error = host.invoke("echo", None).expect_err("peer vanished");
    peer.join().expect("peer thread");

    assert!(error.is_broken(), "expected broken channel, got {error}");
    let reason = closed_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("close callback fired");
    assert!(reason.contains("closed"), "unexpected reason: {reason}");
    assert!(host.is_closed());
    assert!(host.invoke("echo", None).expect_err("still broken").is_broken());
}

#[rstest]
fn undecodable_frames_are_skipped() {
    let (left, right) = UnixStream::pair().expect("socket pair");
    let host = spawn_over(left, "host", Arc::new(EchoHandler), None);

    let writer_stream = right.try_clone().expect("clone");
    let mut raw = FrameWriter::new(writer_stream);
    raw.send(b"this is not json").expect("send garbage");

    let mut reader = FrameReader::new(&right);
    let frame = reader.receive().expect("parse error response");
    let Message::Response(response) = Message::from_bytes(&frame).expect("decode") else {
        panic!("expected a response");
    };
    assert_eq!(response.id, None);
    assert_eq!(
        response.error.map(|error| error.code),
        Some(codes::PARSE_ERROR)
    );
    assert!(!host.is_closed());
}

#[rstest]
#[case::string_id(r#"{"jsonrpc":"2.0","id":"ID","result":5}"#)]
#[case::bad_error_object(r#"{"jsonrpc":"2.0","id":ID,"error":"oops"}"#)]
fn malformed_response_fails_its_caller(#[case] template: &'static str) {
    let (left, right) = UnixStream::pair().expect("socket pair");
    let host = spawn_over(left, "host", Arc::new(EchoHandler), None);

    let peer = thread::spawn(move || {
        let frame = FrameReader::new(&right).receive().expect("request frame");
        let Message::Request(request) = Message::from_bytes(&frame).expect("decode") else {
            panic!("expected a request");
        };
        let reply = template.replace("ID", &request.id.to_string());
        let mut raw = FrameWriter::new(right.try_clone().expect("clone"));
        raw.send(reply.as_bytes()).expect("send reply");
        right
    });

    let error = host
        .invoke_timeout("echo", None, Duration::from_secs(5))
        .expect_err("reply is malformed");
    let _right = peer.join().expect("peer thread");

    assert!(
        matches!(error, ChannelError::Remote { code: codes::PARSE_ERROR, .. }),
        "unexpected error: {error}"
    );
    assert!(!host.is_closed());
}
