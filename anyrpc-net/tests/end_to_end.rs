//! Exercises the six literal end-to-end scenarios over real loopback
//! sockets: a `ServerSt` bound to an ephemeral port, driven from a
//! background thread, talked to through `Client`.

use anyrpc::registry::MethodRegistry;
use anyrpc::value::Value;
use anyrpc_net::client::Client;
use anyrpc_net::config::ServerConfig;
use anyrpc_net::connection::{default_handlers, HttpConnection, PollableConnection};
use anyrpc_net::netstring::{self, FrameState};
use anyrpc_net::server::ServerSt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn add(params: &Value, result: &mut Value) -> anyrpc::error::Result<()> {
    let items = params.as_array()?;
    let a = items.first().map(|v| v.as_f64()).transpose()?.unwrap_or(0.0);
    let b = items.get(1).map(|v| v.as_f64()).transpose()?.unwrap_or(0.0);
    *result = Value::from(a + b);
    Ok(())
}

fn multiply(params: &Value, result: &mut Value) -> anyrpc::error::Result<()> {
    let items = params.as_array()?;
    let a = items.first().map(|v| v.as_f64()).transpose()?.unwrap_or(0.0);
    let b = items.get(1).map(|v| v.as_f64()).transpose()?.unwrap_or(0.0);
    *result = Value::from(a * b);
    Ok(())
}

/// Spawns an HTTP `ServerSt` with the `add`/`multiply` methods registered
/// on a fresh ephemeral port, running on its own thread until dropped.
struct TestServer {
    port: u16,
    exit: Arc<std::sync::atomic::AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TestServer {
    fn start() -> Self {
        let registry = Arc::new(MethodRegistry::new());
        registry.add_function("add", "adds two numbers", add).unwrap();
        registry.add_function("multiply", "multiplies two numbers", multiply).unwrap();

        let port = free_port();
        let mut config = ServerConfig::default();
        config.port = port;

        let factory = Arc::new(|stream| {
            Box::new(HttpConnection::new(stream, default_handlers())) as Box<dyn PollableConnection>
        });

        let mut server = ServerSt::bind(config, registry, factory).expect("bind test server");
        let exit = server.exit_handle();
        let handle = thread::spawn(move || {
            loop {
                server.work(Some(Duration::from_millis(50)));
                if exit.load(std::sync::atomic::Ordering::Relaxed) {
                    return;
                }
            }
        });
        // give the listener a moment to come up before the first connect
        thread::sleep(Duration::from_millis(50));
        TestServer { port, exit: Arc::new(std::sync::atomic::AtomicBool::new(false)), handle: Some(handle) }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.exit.store(true, std::sync::atomic::Ordering::Relaxed);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

#[test]
fn json_add_over_http() {
    let server = TestServer::start();
    let mut client = Client::http_json("127.0.0.1", server.port);

    let mut params = Value::array();
    params.push(Value::from(5i32)).unwrap();
    params.push(Value::from(6i32)).unwrap();
    let mut result = Value::Null;

    assert!(client.call("add", &params, &mut result));
    assert_eq!(result.as_f64().unwrap(), 11.0);
}

#[test]
fn json_unknown_method_over_http() {
    let server = TestServer::start();
    let mut client = Client::http_json("127.0.0.1", server.port);

    let mut params = Value::array();
    params.push(Value::from(5i32)).unwrap();
    params.push(Value::from(6i32)).unwrap();
    let mut result = Value::Null;

    assert!(!client.call("divide", &params, &mut result));
    let code = result.get("code").and_then(|v| v.as_i32().ok());
    assert_eq!(code, Some(-32601));
}

#[test]
fn xmlrpc_multicall_over_http() {
    let server = TestServer::start();
    let mut client = Client::http_xmlrpc("127.0.0.1", server.port);

    let mut good_call = Value::map();
    good_call.insert("methodName", Value::from("add")).unwrap();
    let mut good_params = Value::array();
    good_params.push(Value::from(1i32)).unwrap();
    good_params.push(Value::from(2i32)).unwrap();
    good_call.insert("params", good_params).unwrap();

    let mut bad_call = Value::map();
    bad_call.insert("methodName", Value::from("nope")).unwrap();
    bad_call.insert("params", Value::array()).unwrap();

    let mut calls = Value::array();
    calls.push(good_call).unwrap();
    calls.push(bad_call).unwrap();

    let mut outer = Value::array();
    outer.push(calls).unwrap();

    let mut result = Value::Null;
    assert!(client.call("system.multicall", &outer, &mut result));

    let results = result.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_array().unwrap()[0].as_f64().unwrap(), 3.0);
    let fault_code = results[1].get("faultCode").and_then(|v| v.as_i32().ok());
    assert_eq!(fault_code, Some(-32601));
}

#[test]
fn messagepack_notification_over_http() {
    let server = TestServer::start();
    let mut client = Client::http_msgpack("127.0.0.1", server.port);

    let mut params = Value::array();
    params.push(Value::from(10i32)).unwrap();
    params.push(Value::from(12i32)).unwrap();
    let mut result = Value::Null;

    assert!(client.notify("multiply", &params, &mut result));
}

#[test]
fn netstring_framing_splits_two_back_to_back_messages() {
    let buffer = b"14:{\"a\":1},14:{\"a\":2},";

    match netstring::parse_header(buffer, false) {
        FrameState::Complete { body_start, length } => {
            assert_eq!(&buffer[body_start..body_start + length], b"{\"a\":1}");
            let tail = &buffer[body_start + length + 1..];
            match netstring::parse_header(tail, true) {
                FrameState::Complete { body_start: bs2, length: l2 } => {
                    assert_eq!(&tail[bs2..bs2 + l2], b"{\"a\":2}");
                    assert_eq!(&tail[bs2 + l2 + 1..], b"");
                }
                other => panic!("expected second frame to complete, got {other:?}"),
            }
        }
        other => panic!("expected first frame to complete, got {other:?}"),
    }
}

#[test]
fn http_keep_alive_survives_two_pipelined_calls() {
    let server = TestServer::start();
    let mut client = Client::http_json("127.0.0.1", server.port);

    let mut params = Value::array();
    params.push(Value::from(1i32)).unwrap();
    params.push(Value::from(2i32)).unwrap();
    let mut result = Value::Null;
    assert!(client.call("add", &params, &mut result));
    assert_eq!(result.as_f64().unwrap(), 3.0);

    let mut params2 = Value::array();
    params2.push(Value::from(4i32)).unwrap();
    params2.push(Value::from(5i32)).unwrap();
    let mut result2 = Value::Null;
    assert!(client.call("add", &params2, &mut result2));
    assert_eq!(result2.as_f64().unwrap(), 9.0);
}
