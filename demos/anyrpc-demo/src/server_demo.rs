//! Single-threaded demo server exposing a couple of toy methods over
//! HTTP JSON-RPC, mirroring the original library's `jsonHttpServer.cpp`
//! example: pick a port, register methods, loop.

use anyrpc::error::Result;
use anyrpc::registry::MethodRegistry;
use anyrpc::value::Value;
use anyrpc_net::config::ServerConfig;
use anyrpc_net::connection::{default_handlers, HttpConnection};
use anyrpc_net::server::ServerSt;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value_t = 9000)]
    port: u16,
}

fn add(params: &Value, result: &mut Value) -> Result<()> {
    let items = params.as_array()?;
    let a = items.first().map(|v| v.as_i64()).transpose()?.unwrap_or(0);
    let b = items.get(1).map(|v| v.as_i64()).transpose()?.unwrap_or(0);
    *result = Value::from(a + b);
    Ok(())
}

fn echo(params: &Value, result: &mut Value) -> Result<()> {
    *result = params.clone();
    Ok(())
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let registry = Arc::new(MethodRegistry::new());
    registry.add_function("add", "Adds two integers", add).expect("register add");
    registry.add_function("echo", "Echoes its arguments back", echo).expect("register echo");

    let mut config = ServerConfig::default();
    config.port = args.port;

    let factory = Arc::new(|stream| {
        Box::new(HttpConnection::new(stream, default_handlers()))
            as Box<dyn anyrpc_net::connection::PollableConnection>
    });

    let mut server = ServerSt::bind(config, registry, factory).expect("bind server");
    log::info!("anyrpc demo server listening on port {}", args.port);
    loop {
        server.work(Some(Duration::from_millis(200)));
    }
}
