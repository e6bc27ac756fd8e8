//! Demo client calling the `add` and `echo` methods exposed by
//! `anyrpc-server-demo` over HTTP JSON-RPC.

use anyrpc::value::Value;
use anyrpc_net::client::Client;
use clap::Parser;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,
    #[arg(long, default_value_t = 9000)]
    port: u16,
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let mut client = Client::http_json(args.host, args.port);

    let mut params = Value::array();
    params.push(Value::from(2i32)).unwrap();
    params.push(Value::from(3i32)).unwrap();

    let mut result = Value::Null;
    if client.call("add", &params, &mut result) {
        println!("add(2, 3) = {:?}", result);
    } else {
        eprintln!("add call failed: {:?}", result);
    }

    let mut echo_params = Value::array();
    echo_params.push(Value::from("hello")).unwrap();
    let mut echo_result = Value::Null;
    if client.call("echo", &echo_params, &mut echo_result) {
        println!("echo(\"hello\") = {:?}", echo_result);
    } else {
        eprintln!("echo call failed: {:?}", echo_result);
    }
}
