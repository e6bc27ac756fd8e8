//! Sockets, HTTP/netstring framing, server concurrency strategies, and RPC
//! clients built on top of the `anyrpc` codecs and method registry.
//!
//! Grounded on `examples/original_source/include/anyrpc/` and
//! `examples/original_source/src/` -- `socket.h`/`socket.cpp`,
//! `internal/http.h`/`internal/http.cpp`, `connection.h`/`connection.cpp`,
//! `server.h`/`server.cpp`, and `client.h`/`client.cpp`.

pub mod client;
pub mod config;
pub mod connection;
pub mod http;
pub mod netstring;
pub mod server;
pub mod socket;

pub use client::{
    Client, ClientHandler, JsonRpcClientHandler, MsgPackRpcClientHandler, ProcessResponseEnum,
    XmlRpcClientHandler,
};
pub use config::ServerConfig;
pub use server::{ServerMt, ServerSt, ServerTp};
