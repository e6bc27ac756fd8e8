//! The three wire codecs (spec.md §5): JSON, XML-RPC, and MessagePack.
//! Each exposes a `Reader` that drives a `Handler` from a `ReadStream` and a
//! `Writer` that implements `Handler` over a `WriteStream`.

pub mod json;
pub mod msgpack;
pub mod xmlrpc;

pub use json::{Encoding as JsonEncoding, JsonReader, JsonWriter};
pub use msgpack::{MsgPackReader, MsgPackWriter};
pub use xmlrpc::{XmlRpcReader, XmlRpcWriter};
