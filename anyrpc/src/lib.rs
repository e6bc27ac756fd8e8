//! Transport-agnostic RPC value model, wire codecs, method registry, and
//! protocol envelope handling (spec.md §1-§7).
//!
//! Grounded on the `anyrpc` C++ library (`examples/original_source/`):
//! a tagged-union [`Value`](value::Value) built by pushing events through a
//! shared [`Handler`](event::Handler) trait, three interchangeable codecs
//! (JSON, XML-RPC, MessagePack) that each read and write that event stream,
//! a [`MethodRegistry`](registry::MethodRegistry) methods are dispatched
//! through, and per-protocol request/response envelope construction in
//! [`rpc`].

pub mod codec;
pub mod document;
pub mod error;
pub mod event;
pub mod registry;
pub mod rpc;
pub mod stream;
pub mod value;

pub use document::Document;
pub use error::{AnyRpcError, ErrorKind, Result};
pub use event::Handler;
pub use registry::MethodRegistry;
pub use value::Value;
