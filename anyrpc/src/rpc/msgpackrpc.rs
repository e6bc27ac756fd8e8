//! MessagePack-RPC request dispatch and response envelope construction
//! (spec.md §4.7): Request `[0, id, method, params]`, Response
//! `[1, id, error, result]`, Notification `[2, method, params]`.
//!
//! Grounded on
//! `examples/original_source/src/messagepack/messagepackserver.cpp`'s
//! `MessagePackRpcHandler`. That function dispatches on array length (4 =
//! request, 3 = notification) and, in the notification branch, reads
//! `method` from `message[2]` and `params` from `message[3]` -- index 3 is
//! out of bounds for a 3-element array, and index 2 is where the real
//! `params` value lives. The original's `Value::operator[]` auto-vivifies
//! an out-of-range index instead of throwing, so `method` ends up holding
//! whatever was actually sent as `params`, and `params` ends up holding an
//! invalid value. A notification only ever dispatches if the real `params`
//! value happens to be a string, and it always runs with an invalid
//! `params` argument. That is preserved here via `Value::get_index`, which
//! returns `None` for the out-of-bounds slot, rather than "fixing" the
//! indexing to match the protocol description.

use crate::codec::{MsgPackReader, MsgPackWriter};
use crate::document::Document;
use crate::error::ErrorKind;
use crate::registry::MethodRegistry;
use crate::stream::{ReadStream, WriteStream};
use crate::value::Value;

/// Parses one MessagePack-RPC message from `request` and, unless it was a
/// notification, writes the `[1, id, error, result]` response to
/// `response`. Returns `false` for a notification (nothing written),
/// matching `MessagePackRpcHandler`'s `notification` flag.
pub fn handle_request<S: ReadStream, W: WriteStream>(
    registry: &MethodRegistry,
    request: &mut S,
    response: &mut W,
) -> bool {
    let mut doc = Document::with_extensions();
    if MsgPackReader::new(request).parse(&mut doc).is_err() {
        write_fault(response, ErrorKind::ParseError, "Parse error", Value::Null);
        return true;
    }
    let message = doc.take_value().unwrap_or(Value::Null);
    let items = match message.as_array() {
        Ok(items) => items,
        Err(_) => {
            write_fault(response, ErrorKind::InvalidRequest, "Invalid Request", Value::Null);
            return true;
        }
    };

    match items.len() {
        4 => {
            handle_call(registry, items, response);
            true
        }
        3 => {
            handle_notification(registry, items);
            false
        }
        _ => {
            write_fault(response, ErrorKind::InvalidRequest, "Invalid Request", Value::Null);
            true
        }
    }
}

/// `[0, id, method, params]`. The leading type tag is never actually
/// checked in the original (the length match above is what selects this
/// branch), so it is read but not validated here either.
fn handle_call<W: WriteStream>(registry: &MethodRegistry, items: &[Value], response: &mut W) {
    let id = items[1].clone();
    let method = &items[2];
    let params = &items[3];

    if !matches!(id, Value::Uint32(_) | Value::Uint64(_)) {
        return write_fault(response, ErrorKind::InvalidRequest, "Invalid Request", Value::Null);
    }
    let method_name = match method.as_str() {
        Ok(name) => name,
        Err(_) => {
            return write_fault(response, ErrorKind::InvalidRequest, "Invalid Request", Value::Null)
        }
    };

    let mut result = Value::Null;
    match registry.execute(method_name, params, &mut result) {
        Ok(()) => write_success(response, id, result),
        Err(e) if e.kind() == ErrorKind::MethodNotFound => {
            write_fault(response, ErrorKind::MethodNotFound, "Method not found", id)
        }
        Err(e) => write_fault(response, e.kind(), e.message(), id),
    }
}

/// `[2, method, params]` by protocol convention, but the original reads the
/// method name from index 2 (the real `params` slot) and the params from
/// index 3 (out of range, so always invalid) -- see the module comment.
/// Any error from a dispatched notification is swallowed, matching the
/// original's empty `catch` block.
fn handle_notification(registry: &MethodRegistry, items: &[Value]) {
    let method = match items.get(2).and_then(|v| v.as_str().ok()) {
        Some(name) => name,
        None => return,
    };
    let mut result = Value::Null;
    let _ = registry.execute(method, &Value::Invalid, &mut result);
}

fn write_success<W: WriteStream>(response: &mut W, id: Value, result: Value) {
    let envelope = Value::Array(vec![Value::Int32(1), id, Value::Null, result]);
    let mut writer = MsgPackWriter::new(response);
    envelope.visit(&mut writer);
}

fn write_fault<W: WriteStream>(response: &mut W, kind: ErrorKind, message: &str, id: Value) {
    let mut error = Value::map();
    error.insert("code", Value::Int32(kind.code())).unwrap();
    error.insert("message", Value::String(message.to_owned())).unwrap();
    let envelope = Value::Array(vec![Value::Int32(1), id, error, Value::Null]);
    let mut writer = MsgPackWriter::new(response);
    envelope.visit(&mut writer);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::event::Handler;
    use crate::stream::SegmentedWriteStream;

    fn encode_request(id: u64, method: &str, params: impl FnOnce(&mut MsgPackWriter<'_, SegmentedWriteStream>)) -> Vec<u8> {
        let mut buf = SegmentedWriteStream::new();
        {
            let mut w = MsgPackWriter::new(&mut buf);
            w.start_array();
            w.int32(0);
            w.uint64(id);
            w.string(method, true);
            params(&mut w);
            w.end_array(4);
        }
        buf.to_vec()
    }

    fn encode_notification(method: &str, params: impl FnOnce(&mut MsgPackWriter<'_, SegmentedWriteStream>)) -> Vec<u8> {
        let mut buf = SegmentedWriteStream::new();
        {
            let mut w = MsgPackWriter::new(&mut buf);
            w.start_array();
            w.int32(2);
            w.string(method, true);
            params(&mut w);
            w.end_array(3);
        }
        buf.to_vec()
    }

    fn parse_response(bytes: &[u8]) -> Value {
        use crate::stream::ConstStringStream;
        let mut stream = ConstStringStream::new(bytes.to_vec());
        let mut doc = Document::new();
        MsgPackReader::new(&mut stream).parse(&mut doc).unwrap();
        doc.take_value().unwrap()
    }

    #[test]
    fn executes_add_and_returns_result() {
        let registry = MethodRegistry::new();
        registry
            .add_function("add", "", |params, result| {
                let args = params.as_array()?;
                *result = Value::Int64(args[0].as_i64()? + args[1].as_i64()?);
                Ok(())
            })
            .unwrap();

        let req = encode_request(7, "add", |w| {
            w.start_array();
            w.int32(2);
            w.int32(3);
            w.end_array(2);
        });
        let mut input = crate::stream::ConstStringStream::new(req);
        let mut output = SegmentedWriteStream::new();
        let wrote = handle_request(&registry, &mut input, &mut output);
        assert!(wrote);

        let resp = parse_response(&output.to_vec());
        let fields = resp.as_array().unwrap();
        assert_eq!(fields[1].as_u64().unwrap(), 7);
        assert_eq!(fields[3].as_i64().unwrap(), 5);
    }

    #[test]
    fn unknown_method_is_method_not_found() {
        let registry = MethodRegistry::new();
        let req = encode_request(1, "nope", |w| {
            w.start_array();
            w.end_array(0);
        });
        let mut input = crate::stream::ConstStringStream::new(req);
        let mut output = SegmentedWriteStream::new();
        handle_request(&registry, &mut input, &mut output);

        let resp = parse_response(&output.to_vec());
        let fields = resp.as_array().unwrap();
        assert_eq!(fields[2].get("code").unwrap().as_i32().unwrap(), ErrorKind::MethodNotFound.code());
    }

    #[test]
    fn notification_with_string_params_dispatches_by_the_preserved_quirk() {
        let registry = MethodRegistry::new();
        registry
            .add_function("ping", "", |_, result| {
                *result = Value::Bool(true);
                Ok(())
            })
            .unwrap();

        // Real protocol params is the string "ping" -- the bug reads this as
        // the method name, so the call actually dispatches.
        let req = encode_notification("irrelevant-method-slot", |w| w.string("ping", true));
        let mut input = crate::stream::ConstStringStream::new(req);
        let mut output = SegmentedWriteStream::new();
        let wrote = handle_request(&registry, &mut input, &mut output);
        assert!(!wrote);
        assert!(output.to_vec().is_empty());
    }

    #[test]
    fn notification_with_non_string_params_never_dispatches() {
        let registry = MethodRegistry::new();
        registry.add_function("ping", "", |_, _| Ok(())).unwrap();

        let req = encode_notification("ping", |w| {
            w.start_array();
            w.end_array(0);
        });
        let mut input = crate::stream::ConstStringStream::new(req);
        let mut output = SegmentedWriteStream::new();
        let wrote = handle_request(&registry, &mut input, &mut output);
        assert!(!wrote);
    }
}
