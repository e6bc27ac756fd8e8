//! JSON-RPC 2.0 request dispatch and response envelope construction
//! (spec.md §4.7), grounded on
//! `examples/original_source/src/json/jsonserver.cpp`'s `JsonRpcHandler`.

use crate::codec::{JsonReader, JsonWriter};
use crate::document::Document;
use crate::error::ErrorKind;
use crate::registry::MethodRegistry;
use crate::stream::{ReadStream, WriteStream};
use crate::value::Value;

/// Parses a JSON-RPC request (single or batch) from `request`, dispatches
/// each call through `registry`, and writes the JSON-RPC response envelope
/// to `response`. Returns `false` when the request was a standalone
/// notification (no `id`) and nothing should be written back, matching
/// `JsonRpcHandler`'s notification short-circuit.
pub fn handle_request<S: ReadStream, W: WriteStream>(
    registry: &MethodRegistry,
    request: &mut S,
    response: &mut W,
) -> bool {
    let mut doc = Document::with_extensions();
    let parse_result = JsonReader::new(request).parse(&mut doc);

    let envelope = match parse_result {
        Err(_) => fault_response(ErrorKind::ParseError, "Parse error", &Value::Null),
        Ok(()) => {
            let message = doc.take_value().unwrap_or(Value::Null);
            match &message {
                Value::Map(_) => execute_single(registry, &message),
                Value::Array(items) if !items.is_empty() => {
                    let responses: Vec<Value> = items
                        .iter()
                        .filter_map(|item| execute_single(registry, item))
                        .collect();
                    if responses.is_empty() {
                        None
                    } else {
                        Some(Value::Array(responses))
                    }
                }
                _ => fault_response(ErrorKind::InvalidRequest, "Invalid Request", &Value::Null),
            }
        }
    };

    match envelope {
        Some(v) => {
            let mut writer = JsonWriter::new(response);
            v.visit(&mut writer);
            true
        }
        None => false,
    }
}

/// Executes one `{method, params, id, jsonrpc}` request object, returning
/// `None` for a well-formed notification (no response to send) and
/// `Some(envelope)` otherwise.
fn execute_single(registry: &MethodRegistry, message: &Value) -> Option<Value> {
    let method = message.get("method");
    let id = message.get("id").cloned_or_invalid();
    let jsonrpc = message.get("jsonrpc");
    let params = message.get("params");

    let method_name = match method.and_then(|v| v.as_str().ok()) {
        Some(name) => name,
        None => return fault_response(ErrorKind::InvalidRequest, "Invalid Request", &id),
    };
    match jsonrpc.and_then(|v| v.as_str().ok()) {
        Some("2.0") => {}
        _ => return fault_response(ErrorKind::InvalidRequest, "Invalid Request", &id),
    }
    let params = match params {
        Some(p) => p,
        None => return fault_response(ErrorKind::InvalidRequest, "Invalid Request", &id),
    };

    let mut result = Value::Null;
    match registry.execute(method_name, params, &mut result) {
        Ok(()) => {
            if id.is_valid() {
                success_response(result, &id)
            } else {
                None
            }
        }
        Err(e) if e.kind() == ErrorKind::MethodNotFound => {
            fault_response(ErrorKind::MethodNotFound, "Method not found", &id)
        }
        Err(e) => fault_response(e.kind(), e.message(), &id),
    }
}

fn success_response(result: Value, id: &Value) -> Option<Value> {
    if !id.is_valid() {
        return None;
    }
    let mut v = Value::map();
    v.insert("jsonrpc", Value::String("2.0".into())).unwrap();
    v.insert("id", id.clone()).unwrap();
    v.insert("result", result).unwrap();
    Some(v)
}

fn fault_response(kind: ErrorKind, message: &str, id: &Value) -> Option<Value> {
    let mut v = Value::map();
    v.insert("jsonrpc", Value::String("2.0".into())).unwrap();
    if id.is_valid() {
        v.insert("id", id.clone()).unwrap();
    } else {
        v.insert("id", Value::Null).unwrap();
    }
    let mut error = Value::map();
    error.insert("code", Value::Int32(kind.code())).unwrap();
    error.insert("message", Value::String(message.to_owned())).unwrap();
    v.insert("error", error).unwrap();
    Some(v)
}

/// Small helper trait so `execute_single` can ask for an owned, `Invalid`
/// default when a field is absent, matching `Value["id"]` auto-vivifying to
/// an invalid value in the original.
trait OptionValueExt {
    fn cloned_or_invalid(self) -> Value;
}

impl OptionValueExt for Option<&Value> {
    fn cloned_or_invalid(self) -> Value {
        self.cloned().unwrap_or(Value::Invalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ConstStringStream, SegmentedWriteStream};

    fn run(registry: &MethodRegistry, req: &str) -> (bool, String) {
        let mut input = ConstStringStream::from_str(req);
        let mut output = SegmentedWriteStream::new();
        let wrote = handle_request(registry, &mut input, &mut output);
        (wrote, String::from_utf8(output.to_vec()).unwrap())
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

        let (wrote, body) = run(
            &registry,
            r#"{"jsonrpc":"2.0","method":"add","params":[2,3],"id":1}"#,
        );
        assert!(wrote);
        assert!(body.contains("\"result\":5"));
        assert!(body.contains("\"id\":1"));
    }

    #[test]
    fn notification_produces_no_response() {
        let registry = MethodRegistry::new();
        registry.add_function("ping", "", |_, _| Ok(())).unwrap();
        let (wrote, _) = run(&registry, r#"{"jsonrpc":"2.0","method":"ping","params":[]}"#);
        assert!(!wrote);
    }

    #[test]
    fn unknown_method_is_method_not_found() {
        let registry = MethodRegistry::new();
        let (wrote, body) = run(
            &registry,
            r#"{"jsonrpc":"2.0","method":"nope","params":[],"id":1}"#,
        );
        assert!(wrote);
        assert!(body.contains("-32601"));
    }

    #[test]
    fn batch_request_skips_notifications_in_response() {
        let registry = MethodRegistry::new();
        registry.add_function("ping", "", |_, result| {
            *result = Value::Bool(true);
            Ok(())
        }).unwrap();

        let req = r#"[
            {"jsonrpc":"2.0","method":"ping","params":[],"id":1},
            {"jsonrpc":"2.0","method":"ping","params":[]}
        ]"#;
        let (wrote, body) = run(&registry, req);
        assert!(wrote);
        assert_eq!(body.matches("\"result\"").count(), 1);
    }

    #[test]
    fn all_notification_batch_produces_no_response() {
        let registry = MethodRegistry::new();
        registry.add_function("ping", "", |_, result| {
            *result = Value::Bool(true);
            Ok(())
        }).unwrap();

        let req = r#"[
            {"jsonrpc":"2.0","method":"ping","params":[]},
            {"jsonrpc":"2.0","method":"ping","params":[]}
        ]"#;
        let (wrote, body) = run(&registry, req);
        assert!(!wrote);
        assert!(body.is_empty());
    }

    #[test]
    fn parse_error_gets_null_id() {
        let registry = MethodRegistry::new();
        let (wrote, body) = run(&registry, "{not json");
        assert!(wrote);
        assert!(body.contains("\"id\":null"));
        assert!(body.contains("-32700"));
    }
}
