//! XML-RPC request dispatch and response envelope construction
//! (spec.md §4.7), grounded on
//! `examples/original_source/src/xml/xmlserver.cpp`'s `XmlRpcHandler`,
//! including the `system.multicall` convention.

use crate::codec::{XmlRpcReader, XmlRpcWriter};
use crate::document::Document;
use crate::error::ErrorKind;
use crate::registry::MethodRegistry;
use crate::stream::{ReadStream, WriteStream};
use crate::value::Value;

const MULTICALL: &str = "system.multicall";

/// Parses one XML-RPC request from `request` and writes the
/// `<methodResponse>` envelope (success or fault) to `response`. XML-RPC has
/// no notification concept, so this always produces a response.
pub fn handle_request<S: ReadStream, W: WriteStream>(
    registry: &MethodRegistry,
    request: &mut S,
    response: &mut W,
) {
    let mut reader = XmlRpcReader::new(request);
    let method_name = match reader.parse_method() {
        Ok(name) => name,
        Err(_) => return write_fault(response, ErrorKind::ParseError, "Parse error"),
    };

    let mut doc = Document::with_extensions();
    if reader.parse_params(&mut doc).is_err() {
        return write_fault(response, ErrorKind::ParseError, "Parse error");
    }
    let params = doc.take_value().unwrap_or_else(|_| Value::array());

    if method_name == MULTICALL {
        handle_multicall(registry, &params, response);
        return;
    }

    let mut result = Value::Null;
    match registry.execute(&method_name, &params, &mut result) {
        Ok(()) => write_result(response, normalize_empty(result)),
        Err(e) if e.kind() == ErrorKind::MethodNotFound => {
            write_fault(response, ErrorKind::MethodNotFound, "Method not found")
        }
        Err(e) => write_fault(response, e.kind(), e.message()),
    }
}

/// `system.multicall`: a single array-of-one parameter whose element is an
/// array of `{methodName, params}` maps. Each call's outcome becomes either
/// a one-element `[result]` array or a fault struct at the same index,
/// matching `XmlExecuteMultiCall`.
fn handle_multicall<W: WriteStream>(registry: &MethodRegistry, params: &Value, response: &mut W) {
    let calls = match params.as_array() {
        Ok(items) if items.len() == 1 && items[0].is_array() => items[0].as_array().unwrap(),
        _ => {
            return write_fault(response, ErrorKind::InvalidParams, "Invalid method parameters");
        }
    };

    let results: Vec<Value> = calls
        .iter()
        .map(|call| {
            let method_name = call.get("methodName").and_then(|v| v.as_str().ok());
            let call_params = call.get("params");
            match (method_name, call_params) {
                (Some(name), Some(call_params)) => {
                    let mut single_result = Value::Null;
                    match registry.execute(name, call_params, &mut single_result) {
                        Ok(()) => Value::Array(vec![normalize_empty(single_result)]),
                        Err(e) if e.kind() == ErrorKind::MethodNotFound => {
                            fault_value(ErrorKind::MethodNotFound, "Method not found")
                        }
                        Err(e) => fault_value(e.kind(), e.message()),
                    }
                }
                _ => fault_value(ErrorKind::InvalidRequest, "Invalid request"),
            }
        })
        .collect();

    write_result(response, Value::Array(results));
}

/// `Value::Invalid` results (a method that never set `result`) are
/// normalized to an empty string for wire compatibility, matching
/// `if (result.IsInvalid()) result = ""`.
fn normalize_empty(result: Value) -> Value {
    if result.is_valid() {
        result
    } else {
        Value::String(String::new())
    }
}

fn fault_value(kind: ErrorKind, message: &str) -> Value {
    let mut v = Value::map();
    v.insert("faultCode", Value::Int32(kind.code())).unwrap();
    v.insert("faultString", Value::String(message.to_owned())).unwrap();
    v
}

fn write_result<W: WriteStream>(response: &mut W, result: Value) {
    let mut writer = XmlRpcWriter::new(response);
    writer.write_method_response(|w| {
        w.write_single_param(|w| result.visit(w));
    });
}

fn write_fault<W: WriteStream>(response: &mut W, kind: ErrorKind, message: &str) {
    let fault = fault_value(kind, message);
    let mut writer = XmlRpcWriter::new(response);
    writer.write_fault_response(|w| fault.visit(w));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{ConstStringStream, SegmentedWriteStream};

    fn run(registry: &MethodRegistry, req: &str) -> String {
        let mut input = ConstStringStream::from_str(req);
        let mut output = SegmentedWriteStream::new();
        handle_request(registry, &mut input, &mut output);
        String::from_utf8(output.to_vec()).unwrap()
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

        let req = r#"<?xml version="1.0"?><methodCall><methodName>add</methodName><params><param><value><i4>2</i4></value></param><param><value><i4>3</i4></value></param></params></methodCall>"#;
        let body = run(&registry, req);
        assert!(body.contains("<methodResponse>"));
        assert!(body.contains("<i8>5</i8>"));
    }

    #[test]
    fn unknown_method_is_a_fault() {
        let registry = MethodRegistry::new();
        let req = r#"<?xml version="1.0"?><methodCall><methodName>nope</methodName><params></params></methodCall>"#;
        let body = run(&registry, req);
        assert!(body.contains("<fault>"));
        assert!(body.contains("-32601"));
    }

    #[test]
    fn multicall_dispatches_each_entry() {
        let registry = MethodRegistry::new();
        registry
            .add_function("double", "", |params, result| {
                *result = Value::Int64(params.as_array()?[0].as_i64()? * 2);
                Ok(())
            })
            .unwrap();

        let req = r#"<?xml version="1.0"?><methodCall><methodName>system.multicall</methodName><params><param><value><array><data>
            <value><struct>
                <member><name>methodName</name><value><string>double</string></value></member>
                <member><name>params</name><value><array><data><value><i4>21</i4></value></data></array></value></member>
            </struct></value>
        </data></array></value></param></params></methodCall>"#;
        let body = run(&registry, req);
        assert!(body.contains("<i8>42</i8>"));
    }
}
