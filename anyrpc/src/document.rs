//! Tree builder that implements `Handler`, producing a `Value`.
//!
//! Grounded on `examples/original_source/src/document.cpp`, with one
//! deliberate redesign: the original builds the tree through a stack of raw
//! pointers into half-constructed `Value`s. Rust can't express that
//! safely, so `Document` instead accumulates into a stack of `Frame`s and
//! only ever builds complete `Value`s; a finished frame is pushed into its
//! parent (or becomes the root) when the matching `EndArray`/`EndMap`
//! arrives. Observable behavior — including the element/member count
//! assertions and the extension-array conversion — is unchanged.

use crate::error::{AnyRpcError, ErrorKind, Result};
use crate::event::Handler;
use crate::value::Value;

enum Frame {
    Array(Vec<Value>),
    Map(Vec<(String, Value)>, Option<String>),
}

/// Builds a `Value` from a stream of `Handler` events.
///
/// When `convert_extensions` is set, a two-element array
/// `[AnyRpcDateTime, <int>]` or `[AnyRpcBase64, <string>]` is folded into a
/// `Value::DateTime`/`Value::Binary` as it closes, matching the JSON reader's
/// extension-tag convention (spec.md §5.1).
pub struct Document {
    stack: Vec<Frame>,
    root: Option<Value>,
    convert_extensions: bool,
}

/// Tag strings recognized by the DateTime/Binary extension-array convention.
pub const ANYRPC_DATETIME: &str = "AnyRpcDateTime";
pub const ANYRPC_BASE64: &str = "AnyRpcBase64";

impl Document {
    pub fn new() -> Self {
        Document {
            stack: Vec::new(),
            root: None,
            convert_extensions: false,
        }
    }

    pub fn with_extensions() -> Self {
        Document {
            stack: Vec::new(),
            root: None,
            convert_extensions: true,
        }
    }

    /// Takes the finished value, leaving the document empty. Fails if no
    /// complete value has been built yet (e.g. the event stream ended
    /// mid-container).
    pub fn take_value(&mut self) -> Result<Value> {
        self.root.take().ok_or_else(|| {
            AnyRpcError::new(ErrorKind::DocumentEmpty, "document has no completed value")
        })
    }

    pub fn value(&self) -> Option<&Value> {
        self.root.as_ref()
    }

    fn push_value(&mut self, v: Value) {
        match self.stack.last_mut() {
            Some(Frame::Array(items)) => items.push(v),
            Some(Frame::Map(entries, pending_key)) => {
                let key = pending_key.take().unwrap_or_default();
                entries.push((key, v));
            }
            None => self.root = Some(v),
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

/// Recognizes the `[AnyRpcDateTime, n]` / `[AnyRpcBase64, s]` extension-array
/// shape and returns the converted scalar, or the original array back if it
/// doesn't match.
fn convert_extension_array(items: Vec<Value>) -> Value {
    if items.len() == 2 {
        if let Value::String(tag) = &items[0] {
            match tag.as_str() {
                ANYRPC_DATETIME => {
                    if let Ok(secs) = items[1].as_i64() {
                        return Value::DateTime(secs);
                    }
                }
                ANYRPC_BASE64 => {
                    if let Value::String(s) = &items[1] {
                        use base64::Engine;
                        if let Ok(bin) = base64::engine::general_purpose::STANDARD.decode(s) {
                            return Value::Binary(bin);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    Value::Array(items)
}

impl Handler for Document {
    fn null(&mut self) {
        self.push_value(Value::Null);
    }

    fn boolean(&mut self, b: bool) {
        self.push_value(Value::Bool(b));
    }

    fn int32(&mut self, v: i32) {
        self.push_value(Value::Int32(v));
    }

    fn uint32(&mut self, v: u32) {
        self.push_value(Value::Uint32(v));
    }

    fn int64(&mut self, v: i64) {
        self.push_value(Value::Int64(v));
    }

    fn uint64(&mut self, v: u64) {
        self.push_value(Value::Uint64(v));
    }

    fn float(&mut self, v: f32) {
        self.push_value(Value::Float(v));
    }

    fn double(&mut self, v: f64) {
        self.push_value(Value::Double(v));
    }

    fn datetime(&mut self, epoch_secs: i64) {
        self.push_value(Value::DateTime(epoch_secs));
    }

    fn string(&mut self, s: &str, _copy: bool) {
        self.push_value(Value::String(s.to_owned()));
    }

    fn binary(&mut self, b: &[u8], _copy: bool) {
        self.push_value(Value::Binary(b.to_vec()));
    }

    fn start_array(&mut self) {
        self.stack.push(Frame::Array(Vec::new()));
    }

    fn end_array(&mut self, count: usize) {
        match self.stack.pop() {
            Some(Frame::Array(items)) => {
                assert_eq!(items.len(), count, "array element count mismatch");
                let v = if self.convert_extensions {
                    convert_extension_array(items)
                } else {
                    Value::Array(items)
                };
                self.push_value(v);
            }
            _ => panic!("end_array without matching start_array"),
        }
    }

    fn start_map(&mut self) {
        self.stack.push(Frame::Map(Vec::new(), None));
    }

    fn key(&mut self, s: &str, _copy: bool) {
        match self.stack.last_mut() {
            Some(Frame::Map(_, pending_key)) => *pending_key = Some(s.to_owned()),
            _ => panic!("key event outside of a map"),
        }
    }

    fn end_map(&mut self, count: usize) {
        match self.stack.pop() {
            Some(Frame::Map(entries, _)) => {
                assert_eq!(entries.len(), count, "map member count mismatch");
                self.push_value(Value::Map(entries));
            }
            _ => panic!("end_map without matching start_map"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_scalar() {
        let mut doc = Document::new();
        doc.int32(42);
        assert_eq!(doc.take_value().unwrap(), Value::Int32(42));
    }

    #[test]
    fn builds_nested_array_and_map() {
        let mut doc = Document::new();
        doc.start_map();
        doc.key("items", true);
        doc.start_array();
        doc.int32(1);
        doc.int32(2);
        doc.end_array(2);
        doc.end_map(1);

        let v = doc.take_value().unwrap();
        let items = v.get("items").unwrap().as_array().unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn converts_datetime_extension_array() {
        let mut doc = Document::with_extensions();
        doc.start_array();
        doc.string(ANYRPC_DATETIME, true);
        doc.int64(1_700_000_000);
        doc.end_array(2);

        assert_eq!(doc.take_value().unwrap(), Value::DateTime(1_700_000_000));
    }

    #[test]
    fn leaves_plain_two_element_array_alone() {
        let mut doc = Document::with_extensions();
        doc.start_array();
        doc.int32(1);
        doc.int32(2);
        doc.end_array(2);

        match doc.take_value().unwrap() {
            Value::Array(items) => assert_eq!(items.len(), 2),
            other => panic!("expected array, got {other:?}"),
        }
    }

    #[test]
    #[should_panic]
    fn end_array_count_mismatch_panics() {
        let mut doc = Document::new();
        doc.start_array();
        doc.int32(1);
        doc.end_array(2);
    }
}
