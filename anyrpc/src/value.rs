//! Tagged-union document node shared by every codec.
//!
//! Grounded on `examples/original_source/include/anyrpc/value.h`, but
//! realized as a plain Rust sum type instead of the original's bit-flag
//! tagged union (spec.md §9 Design Notes explicitly sanctions this: "the
//! accessors do range-checked conversion and return an error if the
//! requested view does not fit" replaces the C++ "same value is both Int64
//! and Uint32" trick).

use crate::error::{AnyRpcError, ErrorKind, Result};
use crate::event::Handler;
use std::fmt;

/// A document node. Owns its payload; there is no borrowed variant (see
/// SPEC_FULL.md §3 for why the in-situ borrow lives at the `Handler` call
/// boundary instead of inside `Value`).
#[derive(Debug, Clone)]
pub enum Value {
    /// Sentinel distinct from `Null`. Must not appear in a finished document
    /// (§3 invariant); only transiently present while `Document` is still
    /// building a tree.
    Invalid,
    Null,
    Bool(bool),
    Int32(i32),
    Uint32(u32),
    Int64(i64),
    Uint64(u64),
    Float(f32),
    Double(f64),
    String(String),
    Binary(Vec<u8>),
    /// Epoch seconds, interpreted as local time for formatting (§3).
    DateTime(i64),
    Array(Vec<Value>),
    /// Ordered key -> value pairs; insertion order preserved, linear lookup,
    /// duplicate keys permitted but lookup result undefined (§3).
    Map(Vec<(String, Value)>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Invalid
    }
}

/// Coarse type discriminant, used for error messages (`GetType()` in the
/// original).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Invalid,
    Null,
    Bool,
    Number,
    String,
    Binary,
    DateTime,
    Array,
    Map,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

macro_rules! access_err {
    ($expected:expr, $actual:expr) => {
        AnyRpcError::new(
            ErrorKind::ValueAccess,
            format!("expected {}, got {}", $expected, $actual),
        )
    };
}

impl Value {
    pub fn array() -> Value {
        Value::Array(Vec::new())
    }

    pub fn map() -> Value {
        Value::Map(Vec::new())
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Invalid => ValueType::Invalid,
            Value::Null => ValueType::Null,
            Value::Bool(_) => ValueType::Bool,
            Value::Int32(_) | Value::Uint32(_) | Value::Int64(_) | Value::Uint64(_)
            | Value::Float(_) | Value::Double(_) => ValueType::Number,
            Value::String(_) => ValueType::String,
            Value::Binary(_) => ValueType::Binary,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Array(_) => ValueType::Array,
            Value::Map(_) => ValueType::Map,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Value::Invalid)
    }

    pub fn is_valid(&self) -> bool {
        !self.is_invalid()
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        self.value_type() == ValueType::Number
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Value::String(_))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Value::Binary(_))
    }

    pub fn is_datetime(&self) -> bool {
        matches!(self, Value::DateTime(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(access_err!("bool", other.value_type())),
        }
    }

    /// Range-checked conversion to `i32`, regardless of which integer
    /// variant is actually stored.
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Value::Int32(v) => Ok(*v),
            Value::Uint32(v) => i32::try_from(*v).map_err(|_| narrow_err("i32", *v as i64)),
            Value::Int64(v) => i32::try_from(*v).map_err(|_| narrow_err("i32", *v)),
            Value::Uint64(v) => i32::try_from(*v).map_err(|_| narrow_err("i32", *v as i64)),
            other => Err(access_err!("number", other.value_type())),
        }
    }

    pub fn as_u32(&self) -> Result<u32> {
        match self {
            Value::Uint32(v) => Ok(*v),
            Value::Int32(v) => u32::try_from(*v).map_err(|_| narrow_err("u32", *v as i64)),
            Value::Int64(v) => u32::try_from(*v).map_err(|_| narrow_err("u32", *v)),
            Value::Uint64(v) => u32::try_from(*v).map_err(|_| narrow_err("u32", *v as i64)),
            other => Err(access_err!("number", other.value_type())),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::Int64(v) => Ok(*v),
            Value::Int32(v) => Ok(*v as i64),
            Value::Uint32(v) => Ok(*v as i64),
            Value::Uint64(v) => i64::try_from(*v).map_err(|_| narrow_err("i64", -1)),
            other => Err(access_err!("number", other.value_type())),
        }
    }

    pub fn as_u64(&self) -> Result<u64> {
        match self {
            Value::Uint64(v) => Ok(*v),
            Value::Uint32(v) => Ok(*v as u64),
            Value::Int32(v) => u64::try_from(*v).map_err(|_| narrow_err("u64", *v as i64)),
            Value::Int64(v) => u64::try_from(*v).map_err(|_| narrow_err("u64", *v)),
            other => Err(access_err!("number", other.value_type())),
        }
    }

    pub fn as_f32(&self) -> Result<f32> {
        match self {
            Value::Float(v) => Ok(*v),
            Value::Double(v) => Ok(*v as f32),
            Value::Int32(v) => Ok(*v as f32),
            Value::Uint32(v) => Ok(*v as f32),
            Value::Int64(v) => Ok(*v as f32),
            Value::Uint64(v) => Ok(*v as f32),
            other => Err(access_err!("number", other.value_type())),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            Value::Double(v) => Ok(*v),
            Value::Float(v) => Ok(*v as f64),
            Value::Int32(v) => Ok(*v as f64),
            Value::Uint32(v) => Ok(*v as f64),
            Value::Int64(v) => Ok(*v as f64),
            Value::Uint64(v) => Ok(*v as f64),
            other => Err(access_err!("number", other.value_type())),
        }
    }

    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::String(s) => Ok(s.as_str()),
            other => Err(access_err!("string", other.value_type())),
        }
    }

    pub fn as_binary(&self) -> Result<&[u8]> {
        match self {
            Value::Binary(b) => Ok(b.as_slice()),
            other => Err(access_err!("binary", other.value_type())),
        }
    }

    pub fn as_datetime(&self) -> Result<i64> {
        match self {
            Value::DateTime(t) => Ok(*t),
            other => Err(access_err!("datetime", other.value_type())),
        }
    }

    pub fn as_array(&self) -> Result<&[Value]> {
        match self {
            Value::Array(a) => Ok(a.as_slice()),
            other => Err(access_err!("array", other.value_type())),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Ok(a),
            Value::Invalid => {
                *self = Value::array();
                self.as_array_mut()
            }
            other => Err(access_err!("array", other.value_type())),
        }
    }

    pub fn as_map(&self) -> Result<&[(String, Value)]> {
        match self {
            Value::Map(m) => Ok(m.as_slice()),
            other => Err(access_err!("map", other.value_type())),
        }
    }

    pub fn as_map_mut(&mut self) -> Result<&mut Vec<(String, Value)>> {
        match self {
            Value::Map(m) => Ok(m),
            Value::Invalid => {
                *self = Value::map();
                self.as_map_mut()
            }
            other => Err(access_err!("map", other.value_type())),
        }
    }

    /// Look up a member by key. Map keys are always string-typed (§3
    /// invariant is enforced at construction, not lookup time).
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Array(a) => a.get(index),
            _ => None,
        }
    }

    /// Insert or overwrite a member. Fails with `ValueAccess` if `self` is
    /// neither `Invalid` (upgraded to `Map`) nor already a `Map` (§3:
    /// "attempting to key with another variant fails with ValueAccess").
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let map = self.as_map_mut()?;
        let key = key.into();
        if let Some(slot) = map.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            map.push((key, value));
        }
        Ok(())
    }

    pub fn push(&mut self, value: Value) -> Result<()> {
        self.as_array_mut()?.push(value);
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        match self {
            Value::Array(a) => Ok(a.len()),
            Value::Map(m) => Ok(m.len()),
            other => Err(access_err!("array or map", other.value_type())),
        }
    }

    pub fn is_empty(&self) -> Result<bool> {
        self.len().map(|n| n == 0)
    }

    /// Replays this value as a stream of `Handler` events, the inverse of
    /// `Document` building a `Value` from those same events. Every codec
    /// writer implements `Handler`, so this is how a `Value` tree built by
    /// one codec (or assembled by hand for an RPC response) gets
    /// serialized through any of the three.
    pub fn visit<H: Handler>(&self, handler: &mut H) {
        match self {
            Value::Invalid => handler.null(),
            Value::Null => handler.null(),
            Value::Bool(b) => handler.boolean(*b),
            Value::Int32(v) => handler.int32(*v),
            Value::Uint32(v) => handler.uint32(*v),
            Value::Int64(v) => handler.int64(*v),
            Value::Uint64(v) => handler.uint64(*v),
            Value::Float(v) => handler.float(*v),
            Value::Double(v) => handler.double(*v),
            Value::DateTime(secs) => handler.datetime(*secs),
            // `self` (and therefore these borrows) outlives the handler
            // call, unlike a codec reader's in-situ buffer.
            Value::String(s) => handler.string(s, true),
            Value::Binary(b) => handler.binary(b, true),
            Value::Array(items) => {
                handler.start_array();
                for (i, item) in items.iter().enumerate() {
                    item.visit(handler);
                    if i + 1 != items.len() {
                        handler.array_separator();
                    }
                }
                handler.end_array(items.len());
            }
            Value::Map(entries) => {
                handler.start_map();
                for (i, (key, value)) in entries.iter().enumerate() {
                    handler.key(key, true);
                    value.visit(handler);
                    if i + 1 != entries.len() {
                        handler.map_separator();
                    }
                }
                handler.end_map(entries.len());
            }
        }
    }
}

fn narrow_err(target: &str, value: i64) -> AnyRpcError {
    AnyRpcError::new(
        ErrorKind::ValueAccess,
        format!("value {} does not fit in {}", value, target),
    )
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Uint32(v)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}
impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint64(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Binary(b)
    }
}

/// Structural equality used by round-trip tests (spec.md §8). Float/Double
/// are compared across variants since the base wire formats frequently
/// collapse one into the other.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        use Value::*;
        match (self, other) {
            (Invalid, Invalid) | (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (String(a), String(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Array(a), Array(b)) => a == b,
            (Map(a), Map(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => {
                // Compare via the widest common representation.
                match (a.as_f64(), b.as_f64()) {
                    (Ok(x), Ok(y)) => x == y,
                    _ => false,
                }
            }
            _ => false,
        }
    }
}
