//! JSON reader/writer (RFC 8259), with the `AnyRpcDateTime`/`AnyRpcBase64`
//! tagged-two-element-array extension for the two scalar types JSON has no
//! native representation for (spec.md §5.1).
//!
//! Grounded on `examples/original_source/src/json/jsonreader.cpp` and
//! `jsonwriter.cpp`.

use crate::document::{ANYRPC_BASE64, ANYRPC_DATETIME};
use crate::error::{AnyRpcError, ErrorKind, Result};
use crate::event::Handler;
use crate::stream::{ReadStream, WriteStream};

/// Text encoding mode for string output: `Utf8` passes bytes >= 0x80
/// through unescaped; `Ascii` backslash-u escapes every non-ASCII
/// codepoint (surrogate-pairing astral codepoints), for transports that
/// can't be trusted to round-trip raw UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Ascii,
}

/// Streaming JSON reader. Call [`JsonReader::parse`] with a `Handler` to
/// drive it; `convert_extensions` controls whether `Document`-style callers
/// should fold `[AnyRpcDateTime, ...]`/`[AnyRpcBase64, ...]` arrays — that
/// folding actually happens in `Document`, not here: the reader only ever
/// emits plain array/string events, matching the original library where the
/// JSON reader has no knowledge of the extension convention either.
pub struct JsonReader<'s, S: ReadStream> {
    stream: &'s mut S,
}

impl<'s, S: ReadStream> JsonReader<'s, S> {
    pub fn new(stream: &'s mut S) -> Self {
        JsonReader { stream }
    }

    pub fn parse<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        handler.start_document();
        let result = self.parse_value(handler);
        handler.end_document();
        result
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.stream.peek() {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.stream.get();
                }
                _ => break,
            }
        }
    }

    fn err(&self, kind: ErrorKind, msg: &str) -> AnyRpcError {
        AnyRpcError::with_offset(kind, msg, self.stream.tell())
    }

    fn parse_value<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        self.skip_whitespace();
        match self.stream.peek() {
            Some(b'n') => self.parse_literal(b"null", || {}, handler, Handler::null),
            Some(b't') => self.parse_literal(b"true", || {}, handler, |h| h.boolean(true)),
            Some(b'f') => self.parse_literal(b"false", || {}, handler, |h| h.boolean(false)),
            Some(b'"') => {
                let s = self.parse_string_literal()?;
                handler.string(&s, true);
                Ok(())
            }
            Some(b'{') => self.parse_map(handler),
            Some(b'[') => self.parse_array(handler),
            Some(_) => self.parse_number(handler),
            None => Err(self.err(ErrorKind::ValueInvalid, "unexpected end of input")),
        }
    }

    fn parse_literal<H: Handler>(
        &mut self,
        lit: &[u8],
        _unused: impl FnOnce(),
        handler: &mut H,
        emit: impl FnOnce(&mut H),
    ) -> Result<()> {
        for &expect in lit {
            if self.stream.get() != Some(expect) {
                return Err(self.err(ErrorKind::ValueInvalid, "invalid value"));
            }
        }
        emit(handler);
        Ok(())
    }

    fn parse_string_literal(&mut self) -> Result<String> {
        debug_assert_eq!(self.stream.peek(), Some(b'"'));
        self.stream.get();
        let mut out = Vec::new();
        loop {
            match self.stream.peek() {
                Some(b'\\') => {
                    self.stream.get();
                    let e = self
                        .stream
                        .get()
                        .ok_or_else(|| self.err(ErrorKind::StringEscapeInvalid, "truncated escape"))?;
                    match e {
                        b'"' => out.push(b'"'),
                        b'\\' => out.push(b'\\'),
                        b'/' => out.push(b'/'),
                        b'b' => out.push(0x08),
                        b'f' => out.push(0x0C),
                        b'n' => out.push(b'\n'),
                        b'r' => out.push(b'\r'),
                        b't' => out.push(b'\t'),
                        b'u' => {
                            let mut cp = self.parse_hex4()?;
                            if (0xD800..=0xDBFF).contains(&cp) {
                                if self.stream.get() != Some(b'\\') || self.stream.get() != Some(b'u')
                                {
                                    return Err(self.err(
                                        ErrorKind::StringUnicodeSurrogateInvalid,
                                        "the surrogate pair in string is invalid",
                                    ));
                                }
                                let cp2 = self.parse_hex4()?;
                                if !(0xDC00..=0xDFFF).contains(&cp2) {
                                    return Err(self.err(
                                        ErrorKind::StringUnicodeSurrogateInvalid,
                                        "the surrogate pair in string is invalid",
                                    ));
                                }
                                cp = (((cp - 0xD800) << 10) | (cp2 - 0xDC00)) + 0x10000;
                            }
                            let c = char::from_u32(cp).unwrap_or('\u{FFFD}');
                            let mut buf = [0u8; 4];
                            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                        }
                        _ => {
                            return Err(self.err(
                                ErrorKind::StringEscapeInvalid,
                                "invalid escape character in string",
                            ))
                        }
                    }
                }
                Some(b'"') => {
                    self.stream.get();
                    break;
                }
                Some(c) if c < 0x20 => {
                    return Err(self.err(
                        ErrorKind::StringEscapeInvalid,
                        "invalid escape character in string",
                    ))
                }
                Some(_) => out.push(self.stream.get().unwrap()),
                None => {
                    return Err(self.err(
                        ErrorKind::StringMissingQuotationMark,
                        "missing a closing quotation mark in string",
                    ))
                }
            }
        }
        String::from_utf8(out).map_err(|e| e.utf8_error().into())
    }

    fn parse_hex4(&mut self) -> Result<u32> {
        let mut cp = 0u32;
        for _ in 0..4 {
            let c = self
                .stream
                .get()
                .ok_or_else(|| self.err(ErrorKind::StringUnicodeEscapeInvalid, "truncated \\u escape"))?;
            let digit = match c {
                b'0'..=b'9' => c - b'0',
                b'A'..=b'F' => c - b'A' + 10,
                b'a'..=b'f' => c - b'a' + 10,
                _ => {
                    return Err(self.err(
                        ErrorKind::StringUnicodeEscapeInvalid,
                        "incorrect digit after escape in string",
                    ))
                }
            };
            cp = (cp << 4) | digit as u32;
        }
        Ok(cp)
    }

    fn parse_map<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        self.stream.get();
        handler.start_map();
        self.skip_whitespace();
        if self.stream.peek() == Some(b'}') {
            self.stream.get();
            handler.end_map(0);
            return Ok(());
        }
        let mut count = 0usize;
        loop {
            if self.stream.peek() != Some(b'"') {
                return Err(self.err(ErrorKind::ObjectMissName, "missing a name for object member"));
            }
            let key = self.parse_string_literal()?;
            handler.key(&key, true);
            self.skip_whitespace();
            if self.stream.get() != Some(b':') {
                return Err(self.err(
                    ErrorKind::ObjectMissColon,
                    "missing a colon after a name of object member",
                ));
            }
            self.skip_whitespace();
            self.parse_value(handler)?;
            self.skip_whitespace();
            count += 1;
            match self.stream.get() {
                Some(b',') => {
                    self.skip_whitespace();
                    handler.map_separator();
                }
                Some(b'}') => {
                    handler.end_map(count);
                    return Ok(());
                }
                _ => {
                    return Err(self.err(
                        ErrorKind::ObjectMissCommaOrCurlyBracket,
                        "missing a comma or '}' after an object member",
                    ))
                }
            }
        }
    }

    fn parse_array<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        self.stream.get();
        handler.start_array();
        self.skip_whitespace();
        if self.stream.peek() == Some(b']') {
            self.stream.get();
            handler.end_array(0);
            return Ok(());
        }
        let mut count = 0usize;
        loop {
            self.parse_value(handler)?;
            count += 1;
            self.skip_whitespace();
            match self.stream.get() {
                Some(b',') => {
                    self.skip_whitespace();
                    handler.array_separator();
                }
                Some(b']') => {
                    handler.end_array(count);
                    return Ok(());
                }
                _ => {
                    return Err(self.err(
                        ErrorKind::ArrayMissCommaOrSquareBracket,
                        "missing a comma or ']' after an array element",
                    ))
                }
            }
        }
    }

    /// Integer-path optimization: accumulate digits in a `u32` first,
    /// escalate to `u64` on overflow, and fall back to `f64` only once a
    /// fraction, exponent, or a 64-bit overflow is seen — mirroring the
    /// original reader's int/int64/double promotion ladder.
    fn parse_number<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        let minus = if self.stream.peek() == Some(b'-') {
            self.stream.get();
            true
        } else {
            false
        };

        let mut u32_accum: u32 = 0;
        let mut u64_accum: u64 = 0;
        let mut use64 = false;

        match self.stream.peek() {
            Some(b'0') => {
                self.stream.get();
            }
            Some(c) if c.is_ascii_digit() => {
                u32_accum = (self.stream.get().unwrap() - b'0') as u32;
                while let Some(c) = self.stream.peek() {
                    if !c.is_ascii_digit() {
                        break;
                    }
                    match u32_accum.checked_mul(10).and_then(|v| v.checked_add((c - b'0') as u32)) {
                        Some(v) => {
                            u32_accum = v;
                            self.stream.get();
                        }
                        None => {
                            use64 = true;
                            u64_accum = u32_accum as u64;
                            break;
                        }
                    }
                }
            }
            _ => return Err(self.err(ErrorKind::ValueInvalid, "invalid value")),
        }

        if use64 {
            while let Some(c) = self.stream.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                match u64_accum.checked_mul(10).and_then(|v| v.checked_add((c - b'0') as u64)) {
                    Some(v) => {
                        u64_accum = v;
                        self.stream.get();
                    }
                    None => break,
                }
            }
        }

        let mut use_double = false;
        let mut d: f64 = if use64 { u64_accum as f64 } else { u32_accum as f64 };

        if self.stream.peek() == Some(b'.') {
            use_double = true;
            self.stream.get();
            if !matches!(self.stream.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.err(ErrorKind::NumberMissFraction, "missing fraction part in number"));
            }
            let mut frac = 0.1;
            while let Some(c) = self.stream.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                self.stream.get();
                d += (c - b'0') as f64 * frac;
                frac *= 0.1;
            }
        }

        if matches!(self.stream.peek(), Some(b'e') | Some(b'E')) {
            use_double = true;
            self.stream.get();
            let exp_minus = match self.stream.peek() {
                Some(b'+') => {
                    self.stream.get();
                    false
                }
                Some(b'-') => {
                    self.stream.get();
                    true
                }
                _ => false,
            };
            if !matches!(self.stream.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.err(ErrorKind::NumberMissExponent, "missing exponent in number"));
            }
            let mut exp: i32 = 0;
            while let Some(c) = self.stream.peek() {
                if !c.is_ascii_digit() {
                    break;
                }
                self.stream.get();
                exp = exp * 10 + (c - b'0') as i32;
                if exp > 308 && !exp_minus {
                    return Err(self.err(ErrorKind::NumberTooBig, "number too big to be stored in double"));
                }
            }
            let exp = if exp_minus { -exp } else { exp };
            d *= 10f64.powi(exp);
        }

        if use_double {
            handler.double(if minus { -d } else { d });
        } else if use64 {
            if minus {
                handler.int64(-(u64_accum as i64));
            } else {
                handler.uint64(u64_accum);
            }
        } else if minus {
            handler.int32(-(u32_accum as i32));
        } else {
            handler.uint32(u32_accum);
        }
        Ok(())
    }
}

/// Streaming JSON writer implementing `Handler` directly, the way the
/// original library's writer is itself the event sink reused to serialize
/// both parsed documents and live RPC calls.
pub struct JsonWriter<'s, S: WriteStream> {
    stream: &'s mut S,
    encoding: Encoding,
    pretty: bool,
    level: i32,
}

impl<'s, S: WriteStream> JsonWriter<'s, S> {
    pub fn new(stream: &'s mut S) -> Self {
        JsonWriter {
            stream,
            encoding: Encoding::Utf8,
            pretty: false,
            level: 0,
        }
    }

    pub fn with_encoding(stream: &'s mut S, encoding: Encoding) -> Self {
        JsonWriter {
            stream,
            encoding,
            pretty: false,
            level: 0,
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn new_line(&mut self) -> Result<()> {
        if self.pretty {
            self.stream.put_byte(b'\n')?;
            for _ in 0..self.level {
                self.stream.put_byte(b'\t')?;
            }
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str) -> Result<()> {
        self.stream.put_byte(b'"')?;
        for c in s.chars() {
            match c {
                '"' => self.stream.put_slice(b"\\\"")?,
                '\\' => self.stream.put_slice(b"\\\\")?,
                '\u{08}' => self.stream.put_slice(b"\\b")?,
                '\u{0C}' => self.stream.put_slice(b"\\f")?,
                '\n' => self.stream.put_slice(b"\\n")?,
                '\r' => self.stream.put_slice(b"\\r")?,
                '\t' => self.stream.put_slice(b"\\t")?,
                c if (c as u32) < 0x20 => {
                    self.stream.put_slice(format!("\\u{:04X}", c as u32).as_bytes())?
                }
                c if self.encoding == Encoding::Ascii && (c as u32) >= 0x80 => {
                    let cp = c as u32;
                    if cp <= 0xFFFF {
                        self.stream.put_slice(format!("\\u{:04X}", cp).as_bytes())?;
                    } else {
                        let s = cp - 0x10000;
                        let lead = (s >> 10) + 0xD800;
                        let trail = (s & 0x3FF) + 0xDC00;
                        self.stream
                            .put_slice(format!("\\u{:04X}\\u{:04X}", lead, trail).as_bytes())?;
                    }
                }
                c => {
                    let mut buf = [0u8; 4];
                    self.stream.put_slice(c.encode_utf8(&mut buf).as_bytes())?
                }
            }
        }
        self.stream.put_byte(b'"')
    }

    /// Formats a double without ever falling back to scientific notation
    /// for ordinary magnitudes, matching `%g`'s common case well enough for
    /// round-tripping RPC numeric arguments.
    fn write_double(&mut self, d: f64) -> Result<()> {
        if d.is_nan() || d.is_infinite() {
            return self.stream.put_slice(b"null");
        }
        let mut s = format!("{}", d);
        if !s.contains('.') && !s.contains('e') && !s.contains('E') {
            s.push_str(".0");
        }
        self.stream.put_slice(s.as_bytes())
    }
}

impl<'s, S: WriteStream> Handler for JsonWriter<'s, S> {
    fn null(&mut self) {
        let _ = self.stream.put_slice(b"null");
    }

    fn boolean(&mut self, b: bool) {
        let _ = self.stream.put_slice(if b { b"true" } else { b"false" });
    }

    fn int32(&mut self, v: i32) {
        let _ = self.stream.put_slice(v.to_string().as_bytes());
    }

    fn uint32(&mut self, v: u32) {
        let _ = self.stream.put_slice(v.to_string().as_bytes());
    }

    fn int64(&mut self, v: i64) {
        let _ = self.stream.put_slice(v.to_string().as_bytes());
    }

    fn uint64(&mut self, v: u64) {
        let _ = self.stream.put_slice(v.to_string().as_bytes());
    }

    fn float(&mut self, v: f32) {
        let _ = self.write_double(v as f64);
    }

    fn double(&mut self, v: f64) {
        let _ = self.write_double(v);
    }

    fn datetime(&mut self, epoch_secs: i64) {
        use chrono::{TimeZone, Utc};
        let ts = Utc
            .timestamp_opt(epoch_secs, 0)
            .single()
            .map(|t| t.format("%Y%m%dT%H:%M:%S").to_string())
            .unwrap_or_default();
        let _ = self.stream.put_byte(b'[');
        let _ = self.write_string(ANYRPC_DATETIME);
        let _ = self.stream.put_byte(b',');
        let _ = self.write_string(&ts);
        let _ = self.stream.put_byte(b']');
    }

    fn string(&mut self, s: &str, _copy: bool) {
        let _ = self.write_string(s);
    }

    fn binary(&mut self, b: &[u8], _copy: bool) {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(b);
        let _ = self.stream.put_byte(b'[');
        let _ = self.write_string(ANYRPC_BASE64);
        let _ = self.stream.put_byte(b',');
        let _ = self.write_string(&encoded);
        let _ = self.stream.put_byte(b']');
    }

    fn start_array(&mut self) {
        let _ = self.new_line();
        let _ = self.stream.put_byte(b'[');
        if self.pretty {
            self.level += 1;
        }
        let _ = self.new_line();
    }

    fn array_separator(&mut self) {
        let _ = self.stream.put_byte(b',');
        let _ = self.new_line();
    }

    fn end_array(&mut self, _count: usize) {
        if self.pretty {
            self.level -= 1;
        }
        let _ = self.new_line();
        let _ = self.stream.put_byte(b']');
    }

    fn start_map(&mut self) {
        let _ = self.new_line();
        let _ = self.stream.put_byte(b'{');
        if self.pretty {
            self.level += 1;
        }
        let _ = self.new_line();
    }

    fn key(&mut self, s: &str, _copy: bool) {
        let _ = self.write_string(s);
        let _ = self.stream.put_byte(b':');
    }

    fn map_separator(&mut self) {
        let _ = self.stream.put_byte(b',');
        let _ = self.new_line();
    }

    fn end_map(&mut self, _count: usize) {
        if self.pretty {
            self.level -= 1;
        }
        let _ = self.new_line();
        let _ = self.stream.put_byte(b'}');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::stream::{ConstStringStream, SegmentedWriteStream};
    use crate::value::Value;

    fn parse(json: &str) -> Value {
        let mut stream = ConstStringStream::new(json.as_bytes());
        let mut reader = JsonReader::new(&mut stream);
        let mut doc = Document::with_extensions();
        reader.parse(&mut doc).unwrap();
        doc.take_value().unwrap()
    }

    #[test]
    fn parses_object_with_mixed_scalars() {
        let v = parse(r#"{"a":1,"b":true,"c":null,"d":[1,2,3],"e":"hi"}"#);
        assert_eq!(v.get("a").unwrap().as_u32().unwrap(), 1);
        assert_eq!(v.get("b").unwrap(), &Value::Bool(true));
        assert_eq!(v.get("c").unwrap(), &Value::Null);
        assert_eq!(v.get("d").unwrap().as_array().unwrap().len(), 3);
        assert_eq!(v.get("e").unwrap().as_str().unwrap(), "hi");
    }

    #[test]
    fn promotes_large_integer_to_uint64() {
        let v = parse("18446744073709551615");
        assert_eq!(v, Value::Uint64(u64::MAX));
    }

    #[test]
    fn parses_negative_and_fraction() {
        let v = parse("-3.5");
        assert_eq!(v.as_f64().unwrap(), -3.5);
    }

    #[test]
    fn decodes_unicode_escape() {
        let v = parse(r#""é""#);
        assert_eq!(v.as_str().unwrap(), "\u{e9}");
    }

    #[test]
    fn decodes_surrogate_pair() {
        let v = parse(r#""😀""#);
        assert_eq!(v.as_str().unwrap(), "\u{1F600}");
    }

    #[test]
    fn round_trips_through_writer() {
        let mut buf = SegmentedWriteStream::new();
        let mut writer = JsonWriter::new(&mut buf);
        writer.start_map();
        writer.key("x", true);
        writer.int32(42);
        writer.end_map(1);
        let bytes = buf.to_vec();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"x":42}"#);
    }
}
