//! XML-RPC reader/writer.
//!
//! Grounded on `examples/original_source/src/xml/xmlreader.cpp` and
//! `xmlwriter.cpp`. The reader is tag-driven recursive descent: `next_tag`
//! tokenizes `<tag>`/`</tag>`/`<tag/>` without a general XML parser, exactly
//! like the original (this format never needs attributes, namespaces, or
//! comments, so a full XML parser would be overkill for the subset the
//! protocol actually uses).

use crate::error::{AnyRpcError, ErrorKind, Result};
use crate::event::Handler;
use crate::stream::{ReadStream, WriteStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Value,
    ValueEnd,
    ValueEmpty,
    Boolean,
    BooleanEnd,
    Double,
    DoubleEnd,
    Int,
    IntEnd,
    I4,
    I4End,
    I8,
    I8End,
    StringTag,
    StringEnd,
    StringEmpty,
    Empty,
    DateTime,
    DateTimeEnd,
    Base64,
    Base64End,
    Base64Empty,
    Nil,
    NilEmpty,
    Array,
    ArrayEnd,
    Data,
    DataEnd,
    DataEmpty,
    Struct,
    StructEnd,
    StructEmpty,
    Member,
    MemberEnd,
    Name,
    NameEnd,
    MethodCall,
    MethodName,
    MethodNameEnd,
    MethodResponse,
    MethodResponseEnd,
    Params,
    ParamsEnd,
    ParamsEmpty,
    Param,
    ParamEnd,
    Fault,
    FaultEnd,
    Invalid,
}

const TAG_NAMES: &[(&str, Tag, Tag, Tag)] = &[
    ("value", Tag::Value, Tag::ValueEnd, Tag::ValueEmpty),
    ("boolean", Tag::Boolean, Tag::BooleanEnd, Tag::Invalid),
    ("double", Tag::Double, Tag::DoubleEnd, Tag::Invalid),
    ("int", Tag::Int, Tag::IntEnd, Tag::Invalid),
    ("i4", Tag::I4, Tag::I4End, Tag::Invalid),
    ("i8", Tag::I8, Tag::I8End, Tag::Invalid),
    ("string", Tag::StringTag, Tag::StringEnd, Tag::StringEmpty),
    ("dateTime.iso8601", Tag::DateTime, Tag::DateTimeEnd, Tag::Invalid),
    ("base64", Tag::Base64, Tag::Base64End, Tag::Base64Empty),
    ("nil", Tag::Invalid, Tag::Invalid, Tag::Nil),
    ("array", Tag::Array, Tag::ArrayEnd, Tag::Invalid),
    ("data", Tag::Data, Tag::DataEnd, Tag::DataEmpty),
    ("struct", Tag::Struct, Tag::StructEnd, Tag::StructEmpty),
    ("member", Tag::Member, Tag::MemberEnd, Tag::Invalid),
    ("name", Tag::Name, Tag::NameEnd, Tag::Invalid),
    ("methodCall", Tag::MethodCall, Tag::Invalid, Tag::Invalid),
    ("methodName", Tag::MethodName, Tag::MethodNameEnd, Tag::Invalid),
    ("methodResponse", Tag::MethodResponse, Tag::MethodResponseEnd, Tag::Invalid),
    ("params", Tag::Params, Tag::ParamsEnd, Tag::ParamsEmpty),
    ("param", Tag::Param, Tag::ParamEnd, Tag::Invalid),
    ("fault", Tag::Fault, Tag::FaultEnd, Tag::Invalid),
];

pub struct XmlRpcReader<'s, S: ReadStream> {
    stream: &'s mut S,
    /// The tokenizer over-reads one `<` look-ahead on an unrecognized
    /// bare-string value; this records that the next `next_tag` call should
    /// skip re-reading it, mirroring `tagSkipFirstChar_` upstream.
    skip_first_char: bool,
}

impl<'s, S: ReadStream> XmlRpcReader<'s, S> {
    pub fn new(stream: &'s mut S) -> Self {
        XmlRpcReader {
            stream,
            skip_first_char: false,
        }
    }

    fn err(&self, kind: ErrorKind, msg: &str) -> AnyRpcError {
        AnyRpcError::with_offset(kind, msg, self.stream.tell())
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.stream.peek() {
            if b.is_ascii_whitespace() {
                self.stream.get();
            } else {
                break;
            }
        }
    }

    fn next_tag(&mut self) -> Result<Tag> {
        if !self.skip_first_char {
            self.skip_whitespace();
            if self.stream.peek() != Some(b'<') {
                return Ok(Tag::Empty);
            }
            self.stream.get();
        }
        self.skip_first_char = false;

        let mut end_tag = false;
        if self.stream.peek() == Some(b'/') {
            self.stream.get();
            end_tag = true;
        }

        let mut name = Vec::new();
        let mut empty_tag = false;
        loop {
            let c = self
                .stream
                .get()
                .ok_or_else(|| self.err(ErrorKind::Termination, "parsing was terminated"))?;
            if c == b'>' {
                break;
            }
            if c == b'/' {
                if end_tag || self.stream.get() != Some(b'>') {
                    return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
                }
                empty_tag = true;
                break;
            }
            name.push(c);
            if name.len() >= 100 {
                return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
            }
        }

        let name = String::from_utf8_lossy(&name);
        for (tag_name, start, end, empty) in TAG_NAMES {
            if *tag_name == name {
                return Ok(if end_tag {
                    *end
                } else if empty_tag {
                    *empty
                } else {
                    *start
                });
            }
        }
        Ok(Tag::Invalid)
    }

    pub fn parse_method(&mut self) -> Result<String> {
        loop {
            let tag = self.next_tag()?;
            if tag == Tag::MethodName {
                break;
            }
            if tag == Tag::Empty {
                return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
            }
        }
        let name = self.parse_string_data()?;
        if self.next_tag()? != Tag::MethodNameEnd {
            return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
        }
        Ok(name)
    }

    pub fn parse_params<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        handler.start_document();
        let r = self.parse_params_inner(handler, false);
        handler.end_document();
        r
    }

    fn parse_params_inner<H: Handler>(&mut self, handler: &mut H, params_tag_parsed: bool) -> Result<()> {
        handler.start_array();
        if !params_tag_parsed {
            match self.next_tag()? {
                Tag::ParamsEmpty => {
                    handler.end_array(0);
                    return Ok(());
                }
                Tag::Params => {}
                _ => return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag")),
            }
        }
        let mut count = 0usize;
        loop {
            match self.next_tag()? {
                Tag::Param => {
                    if count != 0 {
                        handler.array_separator();
                    }
                    match self.next_tag()? {
                        Tag::Value => self.parse_value(handler, true)?,
                        Tag::ValueEmpty => self.parse_empty_string(handler),
                        _ => return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag")),
                    }
                    if self.next_tag()? != Tag::ParamEnd {
                        return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
                    }
                    count += 1;
                }
                Tag::ParamsEnd => {
                    handler.end_array(count);
                    return Ok(());
                }
                _ => return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag")),
            }
        }
    }

    pub fn parse_response<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        handler.start_document();
        let r = self.parse_response_inner(handler);
        handler.end_document();
        r
    }

    fn parse_response_inner<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        self.next_tag()?; // <?xml ...?> declaration, not validated
        if self.next_tag()? != Tag::MethodResponse {
            return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
        }
        match self.next_tag()? {
            Tag::Params => {
                self.parse_params_inner(handler, true)?;
                if self.next_tag()? != Tag::MethodResponseEnd {
                    return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
                }
            }
            Tag::ParamsEmpty => handler.null(),
            Tag::Fault => {
                self.parse_value(handler, false)?;
                let closing = self.next_tag()?;
                if closing != Tag::FaultEnd && closing != Tag::MethodResponseEnd {
                    return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
                }
            }
            _ => return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag")),
        }
        Ok(())
    }

    fn parse_value<H: Handler>(&mut self, handler: &mut H, value_tag_parsed: bool) -> Result<()> {
        let mut tag = if value_tag_parsed {
            self.next_tag()?
        } else {
            let t = self.next_tag()?;
            if t == Tag::ValueEmpty {
                self.parse_empty_string(handler);
                return Ok(());
            }
            if t != Tag::Value {
                return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
            }
            self.next_tag()?
        };

        match tag {
            Tag::Nil => handler.null(),
            Tag::Boolean => self.parse_boolean(handler)?,
            Tag::Int | Tag::I4 | Tag::I8 | Tag::Double => self.parse_number(handler, tag)?,
            Tag::StringTag => self.parse_tagged_string(handler, true)?,
            Tag::StringEmpty | Tag::Empty => self.parse_empty_string(handler),
            Tag::Array => self.parse_array(handler)?,
            Tag::Struct => self.parse_map(handler)?,
            Tag::DateTime => self.parse_datetime(handler)?,
            Tag::Base64 => self.parse_base64(handler)?,
            Tag::Base64Empty => handler.binary(&[], true),
            Tag::ValueEnd => {
                self.parse_empty_string(handler);
                tag = Tag::ValueEnd;
            }
            _ => return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag")),
        }

        if tag != Tag::ValueEnd && self.next_tag()? != Tag::ValueEnd {
            return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
        }
        Ok(())
    }

    fn parse_boolean<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        let c = self
            .stream
            .get()
            .ok_or_else(|| self.err(ErrorKind::Termination, "parsing was terminated"))?;
        let value = match c {
            b'0' => false,
            b'1' => true,
            _ => return Err(self.err(ErrorKind::Termination, "parsing was terminated")),
        };
        if self.next_tag()? != Tag::BooleanEnd {
            return Err(self.err(ErrorKind::Termination, "parsing was terminated"));
        }
        handler.boolean(value);
        Ok(())
    }

    fn parse_number<H: Handler>(&mut self, handler: &mut H, tag: Tag) -> Result<()> {
        let text = self.parse_string_data()?;
        let expect_end = match tag {
            Tag::Int => Tag::IntEnd,
            Tag::I4 => Tag::I4End,
            Tag::I8 => Tag::I8End,
            Tag::Double => Tag::DoubleEnd,
            _ => unreachable!(),
        };
        if self.next_tag()? != expect_end {
            return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
        }

        if tag == Tag::Double || text.contains('.') || text.contains('e') || text.contains('E') {
            let v: f64 = text
                .parse()
                .map_err(|_| self.err(ErrorKind::ValueInvalid, "invalid value"))?;
            handler.double(v);
        } else if let Ok(v) = text.parse::<i32>() {
            handler.int32(v);
        } else if let Ok(v) = text.parse::<u32>() {
            handler.uint32(v);
        } else if let Ok(v) = text.parse::<i64>() {
            handler.int64(v);
        } else if let Ok(v) = text.parse::<u64>() {
            handler.uint64(v);
        } else {
            return Err(self.err(ErrorKind::NumberTooBig, "number too big to be stored"));
        }
        Ok(())
    }

    fn parse_empty_string<H: Handler>(&mut self, handler: &mut H) {
        handler.string("", true);
    }

    fn parse_tagged_string<H: Handler>(&mut self, handler: &mut H, is_string_tag: bool) -> Result<()> {
        let text = self.parse_string_data()?;
        if is_string_tag && self.next_tag()? != Tag::StringEnd {
            return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
        }
        handler.string(&text, true);
        Ok(())
    }

    fn parse_key<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        if self.next_tag()? != Tag::Name {
            return Err(self.err(ErrorKind::ValueInvalid, "invalid value"));
        }
        let text = self.parse_string_data()?;
        if self.next_tag()? != Tag::NameEnd {
            return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
        }
        handler.key(&text, true);
        Ok(())
    }

    /// Consumes raw character data up to (but not including) the next `<`,
    /// decoding entity references and numeric character references.
    fn parse_string_data(&mut self) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.stream.peek() {
                Some(b'<') => return Ok(out),
                Some(b'&') => {
                    self.stream.get();
                    let mut encoded = Vec::new();
                    loop {
                        let c = self
                            .stream
                            .get()
                            .ok_or_else(|| self.err(ErrorKind::ValueInvalid, "invalid value"))?;
                        if c == b';' {
                            break;
                        }
                        encoded.push(c);
                        if encoded.len() >= 100 {
                            return Err(self.err(ErrorKind::StringEscapeInvalid, "invalid escape character in string"));
                        }
                    }
                    if encoded.is_empty() {
                        return Err(self.err(ErrorKind::StringEscapeInvalid, "invalid escape character in string"));
                    }
                    let codepoint = if encoded[0] == b'#' {
                        let rest = &encoded[1..];
                        if rest.first() == Some(&b'x') {
                            u32::from_str_radix(std::str::from_utf8(&rest[1..]).unwrap_or(""), 16)
                                .map_err(|_| self.err(ErrorKind::StringUnicodeEscapeInvalid, "unicode escape sequence invalid"))?
                        } else {
                            std::str::from_utf8(rest)
                                .ok()
                                .and_then(|s| s.parse::<u32>().ok())
                                .ok_or_else(|| self.err(ErrorKind::StringUnicodeEscapeInvalid, "unicode escape sequence invalid"))?
                        }
                    } else {
                        match encoded.as_slice() {
                            b"lt" => '<' as u32,
                            b"gt" => '>' as u32,
                            b"amp" => '&' as u32,
                            b"apos" => '\'' as u32,
                            b"quot" => '"' as u32,
                            _ => {
                                return Err(self.err(
                                    ErrorKind::StringEscapeInvalid,
                                    "invalid escape character in string",
                                ))
                            }
                        }
                    };
                    out.push(char::from_u32(codepoint).unwrap_or('\u{FFFD}'));
                }
                Some(_) => out.push(self.stream.get().unwrap() as char),
                None => return Err(self.err(ErrorKind::ValueInvalid, "invalid value")),
            }
        }
    }

    fn parse_map<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        handler.start_map();
        let mut count = 0usize;
        loop {
            match self.next_tag()? {
                Tag::Member => {
                    if count != 0 {
                        handler.map_separator();
                    }
                    self.parse_key(handler)?;
                    self.parse_value(handler, false)?;
                    if self.next_tag()? != Tag::MemberEnd {
                        return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
                    }
                    count += 1;
                }
                Tag::StructEnd => {
                    handler.end_map(count);
                    return Ok(());
                }
                _ => return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag")),
            }
        }
    }

    fn parse_array<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        let next = self.next_tag()?;
        if next == Tag::DataEmpty {
            handler.start_array();
            handler.end_array(0);
            if self.next_tag()? != Tag::ArrayEnd {
                return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
            }
            return Ok(());
        }
        if next != Tag::Data {
            return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
        }

        handler.start_array();
        let mut count = 0usize;
        loop {
            match self.next_tag()? {
                Tag::Value => {
                    if count != 0 {
                        handler.array_separator();
                    }
                    self.parse_value(handler, true)?;
                    count += 1;
                }
                Tag::ValueEmpty => {
                    self.parse_empty_string(handler);
                    count += 1;
                }
                Tag::DataEnd => {
                    handler.end_array(count);
                    if self.next_tag()? != Tag::ArrayEnd {
                        return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
                    }
                    return Ok(());
                }
                _ => return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag")),
            }
        }
    }

    fn parse_datetime<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        let text = self.parse_string_data()?;
        if self.next_tag()? != Tag::DateTimeEnd {
            return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
        }
        use chrono::NaiveDateTime;
        let naive = NaiveDateTime::parse_from_str(&text, "%Y%m%dT%H:%M:%S")
            .map_err(|_| self.err(ErrorKind::Termination, "parsing was terminated"))?;
        handler.datetime(naive.and_utc().timestamp());
        Ok(())
    }

    fn parse_base64<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        use base64::Engine;
        let text = self.parse_string_data()?;
        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let bin = base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .map_err(|_| self.err(ErrorKind::Base64Invalid, "error during base64 decode"))?;
        if self.next_tag()? != Tag::Base64End {
            return Err(self.err(ErrorKind::TagInvalid, "parse error with xml tag"));
        }
        handler.binary(&bin, true);
        Ok(())
    }
}

/// XML-RPC writer implementing `Handler` directly.
pub struct XmlRpcWriter<'s, S: WriteStream> {
    stream: &'s mut S,
    pretty: bool,
    level: i32,
}

impl<'s, S: WriteStream> XmlRpcWriter<'s, S> {
    pub fn new(stream: &'s mut S) -> Self {
        XmlRpcWriter {
            stream,
            pretty: false,
            level: 0,
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    fn start_line(&mut self) {
        if self.pretty {
            let _ = self.stream.put_byte(b'\n');
            for _ in 0..self.level {
                let _ = self.stream.put_byte(b'\t');
            }
        }
    }

    fn start_token(&mut self, tok: &str) {
        let _ = self.stream.put_slice(tok.as_bytes());
        if self.pretty {
            self.level += 1;
        }
    }

    fn end_token(&mut self, tok: &str) {
        if self.pretty {
            self.level -= 1;
            self.start_line();
        }
        let _ = self.stream.put_slice(tok.as_bytes());
    }

    fn write_string_data(&mut self, s: &str) {
        for c in s.chars() {
            match c {
                '<' => { let _ = self.stream.put_slice(b"&lt;"); }
                '>' => { let _ = self.stream.put_slice(b"&gt;"); }
                '&' => { let _ = self.stream.put_slice(b"&amp;"); }
                '\'' => { let _ = self.stream.put_slice(b"&apos;"); }
                '"' => { let _ = self.stream.put_slice(b"&quot;"); }
                c if (c as u32) < 0x20 && c != '\t' && c != '\n' && c != '\r' => {
                    let _ = self.stream.put_slice(format!("&#x{:X};", c as u32).as_bytes());
                }
                c => {
                    let mut buf = [0u8; 4];
                    let _ = self.stream.put_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    /// Envelope helpers for the RPC layer (spec.md §6.2).
    pub fn write_method_call(&mut self, method: &str, mut write_params: impl FnMut(&mut Self)) {
        let _ = self
            .stream
            .put_slice(b"<?xml version=\"1.0\" encoding=\"utf-8\" ?><methodCall><methodName>");
        self.write_string_data(method);
        let _ = self.stream.put_slice(b"</methodName>");
        write_params(self);
        let _ = self.stream.put_slice(b"</methodCall>");
    }

    pub fn write_method_response(&mut self, mut write_value: impl FnMut(&mut Self)) {
        let _ = self
            .stream
            .put_slice(b"<?xml version=\"1.0\" encoding=\"utf-8\" ?><methodResponse>");
        write_value(self);
        let _ = self.stream.put_slice(b"</methodResponse>");
    }

    pub fn write_fault_response(&mut self, mut write_fault_value: impl FnMut(&mut Self)) {
        let _ = self
            .stream
            .put_slice(b"<?xml version=\"1.0\" encoding=\"utf-8\" ?><methodResponse><fault>");
        write_fault_value(self);
        let _ = self.stream.put_slice(b"</fault></methodResponse>");
    }

    pub fn write_params_wrapper(&mut self, mut write_array_contents: impl FnMut(&mut Self)) {
        let _ = self.stream.put_slice(b"<params>");
        write_array_contents(self);
        let _ = self.stream.put_slice(b"</params>");
    }

    /// `<param>...</param>` with no outer `<params>` wrapper, for writing
    /// several positional arguments inside one `write_params_wrapper` call.
    pub fn write_param(&mut self, mut write_value: impl FnMut(&mut Self)) {
        let _ = self.stream.put_slice(b"<param>");
        write_value(self);
        let _ = self.stream.put_slice(b"</param>");
    }

    /// `<params><param>...</param></params>` around a single response value,
    /// matching `XmlGenerateResponse`'s envelope for a non-multicall reply.
    pub fn write_single_param(&mut self, mut write_value: impl FnMut(&mut Self)) {
        let _ = self.stream.put_slice(b"<params><param>");
        write_value(self);
        let _ = self.stream.put_slice(b"</param></params>");
    }
}

impl<'s, S: WriteStream> Handler for XmlRpcWriter<'s, S> {
    fn null(&mut self) {
        let _ = self.stream.put_slice(b"<value><nil/></value>");
    }

    fn boolean(&mut self, b: bool) {
        let _ = self
            .stream
            .put_slice(if b { b"<value><boolean>1</boolean></value>" } else { b"<value><boolean>0</boolean></value>" });
    }

    fn int32(&mut self, v: i32) {
        let _ = self.stream.put_slice(b"<value><i4>");
        let _ = self.stream.put_slice(v.to_string().as_bytes());
        let _ = self.stream.put_slice(b"</i4></value>");
    }

    fn uint32(&mut self, v: u32) {
        let _ = self.stream.put_slice(b"<value><i4>");
        let _ = self.stream.put_slice(v.to_string().as_bytes());
        let _ = self.stream.put_slice(b"</i4></value>");
    }

    fn int64(&mut self, v: i64) {
        let _ = self.stream.put_slice(b"<value><i8>");
        let _ = self.stream.put_slice(v.to_string().as_bytes());
        let _ = self.stream.put_slice(b"</i8></value>");
    }

    fn uint64(&mut self, v: u64) {
        let _ = self.stream.put_slice(b"<value><i8>");
        let _ = self.stream.put_slice(v.to_string().as_bytes());
        let _ = self.stream.put_slice(b"</i8></value>");
    }

    fn float(&mut self, v: f32) {
        self.double(v as f64);
    }

    fn double(&mut self, v: f64) {
        let _ = self.stream.put_slice(b"<value><double>");
        let _ = self.stream.put_slice(format!("{}", v).as_bytes());
        let _ = self.stream.put_slice(b"</double></value>");
    }

    fn datetime(&mut self, epoch_secs: i64) {
        use chrono::{TimeZone, Utc};
        let ts = Utc
            .timestamp_opt(epoch_secs, 0)
            .single()
            .map(|t| t.format("%Y%m%dT%H:%M:%S").to_string())
            .unwrap_or_default();
        let _ = self.stream.put_slice(b"<value><dateTime.iso8601>");
        let _ = self.stream.put_slice(ts.as_bytes());
        let _ = self.stream.put_slice(b"</dateTime.iso8601></value>");
    }

    fn string(&mut self, s: &str, _copy: bool) {
        let _ = self.stream.put_slice(b"<value>");
        self.write_string_data(s);
        let _ = self.stream.put_slice(b"</value>");
    }

    fn binary(&mut self, b: &[u8], _copy: bool) {
        use base64::Engine;
        let _ = self.stream.put_slice(b"<value><base64>");
        let encoded = base64::engine::general_purpose::STANDARD.encode(b);
        let _ = self.stream.put_slice(encoded.as_bytes());
        let _ = self.stream.put_slice(b"</base64></value>");
    }

    fn start_array(&mut self) {
        self.start_line();
        self.start_token("<value><array><data>");
    }

    fn array_separator(&mut self) {
        self.start_line();
    }

    fn end_array(&mut self, _count: usize) {
        self.end_token("</data></array></value>");
    }

    fn start_map(&mut self) {
        self.start_line();
        self.start_token("<value><struct>");
    }

    fn key(&mut self, s: &str, _copy: bool) {
        self.start_line();
        self.start_token("<member>");
        self.start_line();
        let _ = self.stream.put_slice(b"<name>");
        self.write_string_data(s);
        let _ = self.stream.put_slice(b"</name>");
        self.start_line();
    }

    fn map_separator(&mut self) {
        self.end_token("</member>");
    }

    fn end_map(&mut self, count: usize) {
        if count > 0 {
            self.end_token("</member>");
        }
        self.end_token("</struct></value>");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::stream::{ConstStringStream, SegmentedWriteStream};

    #[test]
    fn parses_method_call_and_params() {
        let xml = r#"<?xml version="1.0"?><methodCall><methodName>add</methodName><params><param><value><i4>1</i4></value></param><param><value><i4>2</i4></value></param></params></methodCall>"#;
        let mut stream = ConstStringStream::new(xml.as_bytes());
        let mut reader = XmlRpcReader::new(&mut stream);
        let name = reader.parse_method().unwrap();
        assert_eq!(name, "add");
        let mut doc = Document::new();
        reader.parse_params(&mut doc).unwrap();
        let v = doc.take_value().unwrap();
        assert_eq!(v.as_array().unwrap().len(), 2);
    }

    #[test]
    fn parses_struct_response() {
        let xml = r#"<?xml version="1.0"?><methodResponse><params><param><value><struct><member><name>ok</name><value><boolean>1</boolean></value></member></struct></value></param></params></methodResponse>"#;
        let mut stream = ConstStringStream::new(xml.as_bytes());
        let mut reader = XmlRpcReader::new(&mut stream);
        let mut doc = Document::new();
        reader.parse_response(&mut doc).unwrap();
        let v = doc.take_value().unwrap();
        let params = v.as_array().unwrap();
        assert_eq!(params[0].get("ok").unwrap(), &crate::value::Value::Bool(true));
    }

    #[test]
    fn writes_method_call_envelope() {
        let mut buf = SegmentedWriteStream::new();
        {
            let mut writer = XmlRpcWriter::new(&mut buf);
            writer.write_method_call("add", |w| {
                w.write_params_wrapper(|w| {
                    w.int32(1);
                    w.int32(2);
                });
            });
        }
        let out = String::from_utf8(buf.to_vec()).unwrap();
        assert!(out.contains("<methodName>add</methodName>"));
        assert!(out.contains("<params>"));
    }
}
