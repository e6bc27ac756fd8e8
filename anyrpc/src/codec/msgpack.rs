//! MessagePack reader/writer.
//!
//! Grounded on
//! `examples/original_source/src/messagepack/messagepackreader.cpp` and
//! `messagepackwriter.cpp`. The reader dispatches on the lead byte the way
//! the original's 256-entry function-pointer table does, expressed here as
//! a `match` over byte ranges instead of a lookup table (no functional
//! difference — `rustc` compiles a dense match to a jump table on its
//! own). Only string keys are accepted for map members, matching the
//! original's deliberate restriction of the otherwise-permissive
//! MessagePack spec.

use crate::document::{ANYRPC_BASE64, ANYRPC_DATETIME};
use crate::error::{AnyRpcError, ErrorKind, Result};
use crate::event::Handler;
use crate::stream::{ReadStream, WriteStream};
use byteorder::{BigEndian, ByteOrder};

pub struct MsgPackReader<'s, S: ReadStream> {
    stream: &'s mut S,
}

impl<'s, S: ReadStream> MsgPackReader<'s, S> {
    pub fn new(stream: &'s mut S) -> Self {
        MsgPackReader { stream }
    }

    pub fn parse<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        handler.start_document();
        let r = self.parse_value(handler);
        handler.end_document();
        r
    }

    fn err(&self, kind: ErrorKind, msg: &str) -> AnyRpcError {
        AnyRpcError::with_offset(kind, msg, self.stream.tell())
    }

    fn terminated(&self) -> AnyRpcError {
        self.err(ErrorKind::Termination, "parsing was terminated")
    }

    fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let buf = self.stream.read(n);
        if buf.len() != n {
            return Err(self.terminated());
        }
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.stream.get().ok_or_else(|| self.terminated())
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(&self.read_exact(2)?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(&self.read_exact(4)?))
    }

    fn read_u64(&mut self) -> Result<u64> {
        Ok(BigEndian::read_u64(&self.read_exact(8)?))
    }

    fn parse_value<H: Handler>(&mut self, handler: &mut H) -> Result<()> {
        let lead = self.read_u8()?;
        match lead {
            0x00..=0x7f => handler.uint32(lead as u32),
            0xe0..=0xff => handler.int32(lead as i8 as i32),
            0x80..=0x8f => self.parse_map(handler, (lead & 0x0f) as usize)?,
            0x90..=0x9f => self.parse_array(handler, (lead & 0x0f) as usize)?,
            0xa0..=0xbf => {
                let s = self.read_str((lead & 0x1f) as usize)?;
                handler.string(&s, true);
            }
            0xc0 => handler.null(),
            0xc1 => return Err(self.err(ErrorKind::ValueInvalid, "invalid value")),
            0xc2 => handler.boolean(false),
            0xc3 => handler.boolean(true),
            0xc4 => {
                let len = self.read_u8()? as usize;
                self.parse_bin(handler, len)?;
            }
            0xc5 => {
                let len = self.read_u16()? as usize;
                self.parse_bin(handler, len)?;
            }
            0xc6 => {
                let len = self.read_u32()? as usize;
                self.parse_bin(handler, len)?;
            }
            // Ext types: the spec has no generic extension mechanism, so a
            // conforming reader recognizes but rejects them rather than
            // silently discarding the type tag.
            0xc7 => {
                let len = self.read_u8()? as usize;
                self.read_u8()?; // ext type tag
                self.stream.skip(len);
                return Err(self.err(ErrorKind::NotImplemented, "ext8 type not supported"));
            }
            0xc8 => {
                let len = self.read_u16()? as usize;
                self.read_u8()?;
                self.stream.skip(len);
                return Err(self.err(ErrorKind::NotImplemented, "ext16 type not supported"));
            }
            0xc9 => {
                let len = self.read_u32()? as usize;
                self.read_u8()?;
                self.stream.skip(len);
                return Err(self.err(ErrorKind::NotImplemented, "ext32 type not supported"));
            }
            0xca => {
                let bits = self.read_u32()?;
                handler.float(f32::from_bits(bits));
            }
            0xcb => {
                let bits = self.read_u64()?;
                handler.double(f64::from_bits(bits));
            }
            0xcc => handler.uint32(self.read_u8()? as u32),
            0xcd => handler.uint32(self.read_u16()? as u32),
            0xce => handler.uint32(self.read_u32()?),
            0xcf => handler.uint64(self.read_u64()?),
            0xd0 => handler.int32(self.read_u8()? as i8 as i32),
            0xd1 => handler.int32(self.read_u16()? as i16 as i32),
            0xd2 => handler.int32(self.read_u32()? as i32),
            0xd3 => handler.int64(self.read_u64()? as i64),
            0xd4 => {
                self.read_u8()?;
                self.stream.skip(1);
                return Err(self.err(ErrorKind::NotImplemented, "fixext1 type not supported"));
            }
            0xd5 => {
                self.read_u8()?;
                self.stream.skip(2);
                return Err(self.err(ErrorKind::NotImplemented, "fixext2 type not supported"));
            }
            0xd6 => {
                self.read_u8()?;
                self.stream.skip(4);
                return Err(self.err(ErrorKind::NotImplemented, "fixext4 type not supported"));
            }
            0xd7 => {
                self.read_u8()?;
                self.stream.skip(8);
                return Err(self.err(ErrorKind::NotImplemented, "fixext8 type not supported"));
            }
            0xd8 => {
                self.read_u8()?;
                self.stream.skip(16);
                return Err(self.err(ErrorKind::NotImplemented, "fixext16 type not supported"));
            }
            0xd9 => {
                let len = self.read_u8()? as usize;
                let s = self.read_str(len)?;
                handler.string(&s, true);
            }
            0xda => {
                let len = self.read_u16()? as usize;
                let s = self.read_str(len)?;
                handler.string(&s, true);
            }
            0xdb => {
                let len = self.read_u32()? as usize;
                let s = self.read_str(len)?;
                handler.string(&s, true);
            }
            0xdc => {
                let len = self.read_u16()? as usize;
                self.parse_array(handler, len)?;
            }
            0xdd => {
                let len = self.read_u32()? as usize;
                self.parse_array(handler, len)?;
            }
            0xde => {
                let len = self.read_u16()? as usize;
                self.parse_map(handler, len)?;
            }
            0xdf => {
                let len = self.read_u32()? as usize;
                self.parse_map(handler, len)?;
            }
        }
        Ok(())
    }

    fn read_str(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_exact(len)?;
        String::from_utf8(bytes).map_err(|e| e.utf8_error().into())
    }

    fn parse_bin<H: Handler>(&mut self, handler: &mut H, len: usize) -> Result<()> {
        let bytes = self.read_exact(len)?;
        handler.binary(&bytes, true);
        Ok(())
    }

    fn parse_array<H: Handler>(&mut self, handler: &mut H, len: usize) -> Result<()> {
        handler.start_array();
        for i in 0..len {
            self.parse_value(handler)?;
            if i != len.saturating_sub(1) {
                handler.array_separator();
            }
        }
        handler.end_array(len);
        Ok(())
    }

    /// Only string keys (fixstr/str8/str16/str32) are accepted, matching the
    /// original's deliberate restriction of the otherwise type-open
    /// MessagePack map key.
    fn parse_key(&mut self) -> Result<String> {
        let lead = self.read_u8()?;
        let len = match lead {
            0xa0..=0xbf => (lead & 0x1f) as usize,
            0xd9 => self.read_u8()? as usize,
            0xda => self.read_u16()? as usize,
            0xdb => self.read_u32()? as usize,
            _ => return Err(self.err(ErrorKind::ValueInvalid, "invalid value")),
        };
        self.read_str(len)
    }

    fn parse_map<H: Handler>(&mut self, handler: &mut H, len: usize) -> Result<()> {
        handler.start_map();
        for i in 0..len {
            let key = self.parse_key()?;
            handler.key(&key, true);
            self.parse_value(handler)?;
            if i != len.saturating_sub(1) {
                handler.map_separator();
            }
        }
        handler.end_map(len);
        Ok(())
    }
}

/// MessagePack writer implementing `Handler` directly, choosing the
/// narrowest wire representation for each value the way the original
/// writer's `WriteUint`/`WriteUint64`/`Int`/`Int64` do.
///
/// Unlike JSON/XML-RPC, MessagePack's array/map headers are length-prefixed
/// rather than terminated, but `Handler::start_array`/`start_map` carry no
/// count. Rather than widen the shared trait for one codec, each open
/// container's encoded bytes are accumulated into a scratch buffer and the
/// header (now knowing the count from `end_array`/`end_map`) is written
/// just ahead of it when the container closes.
pub struct MsgPackWriter<'s, S: WriteStream> {
    stream: &'s mut S,
    buffers: Vec<Vec<u8>>,
}

impl<'s, S: WriteStream> MsgPackWriter<'s, S> {
    pub fn new(stream: &'s mut S) -> Self {
        MsgPackWriter {
            stream,
            buffers: Vec::new(),
        }
    }

    fn emit(&mut self, bytes: &[u8]) {
        match self.buffers.last_mut() {
            Some(buf) => buf.extend_from_slice(bytes),
            None => {
                let _ = self.stream.put_slice(bytes);
            }
        }
    }

    fn emit_byte(&mut self, b: u8) {
        match self.buffers.last_mut() {
            Some(buf) => buf.push(b),
            None => {
                let _ = self.stream.put_byte(b);
            }
        }
    }

    fn write_uint(&mut self, u: u32) {
        if u < (1 << 7) {
            self.emit_byte(u as u8);
        } else if u < (1 << 8) {
            self.emit_byte(0xcc);
            self.emit_byte(u as u8);
        } else if u < (1 << 16) {
            self.emit_byte(0xcd);
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, u as u16);
            self.emit(&buf);
        } else {
            self.emit_byte(0xce);
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, u);
            self.emit(&buf);
        }
    }

    fn write_uint64(&mut self, u: u64) {
        if u < (1 << 32) {
            self.write_uint(u as u32);
        } else {
            self.emit_byte(0xcf);
            let mut buf = [0u8; 8];
            BigEndian::write_u64(&mut buf, u);
            self.emit(&buf);
        }
    }

    fn write_str(&mut self, s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.len();
        if len < 32 {
            self.emit_byte(0xa0 | len as u8);
        } else if len < 256 {
            self.emit_byte(0xd9);
            self.emit_byte(len as u8);
        } else if len < 65536 {
            self.emit_byte(0xda);
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, len as u16);
            self.emit(&buf);
        } else {
            self.emit_byte(0xdb);
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, len as u32);
            self.emit(&buf);
        }
        self.emit(bytes);
    }

    fn write_array_header(&mut self, count: usize) {
        if count < 16 {
            self.emit_byte(0x90 | count as u8);
        } else if count < 65536 {
            self.emit_byte(0xdc);
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, count as u16);
            self.emit(&buf);
        } else {
            self.emit_byte(0xdd);
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, count as u32);
            self.emit(&buf);
        }
    }

    fn write_map_header(&mut self, count: usize) {
        if count < 16 {
            self.emit_byte(0x80 | count as u8);
        } else if count < 65536 {
            self.emit_byte(0xde);
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, count as u16);
            self.emit(&buf);
        } else {
            self.emit_byte(0xdf);
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, count as u32);
            self.emit(&buf);
        }
    }

    /// Writes a complete array given its element count up front, for
    /// building RPC envelopes (`[0, id, method, params]`) in one call.
    pub fn write_array(&mut self, count: usize, mut write_elements: impl FnMut(&mut Self)) {
        self.start_array();
        write_elements(self);
        self.end_array(count);
    }

    pub fn write_map(&mut self, count: usize, mut write_entries: impl FnMut(&mut Self)) {
        self.start_map();
        write_entries(self);
        self.end_map(count);
    }
}

impl<'s, S: WriteStream> Handler for MsgPackWriter<'s, S> {
    fn null(&mut self) {
        self.emit_byte(0xc0);
    }

    fn boolean(&mut self, b: bool) {
        self.emit_byte(if b { 0xc3 } else { 0xc2 });
    }

    fn int32(&mut self, v: i32) {
        if v >= -32 && v < 128 {
            self.emit_byte(v as i8 as u8);
        } else if v >= i16::MIN as i32 && v <= i16::MAX as i32 {
            if v >= i8::MIN as i32 && v <= i8::MAX as i32 {
                self.emit_byte(0xd0);
                self.emit_byte(v as i8 as u8);
            } else {
                self.emit_byte(0xd1);
                let mut buf = [0u8; 2];
                BigEndian::write_i16(&mut buf, v as i16);
                self.emit(&buf);
            }
        } else if v >= 0 {
            self.write_uint(v as u32);
        } else {
            self.emit_byte(0xd2);
            let mut buf = [0u8; 4];
            BigEndian::write_i32(&mut buf, v);
            self.emit(&buf);
        }
    }

    fn uint32(&mut self, v: u32) {
        self.write_uint(v);
    }

    fn int64(&mut self, v: i64) {
        if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            self.int32(v as i32);
        } else if v >= 0 {
            self.write_uint64(v as u64);
        } else {
            self.emit_byte(0xd3);
            let mut buf = [0u8; 8];
            BigEndian::write_i64(&mut buf, v);
            self.emit(&buf);
        }
    }

    fn uint64(&mut self, v: u64) {
        self.write_uint64(v);
    }

    fn float(&mut self, v: f32) {
        self.emit_byte(0xca);
        let mut buf = [0u8; 4];
        BigEndian::write_u32(&mut buf, v.to_bits());
        self.emit(&buf);
    }

    fn double(&mut self, v: f64) {
        self.emit_byte(0xcb);
        let mut buf = [0u8; 8];
        BigEndian::write_u64(&mut buf, v.to_bits());
        self.emit(&buf);
    }

    fn datetime(&mut self, epoch_secs: i64) {
        use chrono::{TimeZone, Utc};
        let ts = Utc
            .timestamp_opt(epoch_secs, 0)
            .single()
            .map(|t| t.format("%Y%m%dT%H:%M:%S").to_string())
            .unwrap_or_default();
        self.write_array(2, |w| {
            w.write_str(ANYRPC_DATETIME);
            w.write_str(&ts);
        });
    }

    fn string(&mut self, s: &str, _copy: bool) {
        self.write_str(s);
    }

    fn binary(&mut self, b: &[u8], _copy: bool) {
        let len = b.len();
        if len < 256 {
            self.emit_byte(0xc4);
            self.emit_byte(len as u8);
        } else if len < 65536 {
            self.emit_byte(0xc5);
            let mut buf = [0u8; 2];
            BigEndian::write_u16(&mut buf, len as u16);
            self.emit(&buf);
        } else {
            self.emit_byte(0xc6);
            let mut buf = [0u8; 4];
            BigEndian::write_u32(&mut buf, len as u32);
            self.emit(&buf);
        }
        self.emit(b);
    }

    fn start_array(&mut self) {
        self.buffers.push(Vec::new());
    }

    fn array_separator(&mut self) {}

    fn end_array(&mut self, count: usize) {
        let body = self.buffers.pop().unwrap_or_default();
        self.write_array_header(count);
        self.emit(&body);
    }

    fn start_map(&mut self) {
        self.buffers.push(Vec::new());
    }

    fn key(&mut self, s: &str, _copy: bool) {
        self.write_str(s);
    }

    fn map_separator(&mut self) {}

    fn end_map(&mut self, count: usize) {
        let body = self.buffers.pop().unwrap_or_default();
        self.write_map_header(count);
        self.emit(&body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::stream::{ConstStringStream, SegmentedWriteStream};
    use crate::value::Value;

    #[test]
    fn round_trips_fixarray_of_ints() {
        let mut buf = SegmentedWriteStream::new();
        {
            let mut w = MsgPackWriter::new(&mut buf);
            w.write_array(3, |w| {
                w.int32(1);
                w.int32(2);
                w.int32(-1);
            });
        }
        let bytes = buf.to_vec();
        let mut stream = ConstStringStream::new(bytes);
        let mut reader = MsgPackReader::new(&mut stream);
        let mut doc = Document::new();
        reader.parse(&mut doc).unwrap();
        let v = doc.take_value().unwrap();
        let arr = v.as_array().unwrap();
        assert_eq!(arr.len(), 3);
        assert_eq!(arr[2], Value::Int32(-1));
    }

    #[test]
    fn round_trips_map_with_string_key() {
        let mut buf = SegmentedWriteStream::new();
        {
            let mut w = MsgPackWriter::new(&mut buf);
            w.write_map(1, |w| {
                w.key("ok", true);
                w.boolean(true);
            });
        }
        let bytes = buf.to_vec();
        let mut stream = ConstStringStream::new(bytes);
        let mut reader = MsgPackReader::new(&mut stream);
        let mut doc = Document::new();
        reader.parse(&mut doc).unwrap();
        let v = doc.take_value().unwrap();
        assert_eq!(v.get("ok").unwrap(), &Value::Bool(true));
    }

    #[test]
    fn round_trips_nested_array() {
        let mut buf = SegmentedWriteStream::new();
        {
            let mut w = MsgPackWriter::new(&mut buf);
            w.write_array(2, |w| {
                w.write_array(2, |w| {
                    w.int32(1);
                    w.int32(2);
                });
                w.string("tail", true);
            });
        }
        let bytes = buf.to_vec();
        let mut stream = ConstStringStream::new(bytes);
        let mut reader = MsgPackReader::new(&mut stream);
        let mut doc = Document::new();
        reader.parse(&mut doc).unwrap();
        let v = doc.take_value().unwrap();
        let outer = v.as_array().unwrap();
        assert_eq!(outer.len(), 2);
        assert_eq!(outer[0].as_array().unwrap().len(), 2);
        assert_eq!(outer[1].as_str().unwrap(), "tail");
    }

    #[test]
    fn rejects_ext_type() {
        let bytes = vec![0xd4, 0x01, 0x00]; // fixext1
        let mut stream = ConstStringStream::new(bytes);
        let mut reader = MsgPackReader::new(&mut stream);
        let mut doc = Document::new();
        assert!(reader.parse(&mut doc).is_err());
    }
}
