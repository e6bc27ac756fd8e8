//! Push-parsing event sink ("SAX-style" handler), shared by every codec
//! reader (as a source of calls) and writer / `Document` (as an
//! implementation). Grounded on
//! `examples/original_source/include/anyrpc/handler.h`.

/// Event sink. A reader drives a `Handler` with a totally ordered event
/// sequence: `start_document, value, end_document` where `value` is one of
/// the scalar events or a properly bracketed array/map sequence (spec.md
/// §4.2). `end_array`/`end_map` carry the element/member count; a
/// conforming reader must have emitted exactly that many elements/members
/// between the matching start and end events.
pub trait Handler {
    fn start_document(&mut self) {}
    fn end_document(&mut self) {}

    fn null(&mut self);
    fn boolean(&mut self, b: bool);

    fn int32(&mut self, v: i32);
    fn uint32(&mut self, v: u32);
    fn int64(&mut self, v: i64);
    fn uint64(&mut self, v: u64);
    fn float(&mut self, v: f32);
    fn double(&mut self, v: f64);
    fn datetime(&mut self, epoch_secs: i64);

    /// `copy` indicates whether `s` aliases a buffer that will be mutated or
    /// dropped once this call returns (`false`) or remains valid beyond it
    /// (`true`). A handler that needs to retain the string beyond the call
    /// must copy whenever `copy` is `false`; `Document` always copies.
    fn string(&mut self, s: &str, copy: bool);
    fn binary(&mut self, b: &[u8], copy: bool);

    fn start_array(&mut self);
    fn array_separator(&mut self) {}
    fn end_array(&mut self, count: usize);

    fn start_map(&mut self);
    fn key(&mut self, s: &str, copy: bool);
    fn map_separator(&mut self) {}
    fn end_map(&mut self, count: usize);
}
