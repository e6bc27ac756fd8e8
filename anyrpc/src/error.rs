//! Flat error-code enum shared by every codec, the value model, and the RPC
//! envelopes. Codes match the original AnyRPC library's fault code table so
//! they can be placed directly on the wire (JSON-RPC `error.code`, XML-RPC
//! `faultCode`, MessagePack-RPC error map `code`).

use std::fmt;
use std::io;

/// A single error occurring anywhere in the stack, carrying the integer code
/// that gets sent over the wire plus an optional byte offset for parse
/// errors (spec.md §7: "reader exposes error code, message, and byte
/// offset").
#[derive(Debug, Clone)]
pub struct AnyRpcError {
    kind: ErrorKind,
    message: String,
    offset: Option<usize>,
}

impl AnyRpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        AnyRpcError {
            kind,
            message: message.into(),
            offset: None,
        }
    }

    pub fn with_offset(kind: ErrorKind, message: impl Into<String>, offset: usize) -> Self {
        AnyRpcError {
            kind,
            message: message.into(),
            offset: Some(offset),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The wire-level numeric fault code for this error.
    pub fn code(&self) -> i32 {
        self.kind.code()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.offset = Some(offset);
    }
}

impl fmt::Display for AnyRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.offset {
            Some(off) => write!(f, "{} (code {}, offset {})", self.message, self.code(), off),
            None => write!(f, "{} (code {})", self.message, self.code()),
        }
    }
}

impl std::error::Error for AnyRpcError {}

impl From<io::Error> for AnyRpcError {
    fn from(e: io::Error) -> Self {
        AnyRpcError::new(ErrorKind::TransportError, e.to_string())
    }
}

impl From<std::str::Utf8Error> for AnyRpcError {
    fn from(e: std::str::Utf8Error) -> Self {
        AnyRpcError::new(ErrorKind::Utf8Sequence, e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnyRpcError>;

/// Error groups, matching `examples/original_source/include/anyrpc/error.h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    // Custom server errors
    ServerError,
    ResponseParseError,
    InvalidResponse,

    // Transport
    TransportError,

    // System
    SystemError,
    ValueAccess,
    StringNotTerminated,
    IllegalAssignment,
    IllegalArrayAccess,
    MemoryAllocation,
    AccessInvalidValue,
    IllegalCall,
    BufferOverrun,
    AccessNotInvalidValue,
    MapCountWrong,
    ArrayCountWrong,
    Shutdown,
    PrettyPrintLevel,
    UnicodeValue,
    SurrogatePair,
    Utf8Sequence,
    HandlerNotDefined,
    NullInString,

    // Application
    ApplicationError,

    // Standard server errors
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    MethodRedefine,
    FunctionRedefine,

    // Parse errors
    ParseError,
    UnsupportedEncoding,
    InvalidEncoding,
    DocumentEmpty,
    DocumentRootNotSingular,
    ValueInvalid,
    ObjectMissName,
    ObjectMissColon,
    ObjectMissCommaOrCurlyBracket,
    ArrayMissCommaOrSquareBracket,
    StringUnicodeEscapeInvalid,
    StringUnicodeSurrogateInvalid,
    StringEscapeInvalid,
    StringMissingQuotationMark,
    StringInvalidEncoding,
    NumberTooBig,
    NumberMissFraction,
    NumberMissExponent,
    Termination,
    NonspecificSyntaxError,
    TagInvalid,
    DateTimeInvalid,
    NotImplemented,
    Handler,
    Base64Invalid,
}

impl ErrorKind {
    pub fn code(self) -> i32 {
        use ErrorKind::*;
        match self {
            ServerError => -32000,
            ResponseParseError => -32001,
            InvalidResponse => -32002,

            TransportError => -32300,

            SystemError => -32400,
            ValueAccess => -32401,
            StringNotTerminated => -32402,
            IllegalAssignment => -32403,
            IllegalArrayAccess => -32404,
            MemoryAllocation => -32405,
            AccessInvalidValue => -32406,
            IllegalCall => -32407,
            BufferOverrun => -32408,
            AccessNotInvalidValue => -32409,
            MapCountWrong => -32410,
            ArrayCountWrong => -32411,
            Shutdown => -32412,
            PrettyPrintLevel => -32413,
            UnicodeValue => -32414,
            SurrogatePair => -32415,
            Utf8Sequence => -32416,
            HandlerNotDefined => -32417,
            NullInString => -32418,

            ApplicationError => -32500,

            InvalidRequest => -32600,
            MethodNotFound => -32601,
            InvalidParams => -32602,
            InternalError => -32603,
            MethodRedefine => -32604,
            FunctionRedefine => -32605,

            ParseError => -32700,
            UnsupportedEncoding => -32701,
            InvalidEncoding => -32702,
            DocumentEmpty => -32703,
            DocumentRootNotSingular => -32704,
            ValueInvalid => -32705,
            ObjectMissName => -32706,
            ObjectMissColon => -32707,
            ObjectMissCommaOrCurlyBracket => -32708,
            ArrayMissCommaOrSquareBracket => -32709,
            StringUnicodeEscapeInvalid => -32710,
            StringUnicodeSurrogateInvalid => -32711,
            StringEscapeInvalid => -32712,
            StringMissingQuotationMark => -32713,
            StringInvalidEncoding => -32714,
            NumberTooBig => -32715,
            NumberMissFraction => -32716,
            NumberMissExponent => -32717,
            Termination => -32718,
            NonspecificSyntaxError => -32719,
            TagInvalid => -32720,
            DateTimeInvalid => -32721,
            NotImplemented => -32722,
            Handler => -32723,
            Base64Invalid => -32724,
        }
    }
}
