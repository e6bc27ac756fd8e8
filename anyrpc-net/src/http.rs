//! Incremental HTTP/1.x header parsing and response composition (spec.md
//! §4.9), grounded on
//! `examples/original_source/src/internal/http.cpp`'s `HttpHeader`/
//! `HttpRequest`/`HttpResponse`.

use anyrpc::error::{AnyRpcError, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    Complete,
    Incomplete,
    Fault,
}

/// Header fields shared by requests and responses, accumulated line by line
/// as more bytes arrive. Mirrors `HttpHeader`'s running state so a
/// connection can feed it partial reads without re-parsing from scratch.
#[derive(Debug, Default)]
pub struct HttpRequestHeader {
    start_index: usize,
    pub http_version: String,
    pub content_type: String,
    pub content_length: Option<usize>,
    pub keep_alive: bool,
    pub method: String,
    pub request_uri: String,
    pub host: String,
    fault: bool,
}

impl HttpRequestHeader {
    pub fn new() -> Self {
        HttpRequestHeader {
            keep_alive: true,
            ..Default::default()
        }
    }

    /// Index into `buffer` where the body starts once the header is
    /// complete.
    pub fn body_start(&self) -> usize {
        self.start_index
    }

    /// Feeds newly-available bytes of `buffer` (always from offset 0; the
    /// caller owns buffering) and returns the current parse state.
    pub fn process(&mut self, buffer: &[u8], eof: bool) -> HeaderState {
        if self.fault {
            return HeaderState::Fault;
        }
        loop {
            let rest = &buffer[self.start_index..];
            let end_line = match rest.iter().position(|&b| b == b'\n') {
                Some(pos) => pos,
                None => {
                    if eof {
                        self.fault = true;
                        return HeaderState::Fault;
                    }
                    return HeaderState::Incomplete;
                }
            };
            let mut line_len = end_line;
            if line_len > 0 && rest[line_len - 1] == b'\r' {
                line_len -= 1;
            }
            let line = match std::str::from_utf8(&rest[..line_len]) {
                Ok(s) => s.to_owned(),
                Err(_) => {
                    self.fault = true;
                    return HeaderState::Fault;
                }
            };
            let was_first = self.start_index == 0;
            self.start_index += end_line + 1;

            let result = if was_first { self.process_first_line(&line) } else { self.process_line(&line) };
            match result {
                HeaderState::Fault => {
                    self.fault = true;
                    return HeaderState::Fault;
                }
                HeaderState::Complete => return HeaderState::Complete,
                HeaderState::Incomplete => continue,
            }
        }
    }

    fn process_first_line(&mut self, line: &str) -> HeaderState {
        let mut parts = line.splitn(3, ' ');
        let (method, uri, version) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            _ => return HeaderState::Fault,
        };
        if !version.starts_with("HTTP/") {
            return HeaderState::Fault;
        }
        self.method = method.to_owned();
        self.request_uri = uri.to_owned();
        self.http_version = version[5..].to_owned();
        if self.http_version == "1.0" {
            self.keep_alive = false;
        }
        HeaderState::Incomplete
    }

    fn process_line(&mut self, line: &str) -> HeaderState {
        if line.is_empty() {
            return self.verify();
        }
        let (key, value) = match split_header_line(line) {
            Some(kv) => kv,
            None => return HeaderState::Fault,
        };
        match key.as_str() {
            "content-length" => {
                if self.content_length.is_some() {
                    return HeaderState::Fault;
                }
                match value.parse::<usize>() {
                    Ok(n) => self.content_length = Some(n),
                    Err(_) => return HeaderState::Fault,
                }
            }
            "host" => self.host = value,
            "content-type" => {
                if !self.content_type.is_empty() {
                    return HeaderState::Fault;
                }
                self.content_type = value;
            }
            "connection" => match value.to_ascii_lowercase().as_str() {
                "keep-alive" => self.keep_alive = true,
                "close" => self.keep_alive = false,
                _ => {}
            },
            _ => {}
        }
        HeaderState::Incomplete
    }

    fn verify(&self) -> HeaderState {
        if self.http_version == "1.1" && self.host.is_empty() {
            return HeaderState::Fault;
        }
        if self.content_length.is_none() && self.method == "POST" {
            return HeaderState::Fault;
        }
        HeaderState::Complete
    }
}

/// Status-line header parsing for the client side, mirroring
/// `HttpRequestHeader` but keyed off `HttpResponse`'s first-line/verify
/// rules instead of a request line.
#[derive(Debug, Default)]
pub struct HttpResponseHeader {
    start_index: usize,
    pub http_version: String,
    pub content_type: String,
    pub content_length: Option<usize>,
    pub keep_alive: bool,
    pub response_code: String,
    pub response_string: String,
    fault: bool,
}

impl HttpResponseHeader {
    pub fn new() -> Self {
        HttpResponseHeader {
            keep_alive: true,
            ..Default::default()
        }
    }

    pub fn body_start(&self) -> usize {
        self.start_index
    }

    pub fn process(&mut self, buffer: &[u8], eof: bool) -> HeaderState {
        if self.fault {
            return HeaderState::Fault;
        }
        loop {
            let rest = &buffer[self.start_index..];
            let end_line = match rest.iter().position(|&b| b == b'\n') {
                Some(pos) => pos,
                None => {
                    if eof {
                        self.fault = true;
                        return HeaderState::Fault;
                    }
                    return HeaderState::Incomplete;
                }
            };
            let mut line_len = end_line;
            if line_len > 0 && rest[line_len - 1] == b'\r' {
                line_len -= 1;
            }
            let line = match std::str::from_utf8(&rest[..line_len]) {
                Ok(s) => s.to_owned(),
                Err(_) => {
                    self.fault = true;
                    return HeaderState::Fault;
                }
            };
            let was_first = self.start_index == 0;
            self.start_index += end_line + 1;

            let result = if was_first { self.process_first_line(&line) } else { self.process_line(&line) };
            match result {
                HeaderState::Fault => {
                    self.fault = true;
                    return HeaderState::Fault;
                }
                HeaderState::Complete => return HeaderState::Complete,
                HeaderState::Incomplete => continue,
            }
        }
    }

    fn process_first_line(&mut self, line: &str) -> HeaderState {
        let mut parts = line.splitn(3, ' ');
        let (version, code, reason) = match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), Some(c)) => (a, b, c),
            (Some(a), Some(b), None) => (a, b, ""),
            _ => return HeaderState::Fault,
        };
        if !version.starts_with("HTTP/") {
            return HeaderState::Fault;
        }
        self.http_version = version[5..].to_owned();
        self.response_code = code.to_owned();
        self.response_string = reason.to_owned();
        if self.http_version == "1.0" {
            self.keep_alive = false;
        }
        HeaderState::Incomplete
    }

    fn process_line(&mut self, line: &str) -> HeaderState {
        if line.is_empty() {
            return self.verify();
        }
        let (key, value) = match split_header_line(line) {
            Some(kv) => kv,
            None => return HeaderState::Fault,
        };
        match key.as_str() {
            "content-length" => {
                if self.content_length.is_some() {
                    return HeaderState::Fault;
                }
                match value.parse::<usize>() {
                    Ok(n) => self.content_length = Some(n),
                    Err(_) => return HeaderState::Fault,
                }
            }
            "content-type" => {
                if !self.content_type.is_empty() {
                    return HeaderState::Fault;
                }
                self.content_type = value;
            }
            "connection" => match value.to_ascii_lowercase().as_str() {
                "keep-alive" => self.keep_alive = true,
                "close" => self.keep_alive = false,
                _ => {}
            },
            _ => {}
        }
        HeaderState::Incomplete
    }

    fn verify(&self) -> HeaderState {
        if self.content_length.is_none() {
            return HeaderState::Fault;
        }
        HeaderState::Complete
    }
}

fn split_header_line(line: &str) -> Option<(String, String)> {
    let colon = line.find(':')?;
    let key = line[..colon].trim().to_ascii_lowercase();
    if key.is_empty() {
        return None;
    }
    let value = line[colon + 1..].trim().to_owned();
    Some((key, value))
}

/// The two methods anyrpc's HTTP surface actually implements: `POST` for
/// RPC payloads and `OPTIONS` for CORS preflight (spec.md §6).
pub fn compose_post_response(content_type: &str, body: &[u8], keep_alive: bool) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nAccess-Control-Allow-Origin: *\r\n",
        content_type,
        body.len()
    );
    head.push_str(if keep_alive { "Connection: keep-alive\r\n\r\n" } else { "Connection: close\r\n\r\n" });
    let mut out = head.into_bytes();
    out.extend_from_slice(body);
    out
}

pub fn compose_options_response() -> Vec<u8> {
    b"HTTP/1.1 200 OK\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: POST, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nContent-Length: 0\r\nConnection: keep-alive\r\n\r\n".to_vec()
}

pub fn compose_error_response(status: u16, reason: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, reason
    )
    .into_bytes()
}

pub fn header_fault_error() -> AnyRpcError {
    AnyRpcError::new(ErrorKind::TransportError, "malformed HTTP header")
}

pub fn not_implemented_response() -> Vec<u8> {
    compose_error_response(501, "Not Implemented")
}

/// Returns the handler result as a failure if the requested method isn't
/// `POST`/`OPTIONS`.
pub fn method_allowed(method: &str) -> Result<()> {
    match method {
        "POST" | "OPTIONS" => Ok(()),
        _ => Err(AnyRpcError::new(ErrorKind::TransportError, format!("unsupported method: {method}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_complete_post_header() {
        let mut header = HttpRequestHeader::new();
        let raw = b"POST /rpc HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: 5\r\n\r\nhello";
        assert_eq!(header.process(raw, false), HeaderState::Complete);
        assert_eq!(header.method, "POST");
        assert_eq!(header.request_uri, "/rpc");
        assert_eq!(header.content_length, Some(5));
        assert_eq!(header.http_version, "1.1");
        assert!(header.keep_alive);
        assert_eq!(&raw[header.body_start()..], b"hello");
    }

    #[test]
    fn http_1_0_defaults_to_connection_close() {
        let mut header = HttpRequestHeader::new();
        let raw = b"POST /rpc HTTP/1.0\r\nContent-Length: 0\r\n\r\n";
        assert_eq!(header.process(raw, false), HeaderState::Complete);
        assert!(!header.keep_alive);
    }

    #[test]
    fn http_1_1_without_host_is_a_fault() {
        let mut header = HttpRequestHeader::new();
        let raw = b"POST /rpc HTTP/1.1\r\nContent-Length: 0\r\n\r\n";
        assert_eq!(header.process(raw, false), HeaderState::Fault);
    }

    #[test]
    fn incomplete_header_waits_for_more_bytes() {
        let mut header = HttpRequestHeader::new();
        let raw = b"POST /rpc HTTP/1.1\r\nHost: localhost\r\n";
        assert_eq!(header.process(raw, false), HeaderState::Incomplete);
    }

    #[test]
    fn post_without_content_length_is_a_fault() {
        let mut header = HttpRequestHeader::new();
        let raw = b"POST /rpc HTTP/1.1\r\nHost: localhost\r\n\r\n";
        assert_eq!(header.process(raw, false), HeaderState::Fault);
    }

    #[test]
    fn parses_a_complete_response_header() {
        let mut header = HttpResponseHeader::new();
        let raw = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 5\r\n\r\nhello";
        assert_eq!(header.process(raw, false), HeaderState::Complete);
        assert_eq!(header.response_code, "200");
        assert_eq!(header.response_string, "OK");
        assert_eq!(header.content_length, Some(5));
        assert!(header.keep_alive);
        assert_eq!(&raw[header.body_start()..], b"hello");
    }

    #[test]
    fn response_without_content_length_is_a_fault() {
        let mut header = HttpResponseHeader::new();
        let raw = b"HTTP/1.1 200 OK\r\n\r\n";
        assert_eq!(header.process(raw, false), HeaderState::Fault);
    }
}
