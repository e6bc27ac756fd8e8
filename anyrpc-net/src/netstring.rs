//! Netstring framing for the raw TCP transport: `<length>:<body>,` with a
//! leading comma required before every message after the first (spec.md
//! §4.9), grounded on `examples/original_source/src/connection.cpp`'s
//! `TcpConnection::ReadHeader`/`ExecuteRequest`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// `length`, `body_start` (offset into the buffer where the body
    /// begins), `comma_consumed` (how many leading bytes were the
    /// separator comma, 0 or 1).
    Complete { length: usize, body_start: usize },
    Incomplete,
    Fault,
}

/// Parses the `[,]<digits>:` prefix of `buffer`. `comma_expected` is `true`
/// for every message after the first one read on a connection.
pub fn parse_header(buffer: &[u8], comma_expected: bool) -> FrameState {
    let mut pos = 0;
    if comma_expected {
        match buffer.first() {
            Some(b',') => pos = 1,
            Some(_) => return FrameState::Fault,
            None => return FrameState::Incomplete,
        }
    }

    let colon = match buffer[pos..].iter().position(|&b| b == b':') {
        Some(rel) => pos + rel,
        None => return FrameState::Incomplete,
    };

    let digits = match std::str::from_utf8(&buffer[pos..colon]) {
        Ok(s) => s,
        Err(_) => return FrameState::Fault,
    };
    match digits.parse::<usize>() {
        Ok(length) if length > 0 => FrameState::Complete { length, body_start: colon + 1 },
        _ => FrameState::Fault,
    }
}

/// Wraps a response body as a netstring with its leading comma separator,
/// matching `header_ << length << ":"; response_.Put(',')`.
pub fn frame_response(body_len: usize) -> Vec<u8> {
    format!("{}:", body_len).into_bytes()
}

pub const RESPONSE_TRAILER: u8 = b',';

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_message_without_leading_comma() {
        let buf = b"5:hello,6:world,";
        match parse_header(buf, false) {
            FrameState::Complete { length, body_start } => {
                assert_eq!(length, 5);
                assert_eq!(&buf[body_start..body_start + length], b"hello");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn requires_leading_comma_for_subsequent_message() {
        let buf = b",6:world,";
        match parse_header(buf, true) {
            FrameState::Complete { length, body_start } => {
                assert_eq!(length, 6);
                assert_eq!(&buf[body_start..body_start + length], b"world,"[..6].as_ref());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_comma_is_a_fault() {
        let buf = b"6:world,";
        assert_eq!(parse_header(buf, true), FrameState::Fault);
    }

    #[test]
    fn incomplete_header_waits() {
        assert_eq!(parse_header(b"12", false), FrameState::Incomplete);
    }

    #[test]
    fn zero_length_is_a_fault() {
        assert_eq!(parse_header(b"0:", false), FrameState::Fault);
    }
}
