//! `Content-Length` message framing, and nothing else.
//!
//! Grounded directly in `examples/original_source/cangjie-language-server/
//! src/json-rpc/StdioTransport.cpp`: a header block of `Key: value\r\n`
//! lines terminated by a blank line, followed by exactly `Content-Length`
//! bytes of UTF-8 JSON. Lines starting with `#` before the first header are
//! treated as comments (the original's test-fixture convention) and
//! skipped. This module is deliberately framing-only — no request
//! dispatch, no JSON-RPC method routing — per spec.md's non-goals; a full
//! server binds this to its own dispatch loop.

use std::io::{BufRead, Read};

use crate::error::{CoreError, Result};

/// Refuse to allocate for an implausibly large or missing/zero length,
/// mirroring the original's guard against a malformed or adversarial
/// header (spec: "refuses >2^30 or zero/missing length").
const MAX_MESSAGE_LEN: u64 = 1 << 30;

/// One complete framed message: the raw header lines (for any rarely-used
/// extension headers) and the decoded body as UTF-8 text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Reads one framed message from `reader`, skipping any leading `#`-prefixed
/// comment lines. Returns `Ok(None)` at a clean EOF before any header line
/// is read; an error for a malformed header block or an invalid length.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Option<Frame>> {
    let mut headers = Vec::new();
    let mut content_length: Option<u64> = None;

    loop {
        let mut line = String::new();
        let bytes_read = reader
            .read_line(&mut line)
            .map_err(|e| CoreError::io(std::path::PathBuf::from("<stdin>"), e))?;
        if bytes_read == 0 {
            if headers.is_empty() {
                return Ok(None);
            }
            return Err(CoreError::Manifest("transport: EOF mid-header".into()));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            break;
        }
        if headers.is_empty() && trimmed.starts_with('#') {
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            return Err(CoreError::Manifest(format!("transport: malformed header line {trimmed:?}")));
        };
        let key = key.trim().to_string();
        let value = value.trim().to_string();
        if key.eq_ignore_ascii_case("content-length") {
            let parsed: u64 = value
                .parse()
                .map_err(|_| CoreError::Manifest(format!("transport: invalid Content-Length {value:?}")))?;
            content_length = Some(parsed);
        }
        headers.push((key, value));
    }

    let length = content_length.ok_or_else(|| CoreError::Manifest("transport: missing Content-Length".into()))?;
    if length == 0 || length > MAX_MESSAGE_LEN {
        return Err(CoreError::Manifest(format!("transport: refusing Content-Length {length}")));
    }

    let mut buf = vec![0u8; length as usize];
    reader.read_exact(&mut buf).map_err(|e| CoreError::io(std::path::PathBuf::from("<stdin>"), e))?;
    let body = String::from_utf8(buf).map_err(|e| CoreError::Manifest(format!("transport: non-UTF-8 body: {e}")))?;

    Ok(Some(Frame { headers, body }))
}

/// Encodes `body` with a single `Content-Length` header, as every writer in
/// this protocol family does.
pub fn write_frame(body: &str) -> Vec<u8> {
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(body.as_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trips_a_simple_frame() {
        let encoded = write_frame(r#"{"hello":"world"}"#);
        let mut cursor = Cursor::new(encoded);
        let frame = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(frame.body, r#"{"hello":"world"}"#);
    }

    #[test]
    fn skips_leading_comment_lines() {
        let mut raw = b"# a fixture comment\n".to_vec();
        raw.extend_from_slice(&write_frame("{}"));
        let mut cursor = Cursor::new(raw);
        let frame = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(frame.body, "{}");
    }

    #[test]
    fn rejects_zero_length() {
        let mut cursor = Cursor::new(b"Content-Length: 0\r\n\r\n".to_vec());
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn rejects_missing_length() {
        let mut cursor = Cursor::new(b"X-Other: 1\r\n\r\n".to_vec());
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn rejects_oversized_length() {
        let mut cursor = Cursor::new(b"Content-Length: 2147483648\r\n\r\n".to_vec());
        assert!(read_frame(&mut cursor).is_err());
    }

    #[test]
    fn clean_eof_before_any_header_returns_none() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(read_frame(&mut cursor).unwrap().is_none());
    }
}
