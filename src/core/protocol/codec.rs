// src/core/protocol/codec.rs

//! Implements a `tokio_util::codec` pair for the request/response line protocol.

use super::{Request, Response};
use crate::core::GatewayError;
use bytes::{Buf, BufMut, BytesMut};
use std::cmp;
use tokio_util::codec::{Decoder, Encoder};

/// The default upper bound for a single request line, in bytes.
pub const DEFAULT_MAX_REQUEST_LENGTH: usize = 1024;

/// Frames newline-terminated requests and encodes one-line responses.
///
/// Malformed requests are yielded as `Err` items rather than stream errors,
/// so a bad request never terminates the connection. Blank lines are skipped.
/// A line longer than the limit is discarded up to its newline and reported
/// once as a protocol error.
#[derive(Debug)]
pub struct GatewayCodec {
    max_length: usize,
    /// Where to resume the newline search in the buffer.
    next_index: usize,
    is_discarding: bool,
}

impl GatewayCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            is_discarding: false,
        }
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    /// Whether an unterminated line can no longer fit the limit. A single
    /// byte past the limit is allowed while it may be the `\r` of a CRLF.
    fn exceeds_limit(&self, buf: &[u8]) -> bool {
        match buf.len().cmp(&self.max_length.saturating_add(1)) {
            cmp::Ordering::Less => false,
            cmp::Ordering::Equal => buf.last() != Some(&b'\r'),
            cmp::Ordering::Greater => true,
        }
    }

    fn too_long(&self) -> GatewayError {
        GatewayError::Protocol(format!(
            "request exceeds the {} byte limit",
            self.max_length
        ))
    }
}

impl Default for GatewayCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_REQUEST_LENGTH)
    }
}

/// Parses one raw line. Returns `None` for blank lines.
fn parse_line(raw: &[u8]) -> Option<Result<Request, GatewayError>> {
    let line = match std::str::from_utf8(raw) {
        Ok(line) => line.trim(),
        Err(e) => return Some(Err(e.into())),
    };
    if line.is_empty() {
        return None;
    }
    Some(Request::parse(line))
}

impl Decoder for GatewayCodec {
    type Item = Result<Request, GatewayError>;
    type Error = GatewayError;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // One byte past the limit for a `\r`, one more for the `\n`.
            let read_to = cmp::min(self.max_length.saturating_add(2), buf.len());
            let newline_offset = buf[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n');

            match (self.is_discarding, newline_offset) {
                (true, Some(offset)) => {
                    buf.advance(offset + self.next_index + 1);
                    self.is_discarding = false;
                    self.next_index = 0;
                    return Ok(Some(Err(self.too_long())));
                }
                (true, None) => {
                    buf.advance(read_to);
                    self.next_index = 0;
                    if buf.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(offset)) => {
                    let newline_index = offset + self.next_index;
                    self.next_index = 0;
                    let line = buf.split_to(newline_index + 1);
                    let body = &line[..newline_index];
                    let content = body.strip_suffix(b"\r").unwrap_or(body);
                    if content.len() > self.max_length {
                        return Ok(Some(Err(self.too_long())));
                    }
                    if let Some(item) = parse_line(body) {
                        return Ok(Some(item));
                    }
                }
                (false, None) if self.exceeds_limit(buf) => {
                    self.is_discarding = true;
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        self.next_index = 0;
        if self.is_discarding {
            // The peer closed mid-way through an overlong line.
            self.is_discarding = false;
            buf.clear();
            return Ok(Some(Err(self.too_long())));
        }
        if buf.is_empty() {
            return Ok(None);
        }
        // A final request without a terminator is still served.
        let line = buf.split_to(buf.len());
        Ok(parse_line(&line))
    }
}

impl Encoder<Response> for GatewayCodec {
    type Error = GatewayError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = item.to_string();
        dst.reserve(text.len() + 1);
        for b in text.bytes() {
            // Values must not break the one-line-per-response framing.
            dst.put_u8(if b == b'\n' || b == b'\r' { b' ' } else { b });
        }
        dst.put_u8(b'\n');
        Ok(())
    }
}
