//! Incremental reply decoding.
//!
//! The decoder owns a receive buffer. Bytes arrive in arbitrary pieces via
//! [`ReplyDecoder::feed`]; every fully decoded top-level reply is handed to the
//! sink, in arrival order, before `feed` returns. Partial data stays buffered
//! until the next call.

use bytes::{Buf, Bytes, BytesMut};
use tracing::{error, trace};

use crate::error::{RespError, RespResult, ServerError};
use crate::value::Value;

// ============================================================================
// Constants
// ============================================================================

/// Largest bulk string the server may send (512 MiB).
pub const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// Deepest array nesting accepted.
pub const MAX_DEPTH: usize = 128;

/// Initial receive buffer capacity.
const INITIAL_CAPACITY: usize = 4096;

// ============================================================================
// Decoder Trait
// ============================================================================

/// One decoded protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeEvent {
    /// A regular reply.
    Reply(Value),
    /// A top-level error reply.
    Error(ServerError),
}

/// Turns raw bytes into decode events.
///
/// Implementations must emit events strictly in arrival order, one per fully
/// decoded unit, and must not call back into whatever owns them.
pub trait ReplyDecoder {
    /// Consume `data`, emitting zero or more events.
    fn feed(&mut self, data: &[u8], sink: &mut dyn FnMut(DecodeEvent)) -> RespResult<()>;

    /// Discard any buffered partial reply.
    fn reset(&mut self);

    /// Number of bytes held waiting for the rest of a reply.
    fn buffered(&self) -> usize;
}

// ============================================================================
// RESP2 Decoder
// ============================================================================

/// Incremental RESP2 decoder.
///
/// Array headers and their elements are consumed from the buffer as soon as
/// each one is complete; partially received arrays live on a stack of open
/// frames. A large reply split over many reads is therefore parsed once, not
/// again from its first byte on every read.
#[derive(Debug)]
pub struct RespDecoder {
    buffer: BytesMut,
    stack: Vec<Frame>,
    partial: usize,
}

/// An array whose elements are still arriving.
#[derive(Debug)]
struct Frame {
    items: Vec<Value>,
    remaining: usize,
}

/// One complete header or scalar at the front of the buffer.
enum Unit {
    Value(Value),
    Array(usize),
}

impl Default for RespDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl RespDecoder {
    /// Create a decoder with an empty buffer.
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(INITIAL_CAPACITY),
            stack: Vec::new(),
            partial: 0,
        }
    }

    /// Decode every complete reply currently buffered.
    fn drain(&mut self, sink: &mut dyn FnMut(DecodeEvent)) -> RespResult<()> {
        loop {
            if self.stack.len() > MAX_DEPTH {
                return Err(RespError::NestingTooDeep(MAX_DEPTH));
            }
            let Some((unit, consumed)) = parse_unit(&self.buffer)? else {
                return Ok(());
            };
            self.buffer.advance(consumed);
            self.partial += consumed;

            let value = match unit {
                Unit::Value(value) => value,
                Unit::Array(count) => {
                    self.stack.push(Frame {
                        items: Vec::with_capacity(count.min(1024)),
                        remaining: count,
                    });
                    continue;
                }
            };

            if let Some(value) = self.fold(value) {
                trace!(kind = value.kind(), consumed = self.partial, "Decoded reply");
                self.partial = 0;

                let event = match value {
                    Value::Error(err) => DecodeEvent::Error(err),
                    other => DecodeEvent::Reply(other),
                };
                sink(event);
            }
        }
    }

    /// Attach a finished value to the innermost open array, closing every
    /// array it completes. Returns the value once it is top-level.
    fn fold(&mut self, mut value: Value) -> Option<Value> {
        while let Some(frame) = self.stack.last_mut() {
            frame.items.push(value);
            frame.remaining -= 1;
            if frame.remaining > 0 {
                return None;
            }
            let frame = self.stack.pop()?;
            value = Value::Array(frame.items);
        }
        Some(value)
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.stack.clear();
        self.partial = 0;
    }
}

impl ReplyDecoder for RespDecoder {
    fn feed(&mut self, data: &[u8], sink: &mut dyn FnMut(DecodeEvent)) -> RespResult<()> {
        self.buffer.extend_from_slice(data);

        let result = self.drain(sink);
        if let Err(ref err) = result {
            error!(error = %err, buffered = self.buffered(), "Discarding undecodable reply data");
            self.clear();
        }
        result
    }

    fn reset(&mut self) {
        self.clear();
    }

    /// Bytes of the reply in progress, consumed or not.
    #[inline]
    fn buffered(&self) -> usize {
        self.partial + self.buffer.len()
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse one scalar or array header at the front of `buf`.
///
/// Returns `Ok(None)` when the buffer ends before the unit does, otherwise the
/// unit and the number of bytes it spans.
fn parse_unit(buf: &[u8]) -> RespResult<Option<(Unit, usize)>> {
    let Some(&tag) = buf.first() else {
        return Ok(None);
    };
    let Some((line, next)) = read_line(buf, 1) else {
        return Ok(None);
    };

    let scalar = |value: Value| -> RespResult<Option<(Unit, usize)>> {
        Ok(Some((Unit::Value(value), next)))
    };
    match tag {
        b'+' => scalar(Value::SimpleString(utf8(line)?)),
        b'-' => scalar(Value::Error(ServerError::new(utf8(line)?))),
        b':' => scalar(Value::Integer(parse_int(line)?)),
        b'$' => Ok(parse_bulk(buf, parse_int(line)?, next)?
            .map(|(value, end)| (Unit::Value(value), end))),
        b'*' => match parse_int(line)? {
            count if count < 0 => scalar(Value::Nil),
            0 => scalar(Value::Array(Vec::new())),
            count => Ok(Some((Unit::Array(count as usize), next))),
        },
        other => Err(RespError::UnknownType(other)),
    }
}

fn parse_bulk(buf: &[u8], len: i64, start: usize) -> RespResult<Option<(Value, usize)>> {
    if len < 0 {
        return Ok(Some((Value::Nil, start)));
    }
    if len > MAX_BULK_LEN {
        return Err(RespError::BulkTooLarge(len));
    }

    let end = start + len as usize;
    if buf.len() < end + 2 {
        return Ok(None);
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Err(RespError::Protocol(
            "bulk string not terminated by CRLF".to_string(),
        ));
    }

    let payload = Bytes::copy_from_slice(&buf[start..end]);
    Ok(Some((Value::BulkString(payload), end + 2)))
}

/// Find the CRLF-terminated line starting at `pos`.
fn read_line(buf: &[u8], pos: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(pos..)?;
    let idx = rest.windows(2).position(|w| w == b"\r\n")?;
    Some((&rest[..idx], pos + idx + 2))
}

fn parse_int(line: &[u8]) -> RespResult<i64> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| {
            RespError::Protocol(format!(
                "invalid integer: {:?}",
                String::from_utf8_lossy(line)
            ))
        })
}

fn utf8(line: &[u8]) -> RespResult<String> {
    std::str::from_utf8(line)
        .map(str::to_owned)
        .map_err(|_| RespError::InvalidUtf8)
}

// ============================================================================
// Tests
// ============================================================================
