//! RESP2 protocol encoder and decoder.
//!
//! Commands go out as arrays of bulk strings. Replies are parsed in a
//! single pass over the read buffer; a partial frame leaves the buffer
//! untouched so the caller can read more bytes and try again.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::types::Value;

const CRLF: &[u8] = b"\r\n";

/// Encode one command as a RESP array of bulk strings, appending to `buf`.
///
/// ```text
/// *3\r\n$4\r\nXDEL\r\n$15\r\nstreams:testing\r\n$3\r\n1-0\r\n
/// ```
pub fn encode_command(args: &[Bytes], buf: &mut BytesMut) {
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(CRLF);

    for arg in args {
        buf.put_u8(b'$');
        buf.put_slice(arg.len().to_string().as_bytes());
        buf.put_slice(CRLF);
        buf.put_slice(arg);
        buf.put_slice(CRLF);
    }
}

/// Attempt to decode one reply from the front of `buf`.
///
/// Returns `Ok(None)` when more data is needed. On success the consumed
/// bytes are removed from `buf`.
pub fn decode_value(buf: &mut BytesMut) -> Result<Option<Value>> {
    match parse(&buf[..], 0)? {
        Some((value, consumed)) => {
            buf.advance(consumed);
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Parse a value starting at `pos`, returning it with the position just past it.
fn parse(buf: &[u8], pos: usize) -> Result<Option<(Value, usize)>> {
    let Some(&marker) = buf.get(pos) else {
        return Ok(None);
    };
    let Some((line, next)) = line_at(buf, pos + 1) else {
        return Ok(None);
    };

    match marker {
        b'+' => Ok(Some((Value::Status(utf8(line)?), next))),
        b'-' => Ok(Some((Value::Error(utf8(line)?), next))),
        b':' => Ok(Some((Value::Integer(decimal(line)?), next))),
        b'$' => {
            let len = decimal(line)?;
            if len == -1 {
                return Ok(Some((Value::Nil, next)));
            }
            if len < -1 {
                return Err(Error::Protocol("negative bulk string length".into()));
            }
            let end = match next.checked_add(len as usize) {
                Some(end) if end <= buf.len() => end,
                _ => return Ok(None),
            };
            if buf.len() < end + CRLF.len() {
                return Ok(None);
            }
            if &buf[end..end + CRLF.len()] != CRLF {
                return Err(Error::Protocol("expected CRLF after bulk string".into()));
            }
            let data = Bytes::copy_from_slice(&buf[next..end]);
            Ok(Some((Value::String(data), end + CRLF.len())))
        }
        b'*' => {
            let count = decimal(line)?;
            if count == -1 {
                return Ok(Some((Value::Nil, next)));
            }
            if count < -1 {
                return Err(Error::Protocol("negative array length".into()));
            }
            // Every element takes at least one line, so the buffered bytes
            // bound how many can be present.
            let present = (buf.len() - next) / CRLF.len();
            let mut items = Vec::with_capacity((count as usize).min(present));
            let mut cursor = next;
            for _ in 0..count {
                match parse(buf, cursor)? {
                    Some((item, after)) => {
                        items.push(item);
                        cursor = after;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Value::Array(items), cursor)))
        }
        byte => Err(Error::Protocol(format!("unexpected byte: 0x{:02x}", byte))),
    }
}

/// The line starting at `start` (without CRLF) and the position after its CRLF.
fn line_at(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let offset = rest.windows(2).position(|w| w == CRLF)?;
    Some((&rest[..offset], start + offset + CRLF.len()))
}

fn utf8(line: &[u8]) -> Result<String> {
    String::from_utf8(line.to_vec()).map_err(|e| Error::Protocol(format!("invalid UTF-8: {}", e)))
}

fn decimal(line: &[u8]) -> Result<i64> {
    let s = std::str::from_utf8(line)
        .map_err(|_| Error::Protocol("invalid UTF-8 in integer".into()))?;
    s.parse::<i64>()
        .map_err(|_| Error::Protocol(format!("invalid integer: {}", s)))
}
