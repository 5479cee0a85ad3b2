//! Protocol codec
//!
//! Blocking RESP readers and writers used by both the server connection
//! loop and the client.

use std::io::{self, BufRead, Read, Write};

use bytes::{BufMut, BytesMut};

use crate::error::{FlatError, Result};

use super::{Reply, Request};

/// Largest accepted bulk string (512 MiB)
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest accepted array
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Longest accepted header or inline command line
pub const MAX_INLINE_LEN: usize = 64 * 1024;

// =============================================================================
// Requests
// =============================================================================

/// Read the next request from a stream
///
/// Returns `Ok(None)` when the peer closed the stream between requests.
/// Blank inline lines and empty arrays are skipped.
pub fn read_request<R: BufRead>(reader: &mut R) -> Result<Option<Request>> {
    loop {
        let line = match read_line(reader)? {
            Some(line) => line,
            None => return Ok(None),
        };

        let parts = match line.first() {
            Some(b'*') => {
                let count = parse_len(&line[1..], MAX_ARRAY_LEN, "multibulk length")?;
                match count {
                    None | Some(0) => continue,
                    Some(count) => read_bulk_args(reader, count)?,
                }
            }
            _ => {
                let parts = split_inline(&line);
                if parts.is_empty() {
                    continue;
                }
                parts
            }
        };

        return Request::from_parts(parts).map(Some);
    }
}

fn read_bulk_args<R: BufRead>(reader: &mut R, count: usize) -> Result<Vec<Vec<u8>>> {
    let mut args = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let line = read_line(reader)?.ok_or_else(unexpected_eof)?;
        if line.first() != Some(&b'$') {
            return Err(FlatError::Protocol(format!(
                "expected '$', got '{}'",
                String::from_utf8_lossy(&line)
            )));
        }
        let len = parse_len(&line[1..], MAX_BULK_LEN, "bulk length")?
            .ok_or_else(|| FlatError::Protocol("null bulk string in request".to_string()))?;
        args.push(read_bulk_body(reader, len)?);
    }
    Ok(args)
}

fn split_inline(line: &[u8]) -> Vec<Vec<u8>> {
    line.split(|b| b.is_ascii_whitespace())
        .filter(|part| !part.is_empty())
        .map(<[u8]>::to_vec)
        .collect()
}

/// Encode a command as a RESP array of bulk strings
pub fn encode_request(args: &[&[u8]], buf: &mut BytesMut) {
    put_header(buf, b'*', args.len() as i64);
    for arg in args {
        put_bulk(buf, arg);
    }
}

pub fn write_request<W: Write>(writer: &mut W, args: &[&[u8]]) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_request(args, &mut buf);
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Replies
// =============================================================================

pub fn encode_reply(reply: &Reply, buf: &mut BytesMut) {
    match reply {
        Reply::Simple(s) => put_line(buf, b'+', s),
        Reply::Error(e) => put_line(buf, b'-', e),
        Reply::Integer(n) => put_header(buf, b':', *n),
        Reply::Bulk(data) => put_bulk(buf, data),
        Reply::Null => buf.put_slice(b"$-1\r\n"),
        Reply::Array(items) => {
            put_header(buf, b'*', items.len() as i64);
            for item in items {
                encode_reply(item, buf);
            }
        }
    }
}

pub fn write_reply<W: Write>(writer: &mut W, reply: &Reply) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_reply(reply, &mut buf);
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Read one reply (client side)
pub fn read_reply<R: BufRead>(reader: &mut R) -> Result<Reply> {
    let line = read_line(reader)?.ok_or_else(unexpected_eof)?;
    let (kind, rest) = match line.split_first() {
        Some((kind, rest)) => (*kind, rest),
        None => return Err(FlatError::Protocol("empty reply line".to_string())),
    };

    match kind {
        b'+' => Ok(Reply::Simple(String::from_utf8_lossy(rest).into_owned())),
        b'-' => Ok(Reply::Error(String::from_utf8_lossy(rest).into_owned())),
        b':' => parse_int(rest).map(Reply::Integer),
        b'$' => match parse_len(rest, MAX_BULK_LEN, "bulk length")? {
            None => Ok(Reply::Null),
            Some(len) => read_bulk_body(reader, len).map(Reply::Bulk),
        },
        b'*' => match parse_len(rest, MAX_ARRAY_LEN, "multibulk length")? {
            None => Ok(Reply::Null),
            Some(count) => {
                let mut items = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    items.push(read_reply(reader)?);
                }
                Ok(Reply::Array(items))
            }
        },
        other => Err(FlatError::Protocol(format!(
            "unknown reply type '{}'",
            other as char
        ))),
    }
}

// =============================================================================
// Private Helpers
// =============================================================================

/// Read a `\n`-terminated line without its terminator (`\r\n` or `\n`)
///
/// `Ok(None)` only on a clean end of stream before any byte.
fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let read = reader
        .by_ref()
        .take(MAX_INLINE_LEN as u64 + 2)
        .read_until(b'\n', &mut line)?;

    if read == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        if line.len() > MAX_INLINE_LEN {
            return Err(FlatError::Protocol("line too long".to_string()));
        }
        return Err(unexpected_eof());
    }

    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Ok(Some(line))
}

fn read_bulk_body<R: BufRead>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let read = reader.by_ref().take(len as u64).read_to_end(&mut data)?;
    if read < len {
        return Err(unexpected_eof());
    }

    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf)?;
    if &crlf != b"\r\n" {
        return Err(FlatError::Protocol("bulk string not terminated by CRLF".to_string()));
    }
    Ok(data)
}

fn parse_int(digits: &[u8]) -> Result<i64> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            FlatError::Protocol(format!(
                "invalid integer '{}'",
                String::from_utf8_lossy(digits)
            ))
        })
}

/// Parse a length header; negative means null
fn parse_len(digits: &[u8], max: usize, what: &str) -> Result<Option<usize>> {
    let n = parse_int(digits).map_err(|_| FlatError::Protocol(format!("invalid {}", what)))?;
    if n < 0 {
        return Ok(None);
    }
    let n = n as usize;
    if n > max {
        return Err(FlatError::Protocol(format!("{} {} exceeds limit {}", what, n, max)));
    }
    Ok(Some(n))
}

fn unexpected_eof() -> FlatError {
    FlatError::Io(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        "stream ended mid-frame",
    ))
}

fn put_header(buf: &mut BytesMut, kind: u8, n: i64) {
    buf.put_u8(kind);
    buf.put_slice(n.to_string().as_bytes());
    buf.put_slice(b"\r\n");
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    put_header(buf, b'$', data.len() as i64);
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
}

/// Simple strings and errors cannot contain line breaks
fn put_line(buf: &mut BytesMut, kind: u8, text: &str) {
    buf.put_u8(kind);
    for b in text.bytes() {
        buf.put_u8(if b == b'\r' || b == b'\n' { b' ' } else { b });
    }
    buf.put_slice(b"\r\n");
}
