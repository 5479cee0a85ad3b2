//! Tests for the RESP codec
//!
//! These tests verify:
//! - Array and inline request parsing, including pipelined requests
//! - Clean end of stream versus a frame cut short
//! - Reply encoding for every reply type, and decoding it back
//! - Size limits

use std::io::{BufReader, Cursor};

use bytes::BytesMut;
use flatkv::protocol::{
    encode_reply, encode_request, read_reply, read_request, write_reply, Reply, Request,
    MAX_INLINE_LEN,
};
use flatkv::FlatError;

// =============================================================================
// Helper Functions
// =============================================================================

fn reader(bytes: &[u8]) -> BufReader<Cursor<Vec<u8>>> {
    BufReader::new(Cursor::new(bytes.to_vec()))
}

fn encoded(reply: &Reply) -> Vec<u8> {
    let mut buf = BytesMut::new();
    encode_reply(reply, &mut buf);
    buf.to_vec()
}

fn request(name: &str, args: &[&str]) -> Request {
    Request::new(name, args.iter().map(|a| a.as_bytes().to_vec()).collect())
}

fn is_unexpected_eof(err: &FlatError) -> bool {
    matches!(err, FlatError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
}

// =============================================================================
// Request Parsing Tests
// =============================================================================

#[test]
fn test_read_array_request() {
    let mut r = reader(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nhello\r\n");
    let req = read_request(&mut r).unwrap().unwrap();
    assert_eq!(req, request("SET", &["k", "hello"]));
}

#[test]
fn test_read_binary_safe_argument() {
    let mut r = reader(b"*2\r\n$3\r\nGET\r\n$4\r\na\r\nb\r\n");
    let req = read_request(&mut r).unwrap().unwrap();
    assert_eq!(req.args, vec![b"a\r\nb".to_vec()]);
}

#[test]
fn test_read_inline_request() {
    let mut r = reader(b"SET  k   v\r\n");
    let req = read_request(&mut r).unwrap().unwrap();
    assert_eq!(req, request("SET", &["k", "v"]));

    let mut r = reader(b"PING\n");
    assert_eq!(read_request(&mut r).unwrap().unwrap(), request("PING", &[]));
}

#[test]
fn test_pipelined_requests() {
    let mut r = reader(b"*1\r\n$4\r\nPING\r\nGET k\r\n\r\n*0\r\n*2\r\n$4\r\nECHO\r\n$0\r\n\r\n");

    assert_eq!(read_request(&mut r).unwrap().unwrap().name, "PING");
    assert_eq!(read_request(&mut r).unwrap().unwrap(), request("GET", &["k"]));
    // Blank line and empty array are skipped
    assert_eq!(read_request(&mut r).unwrap().unwrap(), request("ECHO", &[""]));
    assert!(read_request(&mut r).unwrap().is_none());
}

#[test]
fn test_clean_eof_between_requests() {
    let mut r = reader(b"");
    assert!(read_request(&mut r).unwrap().is_none());
}

#[test]
fn test_eof_mid_frame() {
    for partial in [
        &b"*2\r\n$3\r\nGET\r\n"[..],
        b"*1\r\n$5\r\nab",
        b"*1\r\n$3",
        b"GET k",
    ] {
        let err = read_request(&mut reader(partial)).unwrap_err();
        assert!(is_unexpected_eof(&err), "{:?}", String::from_utf8_lossy(partial));
    }
}

#[test]
fn test_malformed_requests() {
    let cases: [&[u8]; 4] = [
        b"*x\r\n",
        b"*1\r\n+GET\r\n",
        b"*1\r\n$-1\r\n",
        b"*1\r\n$3\r\nGETxx",
    ];
    for bytes in cases {
        assert!(matches!(
            read_request(&mut reader(bytes)),
            Err(FlatError::Protocol(_))
        ));
    }
}

#[test]
fn test_oversized_inline_line() {
    let mut line = vec![b'a'; MAX_INLINE_LEN + 10];
    line.extend_from_slice(b"\r\n");
    assert!(matches!(
        read_request(&mut reader(&line)),
        Err(FlatError::Protocol(_))
    ));
}

#[test]
fn test_oversized_array_header() {
    assert!(matches!(
        read_request(&mut reader(b"*99999999999\r\n")),
        Err(FlatError::Protocol(_))
    ));
}

#[test]
fn test_encode_request_is_readable() {
    let mut buf = BytesMut::new();
    encode_request(&[b"INCR", b"n", b"1.5"], &mut buf);
    assert_eq!(&buf[..], b"*3\r\n$4\r\nINCR\r\n$1\r\nn\r\n$3\r\n1.5\r\n");

    let req = read_request(&mut reader(&buf)).unwrap().unwrap();
    assert_eq!(req, request("INCR", &["n", "1.5"]));
}

// =============================================================================
// Reply Encoding Tests
// =============================================================================

#[test]
fn test_encode_each_reply_type() {
    assert_eq!(encoded(&Reply::ok()), b"+OK\r\n");
    assert_eq!(encoded(&Reply::error("boom")), b"-ERR boom\r\n");
    assert_eq!(encoded(&Reply::Integer(-42)), b":-42\r\n");
    assert_eq!(encoded(&Reply::Bulk(b"hi".to_vec())), b"$2\r\nhi\r\n");
    assert_eq!(encoded(&Reply::Bulk(Vec::new())), b"$0\r\n\r\n");
    assert_eq!(encoded(&Reply::Null), b"$-1\r\n");
    assert_eq!(
        encoded(&Reply::Array(vec![Reply::Integer(1), Reply::Null])),
        b"*2\r\n:1\r\n$-1\r\n"
    );
    assert_eq!(encoded(&Reply::Array(vec![])), b"*0\r\n");
}

#[test]
fn test_error_line_breaks_are_flattened() {
    assert_eq!(encoded(&Reply::error("bad\r\nthing")), b"-ERR bad  thing\r\n");
}

#[test]
fn test_read_back_nested_reply() {
    let reply = Reply::Array(vec![
        Reply::Simple("PONG".to_string()),
        Reply::Bulk(b"x\r\ny".to_vec()),
        Reply::Array(vec![Reply::Integer(7), Reply::Error("ERR nope".to_string())]),
        Reply::Null,
    ]);

    let mut out = Vec::new();
    write_reply(&mut out, &reply).unwrap();
    assert_eq!(read_reply(&mut reader(&out)).unwrap(), reply);
}

#[test]
fn test_read_reply_errors() {
    assert!(matches!(read_reply(&mut reader(b"?\r\n")), Err(FlatError::Protocol(_))));
    assert!(is_unexpected_eof(&read_reply(&mut reader(b"")).unwrap_err()));
}
