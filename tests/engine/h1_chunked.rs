//! HTTP/1 chunked transfer coding.

use http_sans_io::Error;

use crate::support::*;

const CHUNKED_HEAD: &[u8] = b"POST /p HTTP/1.1\r\nhost: h\r\ntransfer-encoding: chunked\r\n\r\n";

#[test]
fn test_two_chunks_then_terminator() {
    // S3 from the protocol suite.
    let mut conn = server_h1();
    let mut input = CHUNKED_HEAD.to_vec();
    input.extend_from_slice(b"3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n");
    conn.feed(&input).unwrap();

    let events = &conn.events().events;
    assert!(matches!(events[1], Event::Head(1, _)));
    assert_eq!(events[2], Event::Data(1, b"abc".to_vec()));
    assert_eq!(events[3], Event::Data(1, b"de".to_vec()));
    assert_eq!(events[4], Event::Tail(1, None));
}

#[test]
fn test_chunked_byte_by_byte() {
    let mut conn = server_h1();
    let mut input = CHUNKED_HEAD.to_vec();
    input.extend_from_slice(b"3\r\nabc\r\n2\r\nde\r\n0\r\n\r\n");
    for &byte in &input {
        conn.feed(&[byte]).unwrap();
    }
    assert_eq!(collected_data(&conn.events().events, 1), b"abcde");
    assert!(conn.events().events.contains(&Event::Tail(1, None)));
}

#[test]
fn test_chunk_extensions_are_skipped() {
    let mut conn = server_h1();
    let mut input = CHUNKED_HEAD.to_vec();
    input.extend_from_slice(b"3;name=value\r\nabc\r\n0\r\n\r\n");
    conn.feed(&input).unwrap();
    assert_eq!(collected_data(&conn.events().events, 1), b"abc");
}

#[test]
fn test_hex_chunk_sizes() {
    let mut conn = server_h1();
    let mut input = CHUNKED_HEAD.to_vec();
    input.extend_from_slice(b"a\r\n0123456789\r\n0\r\n\r\n");
    conn.feed(&input).unwrap();
    assert_eq!(collected_data(&conn.events().events, 1), b"0123456789");
}

#[test]
fn test_trailer_fields_are_consumed() {
    let mut conn = server_h1();
    let mut input = CHUNKED_HEAD.to_vec();
    input.extend_from_slice(b"2\r\nhi\r\n0\r\nx-checksum: 99\r\n\r\n");
    conn.feed(&input).unwrap();
    assert!(conn.events().events.contains(&Event::Tail(1, None)));
}

#[test]
fn test_invalid_chunk_size_is_rejected() {
    let mut conn = server_h1();
    let mut input = CHUNKED_HEAD.to_vec();
    input.extend_from_slice(b"zz\r\n");
    assert!(matches!(conn.feed(&input), Err(Error::Protocol(_))));
}

#[test]
fn test_chunk_without_crlf_is_rejected() {
    let mut conn = server_h1();
    let mut input = CHUNKED_HEAD.to_vec();
    input.extend_from_slice(b"3\r\nabcXX");
    assert!(matches!(conn.feed(&input), Err(Error::Protocol(_))));
}

#[test]
fn test_content_length_is_ignored_when_chunked() {
    let mut conn = server_h1();
    conn.feed(b"POST / HTTP/1.1\r\nhost: h\r\ncontent-length: 999\r\ntransfer-encoding: chunked\r\n\r\n2\r\nhi\r\n0\r\n\r\n")
        .unwrap();
    assert_eq!(collected_data(&conn.events().events, 1), b"hi");
    assert!(conn.events().events.contains(&Event::Tail(1, None)));
}
