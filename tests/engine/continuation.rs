//! HEADERS/CONTINUATION reassembly and its flood cap.

use http_sans_io::{error_code, flags, frame_type, Error, MAX_CONTINUATIONS};

use crate::support::*;

#[test]
fn test_header_block_reassembled_across_frames() {
    let mut conn = handshaken_server();
    let block = encode_block(&[(":method", "GET"), (":scheme", "http"), (":path", "/split")]);
    let (first, second) = block.split_at(block.len() / 2);

    conn.feed(&frame(frame_type::HEADERS, 0, 1, first)).unwrap();
    assert!(conn.events().events.is_empty());

    conn.feed(&frame(frame_type::CONTINUATION, flags::END_HEADERS, 1, second))
        .unwrap();
    let events = &conn.events().events;
    assert_eq!(events[0], Event::StreamStart(1));
    assert!(matches!(&events[1], Event::Head(1, m) if m.path == "/split"));
}

#[test]
fn test_end_stream_is_preserved_across_continuations() {
    let mut conn = handshaken_server();
    let block = encode_block(&[(":method", "GET"), (":scheme", "http"), (":path", "/")]);
    let (first, second) = block.split_at(1);

    conn.feed(&frame(frame_type::HEADERS, flags::END_STREAM, 1, first))
        .unwrap();
    conn.feed(&frame(frame_type::CONTINUATION, flags::END_HEADERS, 1, second))
        .unwrap();
    assert!(conn.events().events.contains(&Event::Tail(1, None)));
}

#[test]
fn test_continuation_on_another_stream_is_rejected() {
    let mut conn = handshaken_server();
    let block = encode_block(&[(":method", "GET"), (":scheme", "http"), (":path", "/")]);
    conn.feed(&frame(frame_type::HEADERS, 0, 1, &block)).unwrap();
    assert!(matches!(
        conn.feed(&frame(frame_type::CONTINUATION, flags::END_HEADERS, 3, &[])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_interleaved_frame_during_reassembly_is_rejected() {
    let mut conn = handshaken_server();
    let block = encode_block(&[(":method", "GET"), (":scheme", "http"), (":path", "/")]);
    conn.feed(&frame(frame_type::HEADERS, 0, 1, &block)).unwrap();
    assert!(matches!(
        conn.feed(&frame(frame_type::PING, 0, 0, &[0; 8])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_unexpected_continuation_is_rejected() {
    let mut conn = handshaken_server();
    assert!(matches!(
        conn.feed(&frame(frame_type::CONTINUATION, flags::END_HEADERS, 1, &[])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_continuation_flood_enhances_calm() {
    // S6: nine CONTINUATIONs on one block exceed the cap.
    let mut conn = handshaken_server();
    conn.feed(&frame(frame_type::HEADERS, 0, 1, &[])).unwrap();

    let mut result = Ok(());
    for _ in 0..=MAX_CONTINUATIONS {
        result = conn.feed(&frame(frame_type::CONTINUATION, 0, 1, &[]));
        if result.is_err() {
            break;
        }
    }
    assert!(matches!(result, Err(Error::Protocol(_))));
    let frames = parse_frames(&conn.events().output);
    let goaway = frames.last().unwrap();
    assert_eq!(goaway.frame_type, frame_type::GOAWAY);
    assert_eq!(
        &goaway.payload[4..8],
        &error_code::ENHANCE_YOUR_CALM.to_be_bytes()
    );
}

#[test]
fn test_block_at_the_cap_still_parses() {
    let mut conn = handshaken_server();
    let block = encode_block(&[(":method", "GET"), (":scheme", "http"), (":path", "/")]);

    conn.feed(&frame(frame_type::HEADERS, 0, 1, &[])).unwrap();
    for _ in 0..MAX_CONTINUATIONS - 1 {
        conn.feed(&frame(frame_type::CONTINUATION, 0, 1, &[])).unwrap();
    }
    conn.feed(&frame(frame_type::CONTINUATION, flags::END_HEADERS, 1, &block))
        .unwrap();
    assert!(matches!(&conn.events().events[1], Event::Head(1, _)));
}
