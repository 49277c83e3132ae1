//! Per-frame semantics and the outbound frame serializer.

use bytes::{Bytes, BytesMut};
use http_sans_io::{
    error_code, flags, frame_type, Error, Frame, FrameHeader, FRAME_HEADER_SIZE,
};

use crate::support::*;

fn open_request_stream(conn: &mut http_sans_io::Connection<Recorder>) {
    let block = encode_block(&[(":method", "POST"), (":scheme", "http"), (":path", "/")]);
    conn.feed(&frame(frame_type::HEADERS, flags::END_HEADERS, 1, &block))
        .unwrap();
}

#[test]
fn test_unknown_frame_types_are_ignored() {
    let mut conn = handshaken_server();
    conn.feed(&frame(0xbb, 0, 0, b"whatever")).unwrap();
    assert!(conn.events().events.is_empty());
    assert!(conn.events().output.is_empty());
}

#[test]
fn test_frame_observation_hook_sees_every_frame() {
    let mut conn = handshaken_server();
    conn.feed(&frame(frame_type::PING, 0, 0, &[0; 8])).unwrap();
    conn.feed(&frame(0xbb, 0, 0, &[])).unwrap();
    assert_eq!(conn.events().seen_frames, vec![frame_type::PING, 0xbb]);
}

#[test]
fn test_oversized_frame_is_a_frame_size_error() {
    let mut conn = handshaken_server();
    let mut header = frame(frame_type::DATA, 0, 1, &[]);
    // Declare 2^24 - 1 bytes, far over MAX_FRAME_SIZE.
    header[0] = 0xff;
    header[1] = 0xff;
    header[2] = 0xff;
    let result = conn.feed(&header);
    assert!(matches!(result, Err(Error::Protocol(_))));
    let frames = parse_frames(&conn.events().output);
    let goaway = frames.last().unwrap();
    assert_eq!(goaway.frame_type, frame_type::GOAWAY);
    assert_eq!(
        &goaway.payload[4..8],
        &error_code::FRAME_SIZE_ERROR.to_be_bytes()
    );
}

#[test]
fn test_data_on_stream_zero_is_rejected() {
    let mut conn = handshaken_server();
    assert!(matches!(
        conn.feed(&frame(frame_type::DATA, 0, 0, b"abc")),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_ping_is_echoed_with_ack() {
    let mut conn = handshaken_server();
    let payload = [1, 2, 3, 4, 5, 6, 7, 8];
    conn.feed(&frame(frame_type::PING, 0, 0, &payload)).unwrap();
    let frames = parse_frames(&conn.events().output);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].frame_type, frame_type::PING);
    assert_eq!(frames[0].flags, flags::ACK);
    assert_eq!(frames[0].payload, payload);
}

#[test]
fn test_ping_ack_fires_pong() {
    let mut conn = handshaken_server();
    let payload = [9, 9, 9, 9, 0, 0, 0, 0];
    conn.feed(&frame(frame_type::PING, flags::ACK, 0, &payload))
        .unwrap();
    assert_eq!(conn.events().events, vec![Event::Pong(payload)]);
    assert!(conn.events().output.is_empty());
}

#[test]
fn test_ping_with_wrong_size_is_rejected() {
    let mut conn = handshaken_server();
    assert!(matches!(
        conn.feed(&frame(frame_type::PING, 0, 0, &[0; 4])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_ping_on_a_stream_is_rejected() {
    let mut conn = handshaken_server();
    assert!(matches!(
        conn.feed(&frame(frame_type::PING, 0, 1, &[0; 8])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_settings_are_applied_and_acked() {
    let mut conn = handshaken_server();
    // INITIAL_WINDOW_SIZE = 70000.
    let payload = [0, 4, 0, 1, 0x11, 0x70];
    conn.feed(&frame(frame_type::SETTINGS, 0, 0, &payload))
        .unwrap();
    let frames = parse_frames(&conn.events().output);
    assert_eq!(frames[0].frame_type, frame_type::SETTINGS);
    assert_eq!(frames[0].flags, flags::ACK);
    // The window grew, so senders are told to retry.
    assert_eq!(
        conn.events().events,
        vec![Event::FlowIncrease(0), Event::Settings]
    );
}

#[test]
fn test_settings_enable_push_out_of_range() {
    let mut conn = handshaken_server();
    let payload = [0, 2, 0, 0, 0, 2];
    assert!(matches!(
        conn.feed(&frame(frame_type::SETTINGS, 0, 0, &payload)),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_settings_max_frame_size_out_of_range() {
    let mut conn = handshaken_server();
    let payload = [0, 5, 0, 0, 0x20, 0]; // 8192, below the floor
    assert!(matches!(
        conn.feed(&frame(frame_type::SETTINGS, 0, 0, &payload)),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_settings_ack_with_payload_is_rejected() {
    let mut conn = handshaken_server();
    assert!(matches!(
        conn.feed(&frame(frame_type::SETTINGS, flags::ACK, 0, &[0; 6])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_settings_payload_must_be_a_multiple_of_six() {
    let mut conn = handshaken_server();
    assert!(matches!(
        conn.feed(&frame(frame_type::SETTINGS, 0, 0, &[0; 5])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_unknown_setting_is_ignored() {
    let mut conn = handshaken_server();
    let payload = [0, 0x42, 0, 0, 0, 7];
    conn.feed(&frame(frame_type::SETTINGS, 0, 0, &payload))
        .unwrap();
    assert_eq!(conn.events().events, vec![Event::Settings]);
}

#[test]
fn test_rst_stream_closes_the_stream() {
    let mut conn = handshaken_server();
    open_request_stream(&mut conn);
    conn.events_mut().clear();

    let code = error_code::CANCEL.to_be_bytes();
    conn.feed(&frame(frame_type::RST_STREAM, 0, 1, &code)).unwrap();
    assert_eq!(conn.events().events, vec![Event::StreamEnd(1)]);
    // Closed silently: nothing goes back out.
    assert!(conn.events().output.is_empty());
}

#[test]
fn test_rst_stream_on_idle_stream_is_rejected() {
    let mut conn = handshaken_server();
    let code = error_code::CANCEL.to_be_bytes();
    assert!(matches!(
        conn.feed(&frame(frame_type::RST_STREAM, 0, 1, &code)),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_rst_stream_must_be_four_bytes() {
    let mut conn = handshaken_server();
    open_request_stream(&mut conn);
    assert!(matches!(
        conn.feed(&frame(frame_type::RST_STREAM, 0, 1, &[0; 3])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_priority_is_parsed_and_ignored() {
    let mut conn = handshaken_server();
    open_request_stream(&mut conn);
    conn.events_mut().clear();
    conn.feed(&frame(frame_type::PRIORITY, 0, 1, &[0, 0, 0, 3, 16]))
        .unwrap();
    assert!(conn.events().events.is_empty());
    assert!(conn.events().output.is_empty());
}

#[test]
fn test_priority_self_dependency_resets_the_stream() {
    let mut conn = handshaken_server();
    open_request_stream(&mut conn);
    conn.events_mut().clear();
    conn.feed(&frame(frame_type::PRIORITY, 0, 1, &[0, 0, 0, 1, 16]))
        .unwrap();
    let frames = parse_frames(&conn.events().output);
    assert_eq!(frames[0].frame_type, frame_type::RST_STREAM);
    assert!(conn.events().events.contains(&Event::StreamEnd(1)));
}

#[test]
fn test_priority_self_dependency_on_idle_stream_is_fatal() {
    let mut conn = handshaken_server();
    assert!(matches!(
        conn.feed(&frame(frame_type::PRIORITY, 0, 5, &[0, 0, 0, 5, 16])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_priority_must_be_five_bytes() {
    let mut conn = handshaken_server();
    assert!(matches!(
        conn.feed(&frame(frame_type::PRIORITY, 0, 1, &[0; 4])),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_padded_data_is_unpadded() {
    let mut conn = handshaken_server();
    open_request_stream(&mut conn);
    conn.events_mut().clear();

    let mut payload = vec![3u8]; // pad length
    payload.extend_from_slice(b"abc");
    payload.extend_from_slice(&[0; 3]);
    conn.feed(&frame(frame_type::DATA, flags::PADDED, 1, &payload))
        .unwrap();
    assert_eq!(collected_data(&conn.events().events, 1), b"abc");
}

#[test]
fn test_padding_exceeding_the_frame_is_rejected() {
    let mut conn = handshaken_server();
    open_request_stream(&mut conn);
    let payload = [200u8, b'x'];
    assert!(matches!(
        conn.feed(&frame(frame_type::DATA, flags::PADDED, 1, &payload)),
        Err(Error::Protocol(_))
    ));
}

#[test]
fn test_padded_frame_with_no_payload_is_rejected() {
    let mut conn = handshaken_server();
    open_request_stream(&mut conn);
    assert!(matches!(
        conn.feed(&frame(frame_type::DATA, flags::PADDED, 1, &[])),
        Err(Error::Protocol(_))
    ));
}

// -- outbound serializer --

#[test]
fn test_frame_header_roundtrip() {
    let rst = Frame::rst_stream(7, error_code::CANCEL);
    let mut out = BytesMut::new();
    rst.encode(16384, &mut out).unwrap();
    let head = FrameHeader::parse(&out).unwrap();
    assert_eq!(head.length, 4);
    assert_eq!(head.frame_type, frame_type::RST_STREAM);
    assert_eq!(head.stream_id, 7);
    assert_eq!(&out[FRAME_HEADER_SIZE..], &[0, 0, 0, 8]);
}

#[test]
fn test_data_split_carries_end_stream_last() {
    let data = Frame::data(1, Bytes::from(vec![0x61; 40]), true);
    let mut out = BytesMut::new();
    data.encode(16, &mut out).unwrap();

    let pieces = parse_frames(&out);
    assert_eq!(
        pieces.iter().map(|f| f.payload.len()).collect::<Vec<_>>(),
        vec![16, 16, 8]
    );
    assert_eq!(
        pieces.iter().map(|f| f.flags).collect::<Vec<_>>(),
        vec![0, 0, flags::END_STREAM]
    );
}

#[test]
fn test_headers_split_into_continuations() {
    let headers = Frame::headers(3, Bytes::from(vec![0x82; 30]), true);
    let mut out = BytesMut::new();
    headers.encode(16, &mut out).unwrap();

    let pieces = parse_frames(&out);
    assert_eq!(pieces.len(), 2);
    assert_eq!(pieces[0].frame_type, frame_type::HEADERS);
    assert_eq!(pieces[0].flags, flags::END_STREAM);
    assert_eq!(pieces[1].frame_type, frame_type::CONTINUATION);
    assert_eq!(pieces[1].flags, flags::END_HEADERS);
    assert_eq!(pieces[1].payload.len(), 14);
}

#[test]
fn test_oversized_control_frame_is_an_assertion() {
    let settings = Frame::new(frame_type::SETTINGS, 0, 0, Bytes::from(vec![0; 30]));
    let mut out = BytesMut::new();
    assert!(matches!(
        settings.encode(16, &mut out),
        Err(Error::Assertion(_))
    ));
}

#[test]
fn test_padded_frames_cannot_be_split() {
    let padded = Frame::new(
        frame_type::DATA,
        flags::PADDED,
        1,
        Bytes::from(vec![0; 30]),
    );
    let mut out = BytesMut::new();
    assert!(matches!(
        padded.encode(16, &mut out),
        Err(Error::NotImplemented(_))
    ));
}
