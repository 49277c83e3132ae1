//! Connection startup: prefaces, initial SETTINGS, version selection.

use http_sans_io::{error_code, frame_type, Error, CONNECTION_PREFACE};

use crate::support::*;

#[test]
fn test_server_emits_initial_settings() {
    let conn = server_h2();
    let frames = parse_frames(&conn.events().output);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].frame_type, frame_type::SETTINGS);
    assert_eq!(frames[0].flags, 0);
    assert_eq!(frames[0].stream_id, 0);
    // The delta from the protocol defaults: MAX_CONCURRENT_STREAMS=1024.
    assert_eq!(frames[0].payload, vec![0, 3, 0, 0, 4, 0]);
}

#[test]
fn test_client_emits_preface_then_settings() {
    let conn = client_h2();
    let output = &conn.events().output;
    assert!(output.starts_with(CONNECTION_PREFACE));
    let frames = parse_frames(&output[CONNECTION_PREFACE.len()..]);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].frame_type, frame_type::SETTINGS);
}

#[test]
fn test_server_handshake_acks_settings() {
    // S1: preface + empty SETTINGS in, SETTINGS-ACK out, no stream events.
    let mut conn = server_h2();
    conn.events_mut().clear();

    let mut bytes = CONNECTION_PREFACE.to_vec();
    bytes.extend_from_slice(&frame(frame_type::SETTINGS, 0, 0, &[]));
    conn.feed(&bytes).unwrap();

    let frames = parse_frames(&conn.events().output);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].frame_type, frame_type::SETTINGS);
    assert_eq!(frames[0].flags, 0x1);
    assert!(frames[0].payload.is_empty());
    assert_eq!(conn.events().events, vec![Event::Settings]);
}

#[test]
fn test_preface_accepted_byte_by_byte() {
    let mut conn = server_h2();
    for &byte in CONNECTION_PREFACE {
        conn.feed(&[byte]).unwrap();
    }
    conn.feed(&frame(frame_type::SETTINGS, 0, 0, &[])).unwrap();
    assert_eq!(conn.events().events, vec![Event::Settings]);
}

#[test]
fn test_bad_preface_is_a_protocol_error() {
    let mut conn = server_h2();
    let result = conn.feed(b"GET / HTTP/2.0\r\n\r\n");
    assert!(matches!(result, Err(Error::Protocol(_))));
    // The error went out as a GOAWAY too.
    let frames = parse_frames(&conn.events().output);
    assert_eq!(frames.last().unwrap().frame_type, frame_type::GOAWAY);
}

#[test]
fn test_first_frame_must_be_settings() {
    let mut conn = server_h2();
    let mut bytes = CONNECTION_PREFACE.to_vec();
    bytes.extend_from_slice(&frame(frame_type::PING, 0, 0, &[0; 8]));
    assert!(matches!(conn.feed(&bytes), Err(Error::Protocol(_))));
}

#[test]
fn test_prior_knowledge_preface_switches_to_h2() {
    let mut conn = server_h1();
    let mut bytes = CONNECTION_PREFACE.to_vec();
    bytes.extend_from_slice(&frame(frame_type::SETTINGS, 0, 0, &[]));
    conn.feed(&bytes).unwrap();

    assert!(conn.is_http2());
    let frames = parse_frames(&conn.events().output);
    assert_eq!(frames[0].frame_type, frame_type::SETTINGS);
    assert_eq!(frames[1].frame_type, frame_type::SETTINGS);
    assert_eq!(frames[1].flags, 0x1);
}

#[test]
fn test_prior_knowledge_partial_preface_waits() {
    let mut conn = server_h1();
    conn.feed(&CONNECTION_PREFACE[..10]).unwrap();
    assert!(!conn.is_http2());
    conn.feed(&CONNECTION_PREFACE[10..]).unwrap();
    assert!(conn.is_http2());
}

#[test]
fn test_prior_knowledge_can_be_disallowed() {
    let mut config = http_sans_io::Config::default();
    config.disallow_h2_prior_knowledge = true;
    let mut conn =
        http_sans_io::Connection::with_config(http_sans_io::Role::Server, config, Recorder::default());
    conn.begin(http_sans_io::Version::Http1).unwrap();
    // The preface now parses as a (bogus) HTTP/1 request head.
    let result = conn.feed(CONNECTION_PREFACE);
    assert!(!conn.is_http2());
    assert!(result.is_err() || conn.events().events.is_empty());
}

#[test]
fn test_goaway_no_error_is_a_disconnect() {
    let mut conn = handshaken_server();
    let mut payload = vec![0, 0, 0, 0];
    payload.extend_from_slice(&error_code::NO_ERROR.to_be_bytes());
    let result = conn.feed(&frame(frame_type::GOAWAY, 0, 0, &payload));
    assert_eq!(result, Err(Error::Disconnect));
}

#[test]
fn test_goaway_with_error_surfaces_protocol() {
    let mut conn = handshaken_server();
    let mut payload = vec![0, 0, 0, 0];
    payload.extend_from_slice(&error_code::INTERNAL_ERROR.to_be_bytes());
    let result = conn.feed(&frame(frame_type::GOAWAY, 0, 0, &payload));
    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[test]
fn test_feed_before_begin_is_an_assertion() {
    let mut conn = http_sans_io::Connection::new(http_sans_io::Role::Server, Recorder::default());
    assert!(matches!(conn.feed(b"x"), Err(Error::Assertion(_))));
}

#[test]
fn test_begin_twice_is_an_assertion() {
    let mut conn = server_h2();
    assert!(matches!(
        conn.begin(http_sans_io::Version::Http2),
        Err(Error::Assertion(_))
    ));
}

#[test]
fn test_shutdown_sends_goaway_no_error() {
    let mut conn = handshaken_server();
    conn.shutdown().unwrap();
    let frames = parse_frames(&conn.events().output);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].frame_type, frame_type::GOAWAY);
    assert_eq!(&frames[0].payload[4..8], &error_code::NO_ERROR.to_be_bytes());
}
