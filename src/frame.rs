//! HTTP/2 frame layer: wire constants, the 9-byte frame header, and
//! outbound serialization with size-splitting.
//!
//! Frame layout (RFC 7540 Section 4.1): `len[24] type[8] flags[8]
//! R[1] stream[31]`, big-endian, followed by `len` payload bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// HTTP/2 frame types (RFC 7540 Section 6)
pub mod frame_type {
    pub const DATA: u8 = 0x0;
    pub const HEADERS: u8 = 0x1;
    pub const PRIORITY: u8 = 0x2;
    pub const RST_STREAM: u8 = 0x3;
    pub const SETTINGS: u8 = 0x4;
    pub const PUSH_PROMISE: u8 = 0x5;
    pub const PING: u8 = 0x6;
    pub const GOAWAY: u8 = 0x7;
    pub const WINDOW_UPDATE: u8 = 0x8;
    pub const CONTINUATION: u8 = 0x9;
}

/// HTTP/2 frame flags
pub mod flags {
    pub const END_STREAM: u8 = 0x1;
    pub const ACK: u8 = 0x1;
    pub const END_HEADERS: u8 = 0x4;
    pub const PADDED: u8 = 0x8;
    pub const PRIORITY: u8 = 0x20;
}

/// HTTP/2 error codes (RFC 7540 Section 7)
pub mod error_code {
    pub const NO_ERROR: u32 = 0x0;
    pub const PROTOCOL_ERROR: u32 = 0x1;
    pub const INTERNAL_ERROR: u32 = 0x2;
    pub const FLOW_CONTROL_ERROR: u32 = 0x3;
    pub const SETTINGS_TIMEOUT: u32 = 0x4;
    pub const STREAM_CLOSED: u32 = 0x5;
    pub const FRAME_SIZE_ERROR: u32 = 0x6;
    pub const REFUSED_STREAM: u32 = 0x7;
    pub const CANCEL: u32 = 0x8;
    pub const COMPRESSION_ERROR: u32 = 0x9;
    pub const CONNECT_ERROR: u32 = 0xa;
    pub const ENHANCE_YOUR_CALM: u32 = 0xb;
    pub const INADEQUATE_SECURITY: u32 = 0xc;
    pub const HTTP_1_1_REQUIRED: u32 = 0xd;
}

/// Size of the fixed frame header.
pub const FRAME_HEADER_SIZE: usize = 9;

/// The HTTP/2 connection preface (24 bytes)
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Largest legal flow-control window (2^31 - 1).
pub const MAX_WINDOW: i64 = 0x7FFF_FFFF;

/// A parsed HTTP/2 frame header (9 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32, // 24 bits
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32, // 31 bits (high bit reserved)
}

impl FrameHeader {
    /// Parse a 9-byte frame header
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < FRAME_HEADER_SIZE {
            return None;
        }

        let length = ((data[0] as u32) << 16) | ((data[1] as u32) << 8) | (data[2] as u32);
        let frame_type = data[3];
        let flags = data[4];
        let stream_id = ((data[5] as u32) << 24)
            | ((data[6] as u32) << 16)
            | ((data[7] as u32) << 8)
            | (data[8] as u32);
        let stream_id = stream_id & 0x7FFF_FFFF; // Clear reserved bit

        Some(Self {
            length,
            frame_type,
            flags,
            stream_id,
        })
    }

    /// Total frame size including header
    pub fn total_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.length as usize
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags & flags::END_STREAM != 0
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags & flags::END_HEADERS != 0
    }

    pub fn is_padded(&self) -> bool {
        self.flags & flags::PADDED != 0
    }

    pub fn is_priority(&self) -> bool {
        self.flags & flags::PRIORITY != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    fn put(&self, out: &mut BytesMut) {
        out.put_u8((self.length >> 16) as u8);
        out.put_u8((self.length >> 8) as u8);
        out.put_u8(self.length as u8);
        out.put_u8(self.frame_type);
        out.put_u8(self.flags);
        out.put_u32(self.stream_id & 0x7FFF_FFFF);
    }
}

/// An owned frame, ready for dispatch or serialization.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: u32,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(frame_type: u8, flags: u8, stream_id: u32, payload: Bytes) -> Self {
        Self {
            frame_type,
            flags,
            stream_id,
            payload,
        }
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            length: self.payload.len() as u32,
            frame_type: self.frame_type,
            flags: self.flags,
            stream_id: self.stream_id,
        }
    }

    pub fn data(stream_id: u32, payload: Bytes, end_stream: bool) -> Self {
        let fl = if end_stream { flags::END_STREAM } else { 0 };
        Self::new(frame_type::DATA, fl, stream_id, payload)
    }

    pub fn headers(stream_id: u32, block: Bytes, end_stream: bool) -> Self {
        let mut fl = flags::END_HEADERS;
        if end_stream {
            fl |= flags::END_STREAM;
        }
        Self::new(frame_type::HEADERS, fl, stream_id, block)
    }

    pub fn push_promise(stream_id: u32, promised_id: u32, block: &[u8]) -> Self {
        let mut payload = BytesMut::with_capacity(4 + block.len());
        payload.put_u32(promised_id & 0x7FFF_FFFF);
        payload.put_slice(block);
        Self::new(
            frame_type::PUSH_PROMISE,
            flags::END_HEADERS,
            stream_id,
            payload.freeze(),
        )
    }

    pub fn rst_stream(stream_id: u32, code: u32) -> Self {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(code);
        Self::new(frame_type::RST_STREAM, 0, stream_id, payload.freeze())
    }

    pub fn settings(payload: Bytes) -> Self {
        Self::new(frame_type::SETTINGS, 0, 0, payload)
    }

    pub fn settings_ack() -> Self {
        Self::new(frame_type::SETTINGS, flags::ACK, 0, Bytes::new())
    }

    pub fn ping(payload: [u8; 8], ack: bool) -> Self {
        let fl = if ack { flags::ACK } else { 0 };
        Self::new(frame_type::PING, fl, 0, Bytes::copy_from_slice(&payload))
    }

    pub fn goaway(last_stream_id: u32, code: u32) -> Self {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u32(last_stream_id & 0x7FFF_FFFF);
        payload.put_u32(code);
        Self::new(frame_type::GOAWAY, 0, 0, payload.freeze())
    }

    pub fn window_update(stream_id: u32, increment: u32) -> Self {
        let mut payload = BytesMut::with_capacity(4);
        payload.put_u32(increment & 0x7FFF_FFFF);
        Self::new(frame_type::WINDOW_UPDATE, 0, stream_id, payload.freeze())
    }

    /// Serialize for the wire, honoring the peer's SETTINGS_MAX_FRAME_SIZE.
    ///
    /// Oversized HEADERS and PUSH_PROMISE frames become a head frame plus
    /// CONTINUATIONs; END_HEADERS moves to the last piece while END_STREAM,
    /// if set, stays on the first. Oversized DATA splits into several DATA
    /// frames with END_STREAM only on the last. Splitting a PADDED frame
    /// is not supported, and no other frame type may exceed the limit.
    pub fn encode(&self, max_frame_size: u32, out: &mut BytesMut) -> Result<()> {
        let max = max_frame_size as usize;
        if self.payload.len() <= max {
            self.header().put(out);
            out.put_slice(&self.payload);
            return Ok(());
        }

        if self.flags & flags::PADDED != 0 {
            return Err(Error::NotImplemented("cannot split a PADDED frame"));
        }

        match self.frame_type {
            frame_type::DATA => {
                let mut rest = self.payload.clone();
                while !rest.is_empty() {
                    let chunk = rest.split_to(rest.len().min(max));
                    let fl = if rest.is_empty() {
                        self.flags & flags::END_STREAM
                    } else {
                        0
                    };
                    FrameHeader {
                        length: chunk.len() as u32,
                        frame_type: frame_type::DATA,
                        flags: fl,
                        stream_id: self.stream_id,
                    }
                    .put(out);
                    out.put_slice(&chunk);
                }
                Ok(())
            }
            frame_type::HEADERS | frame_type::PUSH_PROMISE => {
                let mut rest = self.payload.clone();
                let head = rest.split_to(max);
                FrameHeader {
                    length: head.len() as u32,
                    frame_type: self.frame_type,
                    flags: self.flags & !flags::END_HEADERS,
                    stream_id: self.stream_id,
                }
                .put(out);
                out.put_slice(&head);
                while !rest.is_empty() {
                    let chunk = rest.split_to(rest.len().min(max));
                    let fl = if rest.is_empty() {
                        self.flags & flags::END_HEADERS
                    } else {
                        0
                    };
                    FrameHeader {
                        length: chunk.len() as u32,
                        frame_type: frame_type::CONTINUATION,
                        flags: fl,
                        stream_id: self.stream_id,
                    }
                    .put(out);
                    out.put_slice(&chunk);
                }
                Ok(())
            }
            _ => Err(Error::Assertion("control frame exceeds peer max_frame_size")),
        }
    }
}
