//! The connection state machine.
//!
//! A [`Connection`] is a self-contained protocol engine: the host feeds it
//! inbound bytes and calls the `write_*` methods, and the engine calls back
//! through [`Events`] for outbound bytes and parsed protocol events. No
//! sockets, no timers, no threads.
//!
//! The receive side is an automaton over the buffered input. Each state
//! handler consumes what it can and yields one of three outcomes: an
//! error (unwind), "need more data" ([`Step::Wait`]), or the next state
//! ([`Step::Goto`]). The driver loops until a handler waits.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::events::Events;
use crate::frame::{
    error_code, flags, frame_type, Frame, FrameHeader, CONNECTION_PREFACE, FRAME_HEADER_SIZE,
    MAX_WINDOW,
};
use crate::h1::{self, BodyLen};
use crate::hpack::{HpackDecoder, HpackEncoder};
use crate::message::{self, HeadKind, Message, MAX_HEADERS};
use crate::settings::Settings;
use crate::stream::{HalfState, ResetHistory, Stream, StreamTable};

/// Most CONTINUATION frames accepted per header block before the peer is
/// told to calm down.
pub const MAX_CONTINUATIONS: usize = 8;

const UPGRADE_RESPONSE: &[u8] =
    b"HTTP/1.1 101 Switching Protocols\r\nconnection: upgrade\r\nupgrade: h2c\r\n\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// The protocol version the host selects when the connection starts.
/// In-band h2c upgrades may move an `Http1` connection to HTTP/2 later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    Http1,
    Http2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Uninitialized,
    Http1,
    Http2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    H2Init,
    H2Preface,
    H2Settings,
    H2Frame,
    H1Head,
    H1Body,
    H1Tail,
    H1Chunk,
    H1ChunkBody,
    H1ChunkTail,
    H1Trailers,
}

enum Step {
    Wait,
    Goto(State),
}

/// Which side of the connection a stream id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Peer {
    Local = 0,
    Remote = 1,
}

/// Host-tunable knobs, fixed at connection creation.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Refuse `Upgrade: h2c` requests.
    pub disallow_h2_upgrade: bool,
    /// Refuse prior-knowledge HTTP/2 prefaces on HTTP/1 server connections.
    pub disallow_h2_prior_knowledge: bool,
    /// The host replenishes receive windows itself via
    /// [`Connection::open_flow`]; only padding is replenished
    /// automatically.
    pub manual_flow_control: bool,
    /// The SETTINGS advertised when the connection starts.
    pub settings: Settings,
}

/// Header-block reassembly across HEADERS/PUSH_PROMISE + CONTINUATION.
#[derive(Debug)]
struct Continued {
    stream_id: u32,
    frame_type: u8,
    flags: u8,
    /// Promised stream id when the block started with PUSH_PROMISE.
    promised: u32,
    buffer: BytesMut,
    frames: usize,
}

/// A socketless HTTP/1.1 + HTTP/2 connection.
pub struct Connection<E: Events> {
    events: E,
    role: Role,
    config: Config,
    mode: Mode,
    state: State,
    buffer: BytesMut,
    local: Settings,
    remote: Settings,
    /// Connection-level flow windows, absolute (HTTP/2 only).
    window_send: i64,
    window_recv: i64,
    decoder: HpackDecoder,
    encoder: HpackEncoder,
    streams: StreamTable,
    /// Highest stream id seen per side, indexed by [`Peer`].
    last_stream: [u32; 2],
    stream_count: [u32; 2],
    /// Last remote stream covered by a GOAWAY this side sent.
    goaway_sent: Option<u32>,
    reset_history: ResetHistory,
    continued: Option<Continued>,
    /// HTTP/1: the stream currently being read, 0 when between messages.
    h1_stream: u32,
    h1_remaining: BodyLen,
    h1_chunk: u64,
    /// HTTP/1: head delivered, waiting for the host's Upgrade decision.
    h1_paused: bool,
    /// Switch to HTTP/2 once the current h1 exchange is fully read.
    h1_upgrade_h2c: bool,
}

impl<E: Events> Connection<E> {
    pub fn new(role: Role, events: E) -> Self {
        Self::with_config(role, Config::default(), events)
    }

    pub fn with_config(role: Role, config: Config, events: E) -> Self {
        let local = config.settings.clone();
        Self {
            events,
            role,
            config,
            mode: Mode::Uninitialized,
            state: State::Closed,
            buffer: BytesMut::new(),
            local,
            remote: Settings::standard(),
            window_send: 65535,
            window_recv: 65535,
            decoder: HpackDecoder::new(),
            encoder: HpackEncoder::new(),
            streams: StreamTable::default(),
            last_stream: [0, 0],
            stream_count: [0, 0],
            goaway_sent: None,
            reset_history: ResetHistory::default(),
            continued: None,
            h1_stream: 0,
            h1_remaining: BodyLen::Exact(0),
            h1_chunk: 0,
            h1_paused: false,
            h1_upgrade_h2c: false,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_http2(&self) -> bool {
        self.mode == Mode::Http2
    }

    pub fn events(&self) -> &E {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    pub fn into_events(self) -> E {
        self.events
    }

    /// The id the next locally-initiated stream will get.
    pub fn next_local_stream(&self) -> u32 {
        let last = self.last_stream[Peer::Local as usize];
        match (last, self.role) {
            (0, Role::Client) => 1,
            (0, Role::Server) => 2,
            (last, _) => last + 2,
        }
    }

    /// Start the connection with the host-selected protocol version.
    ///
    /// HTTP/2 emits the client preface (clients only) and the initial
    /// SETTINGS synchronously.
    pub fn begin(&mut self, version: Version) -> Result<()> {
        if self.state != State::Closed || self.mode != Mode::Uninitialized {
            return Err(Error::Assertion("connection already started"));
        }
        self.local = self.config.settings.clone();
        self.decoder.set_limit(self.local.header_table_size);
        match version {
            Version::Http2 => self.state = State::H2Init,
            Version::Http1 => {
                self.mode = Mode::Http1;
                self.state = State::H1Head;
            }
        }
        self.drive()
    }

    /// Feed inbound bytes. Advances the state machine as far as the
    /// buffered input allows, firing callbacks along the way.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        if self.state == State::Closed {
            return Err(match self.mode {
                Mode::Uninitialized => Error::Assertion("connection not started"),
                _ => Error::Disconnect,
            });
        }
        self.buffer.extend_from_slice(data);
        self.drive()
    }

    /// The peer will send no more bytes.
    pub fn eof(&mut self) -> Result<()> {
        let result = match self.mode {
            Mode::Http2 => {
                for id in self.streams.ids() {
                    self.stream_end(id)?;
                }
                Ok(())
            }
            Mode::Http1 => {
                if self.h1_stream != 0 {
                    match self.h1_remaining {
                        BodyLen::UntilEof => {
                            let sid = self.h1_stream;
                            self.h1_stream = 0;
                            self.events.message_tail(sid, None)?;
                            self.close_read(sid)
                        }
                        _ => Err(Error::Disconnect),
                    }
                } else if self.buffer.is_empty() {
                    Ok(())
                } else {
                    Err(Error::Disconnect)
                }
            }
            Mode::Uninitialized => Ok(()),
        };
        self.state = State::Closed;
        result
    }

    /// Announce a graceful close: GOAWAY(NO_ERROR) covering everything
    /// the peer has opened so far. A no-op outside HTTP/2.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.mode != Mode::Http2 {
            return Ok(());
        }
        let last = self
            .goaway_sent
            .unwrap_or(self.last_stream[Peer::Remote as usize]);
        self.write_frame(&Frame::goaway(last, error_code::NO_ERROR))?;
        self.goaway_sent = Some(last);
        Ok(())
    }

    fn drive(&mut self) -> Result<()> {
        loop {
            let step = match self.state {
                State::Closed => return Ok(()),
                State::H2Init => self.when_h2_init()?,
                State::H2Preface => self.when_h2_preface()?,
                State::H2Settings => self.when_h2_settings()?,
                State::H2Frame => self.when_h2_frame()?,
                State::H1Head => self.when_h1_head()?,
                State::H1Body => self.when_h1_body()?,
                State::H1Tail => self.when_h1_tail()?,
                State::H1Chunk => self.when_h1_chunk()?,
                State::H1ChunkBody => self.when_h1_chunk_body()?,
                State::H1ChunkTail => self.when_h1_chunk_tail()?,
                State::H1Trailers => self.when_h1_trailers()?,
            };
            match step {
                Step::Wait => return Ok(()),
                Step::Goto(next) => self.state = next,
            }
        }
    }

    // ---- HTTP/2 receive states ----

    fn when_h2_init(&mut self) -> Result<Step> {
        self.mode = Mode::Http2;
        self.window_send = 65535;
        self.window_recv = 65535;
        if self.role == Role::Client {
            self.writev(&[CONNECTION_PREFACE])?;
        }
        let mut payload = BytesMut::new();
        self.local.encode_delta(&Settings::standard(), &mut payload);
        self.write_frame(&Frame::settings(payload.freeze()))?;
        Ok(Step::Goto(State::H2Preface))
    }

    fn when_h2_preface(&mut self) -> Result<Step> {
        if self.role == Role::Server {
            let n = self.buffer.len().min(CONNECTION_PREFACE.len());
            if self.buffer[..n] != CONNECTION_PREFACE[..n] {
                return Err(self.fatal(error_code::PROTOCOL_ERROR, "invalid connection preface"));
            }
            if n < CONNECTION_PREFACE.len() {
                return Ok(Step::Wait);
            }
            self.buffer.advance(CONNECTION_PREFACE.len());
        }
        Ok(Step::Goto(State::H2Settings))
    }

    fn when_h2_settings(&mut self) -> Result<Step> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(Step::Wait);
        }
        let head = FrameHeader::parse(&self.buffer).unwrap();
        if head.frame_type != frame_type::SETTINGS || head.flags != 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "expected a SETTINGS frame"));
        }
        if head.length > self.local.max_frame_size {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "oversized SETTINGS frame"));
        }
        Ok(Step::Goto(State::H2Frame))
    }

    fn when_h2_frame(&mut self) -> Result<Step> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(Step::Wait);
        }
        let head = FrameHeader::parse(&self.buffer).unwrap();
        if head.length > self.local.max_frame_size {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "frame exceeds MAX_FRAME_SIZE"));
        }
        if self.buffer.len() < head.total_size() {
            return Ok(Step::Wait);
        }
        self.buffer.advance(FRAME_HEADER_SIZE);
        let payload = self.buffer.split_to(head.length as usize).freeze();
        log::trace!(
            "processing frame type={} flags={:#04x} stream={} len={}",
            head.frame_type,
            head.flags,
            head.stream_id,
            head.length
        );
        self.events.frame(&head, &payload)?;
        self.handle_frame(head, payload)?;
        Ok(Step::Goto(State::H2Frame))
    }

    // ---- HTTP/2 frame dispatch ----

    fn handle_frame(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if let Some(cont) = &self.continued {
            if head.frame_type != frame_type::CONTINUATION || head.stream_id != cont.stream_id {
                return Err(self.fatal(
                    error_code::PROTOCOL_ERROR,
                    "expected CONTINUATION of the open header block",
                ));
            }
        }
        match head.frame_type {
            frame_type::DATA => self.handle_data(head, payload),
            frame_type::HEADERS => self.handle_headers(head, payload),
            frame_type::PRIORITY => self.handle_priority(head, payload),
            frame_type::RST_STREAM => self.handle_rst_stream(head, payload),
            frame_type::SETTINGS => self.handle_settings(head, payload),
            frame_type::PUSH_PROMISE => self.handle_push_promise(head, payload),
            frame_type::PING => self.handle_ping(head, payload),
            frame_type::GOAWAY => self.handle_goaway(head, payload),
            frame_type::WINDOW_UPDATE => self.handle_window_update(head, payload),
            frame_type::CONTINUATION => self.handle_continuation(head, payload),
            // Unknown frame types are ignored.
            _ => Ok(()),
        }
    }

    fn strip_padding(&mut self, head: &FrameHeader, mut payload: Bytes) -> Result<Bytes> {
        if !head.is_padded() {
            return Ok(payload);
        }
        if payload.is_empty() {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "PADDED frame with no payload"));
        }
        let pad = payload[0] as usize;
        if pad + 1 > payload.len() {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "padding exceeds the frame"));
        }
        payload.advance(1);
        payload.truncate(payload.len() - pad);
        Ok(payload)
    }

    /// Strip the priority section of a HEADERS frame. `None` means the
    /// frame declared itself as its own dependency and was answered with
    /// a reset.
    fn strip_priority(&mut self, head: &FrameHeader, mut payload: Bytes) -> Result<Option<Bytes>> {
        if !head.is_priority() {
            return Ok(Some(payload));
        }
        if payload.len() < 5 {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "truncated priority section"));
        }
        let dependency =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        payload.advance(5);
        if dependency == head.stream_id {
            if self.streams.find(head.stream_id).is_some() {
                self.reset_stream(head.stream_id, error_code::PROTOCOL_ERROR)?;
                return Ok(None);
            }
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "stream depends on itself"));
        }
        Ok(Some(payload))
    }

    fn handle_data(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        let sid = head.stream_id;
        if sid == 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "DATA on stream 0"));
        }
        let frame_len = head.length as i64;
        if frame_len > self.window_recv {
            return Err(self.fatal(
                error_code::FLOW_CONTROL_ERROR,
                "connection receive window exceeded",
            ));
        }
        let data = self.strip_padding(&head, payload)?;
        self.window_recv -= frame_len;
        let padding = frame_len as usize - data.len();

        let r_state = self.streams.find(sid).map(|s| s.r_state);
        match r_state {
            None => {
                if self.reset_history.lookup(sid).is_some() {
                    // In-flight payload for a stream this side reset.
                    return self.replenish(0, frame_len as usize);
                }
                Err(self.fatal(error_code::STREAM_CLOSED, "DATA on a closed stream"))
            }
            Some(state) if state != HalfState::Data => {
                self.replenish(0, frame_len as usize)?;
                self.reset_stream(sid, error_code::STREAM_CLOSED)
            }
            Some(_) => {
                let (over_window, over_length) = {
                    let stream = self.streams.find(sid).unwrap();
                    (
                        frame_len > stream.window_recv + self.local.initial_window_size as i64,
                        matches!(stream.remaining_payload,
                                 Some(remaining) if (data.len() as u64) > remaining),
                    )
                };
                if over_window {
                    self.replenish(0, frame_len as usize)?;
                    return self.reset_stream(sid, error_code::FLOW_CONTROL_ERROR);
                }
                if over_length {
                    self.replenish(0, frame_len as usize)?;
                    return self.reset_stream(sid, error_code::PROTOCOL_ERROR);
                }
                {
                    let stream = self.streams.find_mut(sid).unwrap();
                    stream.window_recv -= frame_len;
                    if let Some(remaining) = stream.remaining_payload {
                        stream.remaining_payload = Some(remaining - data.len() as u64);
                    }
                }
                if !data.is_empty() {
                    self.events.message_data(sid, &data)?;
                }
                if self.config.manual_flow_control {
                    self.replenish(sid, padding)?;
                } else {
                    self.replenish(sid, frame_len as usize)?;
                }
                if head.is_end_stream() {
                    let remaining = self
                        .streams
                        .find(sid)
                        .and_then(|s| s.remaining_payload)
                        .unwrap_or(0);
                    if remaining != 0 {
                        return self.reset_stream(sid, error_code::PROTOCOL_ERROR);
                    }
                    self.events.message_tail(sid, None)?;
                    self.close_read(sid)?;
                }
                Ok(())
            }
        }
    }

    fn handle_headers(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if head.stream_id == 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "HEADERS on stream 0"));
        }
        let payload = self.strip_padding(&head, payload)?;
        let Some(payload) = self.strip_priority(&head, payload)? else {
            return Ok(());
        };
        if !head.is_end_headers() {
            self.continued = Some(Continued {
                stream_id: head.stream_id,
                frame_type: frame_type::HEADERS,
                flags: head.flags,
                promised: 0,
                buffer: BytesMut::from(&payload[..]),
                frames: 0,
            });
            return Ok(());
        }
        self.handle_headers_block(head.stream_id, head.flags, &payload, None)
    }

    fn handle_continuation(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if self.continued.is_none() {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "CONTINUATION without HEADERS"));
        }
        let (done, flooded) = {
            let cont = self.continued.as_mut().unwrap();
            cont.frames += 1;
            cont.buffer.extend_from_slice(&payload);
            (head.is_end_headers(), cont.frames > MAX_CONTINUATIONS)
        };
        if flooded {
            self.continued = None;
            return Err(self.fatal(error_code::ENHANCE_YOUR_CALM, "CONTINUATION flood"));
        }
        if !done {
            return Ok(());
        }
        let cont = self.continued.take().unwrap();
        let merged = cont.flags | flags::END_HEADERS;
        if cont.frame_type == frame_type::PUSH_PROMISE {
            self.handle_push_block(cont.stream_id, cont.promised, &cont.buffer)
        } else {
            self.handle_headers_block(cont.stream_id, merged, &cont.buffer, None)
        }
    }

    fn handle_headers_block(
        &mut self,
        sid: u32,
        fl: u8,
        block: &[u8],
        promised: Option<u32>,
    ) -> Result<()> {
        if let Some(child) = promised {
            return self.handle_push_block(sid, child, block);
        }
        #[derive(PartialEq)]
        enum Target {
            Head,
            Trailers,
            ClosedRead,
            Unknown,
        }
        let target = match self.streams.find(sid).map(|s| s.r_state) {
            Some(HalfState::Headers) => Target::Head,
            Some(HalfState::Data) => Target::Trailers,
            Some(HalfState::Closed) => Target::ClosedRead,
            None => Target::Unknown,
        };
        match target {
            Target::Head => self.emit_message_head(sid, fl, block),
            Target::Trailers => {
                if fl & flags::END_STREAM == 0 {
                    return Err(
                        self.fatal(error_code::PROTOCOL_ERROR, "trailers without END_STREAM")
                    );
                }
                let headers = self.decode_block(block)?;
                let parsed = match message::normalize(headers, HeadKind::Trailers) {
                    Ok(parsed) => parsed,
                    Err(reason) => {
                        log::debug!("stream {}: {}", sid, reason);
                        return self.reset_stream(sid, error_code::PROTOCOL_ERROR);
                    }
                };
                let remaining = self
                    .streams
                    .find(sid)
                    .and_then(|s| s.remaining_payload)
                    .unwrap_or(0);
                if remaining != 0 {
                    return self.reset_stream(sid, error_code::PROTOCOL_ERROR);
                }
                self.events.message_tail(sid, Some(&parsed.message))?;
                self.close_read(sid)
            }
            Target::ClosedRead => {
                // Decode anyway to keep the HPACK tables in sync.
                let _ = self.decode_block(block)?;
                self.reset_stream(sid, error_code::STREAM_CLOSED)
            }
            Target::Unknown => {
                if self.peer_of(sid) == Peer::Local
                    || sid <= self.last_stream[Peer::Remote as usize]
                {
                    if self.reset_history.lookup(sid).is_some() {
                        let _ = self.decode_block(block)?;
                        return Ok(());
                    }
                    return Err(self.fatal(error_code::PROTOCOL_ERROR, "HEADERS on a closed stream"));
                }
                let refused = self.goaway_sent.is_some()
                    || self.stream_count[Peer::Remote as usize]
                        >= self.local.max_concurrent_streams;
                if refused {
                    let _ = self.decode_block(block)?;
                    self.write_frame(&Frame::rst_stream(sid, error_code::REFUSED_STREAM))?;
                    self.reset_history.push(sid, true);
                    return Ok(());
                }
                self.stream_open(sid, Peer::Remote)?;
                self.emit_message_head(sid, fl, block)
            }
        }
    }

    /// Decode, validate, and deliver a message head on an existing stream.
    fn emit_message_head(&mut self, sid: u32, fl: u8, block: &[u8]) -> Result<()> {
        let headers = self.decode_block(block)?;
        let kind = match self.role {
            Role::Server => HeadKind::Request,
            Role::Client => HeadKind::Response,
        };
        let parsed = match message::normalize(headers, kind) {
            Ok(parsed) => parsed,
            Err(reason) => {
                log::debug!("stream {}: {}", sid, reason);
                return self.reset_stream(sid, error_code::PROTOCOL_ERROR);
            }
        };
        if parsed.message.is_informational() {
            if fl & flags::END_STREAM != 0 {
                return self.reset_stream(sid, error_code::PROTOCOL_ERROR);
            }
            // The read half stays in HEADERS so the final response can
            // still arrive on this stream.
            return self.events.message_head(sid, &parsed.message);
        }
        {
            let stream = self.streams.find_mut(sid).unwrap();
            stream.r_state = HalfState::Data;
            stream.remaining_payload = if stream.head_response {
                Some(0)
            } else {
                parsed.content_length
            };
        }
        self.events.message_head(sid, &parsed.message)?;
        if fl & flags::END_STREAM != 0 {
            let remaining = self
                .streams
                .find(sid)
                .and_then(|s| s.remaining_payload)
                .unwrap_or(0);
            if remaining != 0 {
                return self.reset_stream(sid, error_code::PROTOCOL_ERROR);
            }
            self.events.message_tail(sid, None)?;
            self.close_read(sid)?;
        }
        Ok(())
    }

    fn handle_push_promise(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if self.role != Role::Client {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "PUSH_PROMISE from the client"));
        }
        if self.local.enable_push == 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "push is disabled"));
        }
        if head.stream_id == 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "PUSH_PROMISE on stream 0"));
        }
        let mut payload = self.strip_padding(&head, payload)?;
        if payload.len() < 4 {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "truncated PUSH_PROMISE"));
        }
        let parent_open = matches!(
            self.streams.find(head.stream_id),
            Some(s) if head.stream_id & 1 == 1 && s.r_state != HalfState::Closed
        );
        if !parent_open {
            return Err(self.fatal(
                error_code::PROTOCOL_ERROR,
                "PUSH_PROMISE on an invalid parent stream",
            ));
        }
        let promised =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        payload.advance(4);
        if !head.is_end_headers() {
            self.continued = Some(Continued {
                stream_id: head.stream_id,
                frame_type: frame_type::PUSH_PROMISE,
                flags: head.flags,
                promised,
                buffer: BytesMut::from(&payload[..]),
                frames: 0,
            });
            return Ok(());
        }
        self.handle_push_block(head.stream_id, promised, &payload)
    }

    fn handle_push_block(&mut self, parent: u32, child: u32, block: &[u8]) -> Result<()> {
        let refused = self.goaway_sent.is_some()
            || self.stream_count[Peer::Remote as usize] >= self.local.max_concurrent_streams;
        if refused {
            let _ = self.decode_block(block)?;
            self.write_frame(&Frame::rst_stream(child, error_code::REFUSED_STREAM))?;
            self.reset_history.push(child, true);
            return Ok(());
        }
        self.stream_open(child, Peer::Remote)?;
        let headers = self.decode_block(block)?;
        match message::normalize(headers, HeadKind::Request) {
            Ok(parsed) => self.events.message_push(child, &parsed.message, parent),
            Err(reason) => {
                log::debug!("pushed stream {}: {}", child, reason);
                self.reset_stream(child, error_code::PROTOCOL_ERROR)
            }
        }
    }

    fn handle_priority(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if head.stream_id == 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "PRIORITY on stream 0"));
        }
        if head.length != 5 {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "PRIORITY must be 5 bytes"));
        }
        let dependency =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        if dependency == head.stream_id {
            if self.streams.find(head.stream_id).is_some() {
                return self.reset_stream(head.stream_id, error_code::PROTOCOL_ERROR);
            }
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "stream depends on itself"));
        }
        // Prioritization is parsed and ignored.
        log::trace!("ignoring PRIORITY for stream {}", head.stream_id);
        Ok(())
    }

    fn handle_rst_stream(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if head.stream_id == 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "RST_STREAM on stream 0"));
        }
        if head.length != 4 {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "RST_STREAM must be 4 bytes"));
        }
        let code = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]);
        if self.streams.find(head.stream_id).is_some() {
            log::trace!("stream {} reset by peer ({})", head.stream_id, code);
            self.stream_end(head.stream_id)
        } else if self.reset_history.lookup(head.stream_id).is_some() {
            Ok(())
        } else {
            Err(self.fatal(error_code::PROTOCOL_ERROR, "RST_STREAM on an idle stream"))
        }
    }

    fn handle_settings(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if head.stream_id != 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "SETTINGS on a stream"));
        }
        if head.is_ack() {
            if !payload.is_empty() {
                return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "SETTINGS ACK with payload"));
            }
            return Ok(());
        }
        if payload.len() % 6 != 0 {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "truncated SETTINGS payload"));
        }
        let old_window = self.remote.initial_window_size;
        for record in payload.chunks(6) {
            let id = u16::from_be_bytes([record[0], record[1]]);
            let value = u32::from_be_bytes([record[2], record[3], record[4], record[5]]);
            if let Err((code, reason)) = self.remote.apply(id, value) {
                return Err(self.fatal(code, reason));
            }
        }
        self.encoder
            .set_limit(self.remote.header_table_size.min(self.local.header_table_size));
        self.write_frame(&Frame::settings_ack())?;
        if self.remote.initial_window_size > old_window {
            self.events.flow_increase(0)?;
        }
        self.events.settings()
    }

    fn handle_ping(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if head.stream_id != 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "PING on a stream"));
        }
        if head.length != 8 {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "PING must be 8 bytes"));
        }
        let mut data = [0u8; 8];
        data.copy_from_slice(&payload[..8]);
        if head.is_ack() {
            self.events.pong(data)
        } else {
            self.write_frame(&Frame::ping(data, true))
        }
    }

    fn handle_goaway(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if head.stream_id != 0 {
            return Err(self.fatal(error_code::PROTOCOL_ERROR, "GOAWAY on a stream"));
        }
        if head.length < 8 {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "truncated GOAWAY"));
        }
        let code = u32::from_be_bytes([payload[4], payload[5], payload[6], payload[7]]);
        log::trace!("processing GOAWAY ({})", code);
        self.state = State::Closed;
        if code == error_code::NO_ERROR {
            Err(Error::Disconnect)
        } else {
            Err(Error::Protocol("the peer sent GOAWAY with an error"))
        }
    }

    fn handle_window_update(&mut self, head: FrameHeader, payload: Bytes) -> Result<()> {
        if head.length != 4 {
            return Err(self.fatal(error_code::FRAME_SIZE_ERROR, "WINDOW_UPDATE must be 4 bytes"));
        }
        let increment =
            u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7FFF_FFFF;
        let sid = head.stream_id;
        if sid == 0 {
            if increment == 0 {
                return Err(self.fatal(error_code::PROTOCOL_ERROR, "zero window increment"));
            }
            self.window_send += increment as i64;
            if self.window_send > MAX_WINDOW {
                return Err(self.fatal(
                    error_code::FLOW_CONTROL_ERROR,
                    "connection send window overflow",
                ));
            }
            return self.events.flow_increase(0);
        }
        if self.streams.find(sid).is_some() {
            if increment == 0 {
                return self.reset_stream(sid, error_code::PROTOCOL_ERROR);
            }
            let overflow = {
                let stream = self.streams.find_mut(sid).unwrap();
                stream.window_send += increment as i64;
                stream.window_send + self.remote.initial_window_size as i64 > MAX_WINDOW
            };
            if overflow {
                return self.reset_stream(sid, error_code::FLOW_CONTROL_ERROR);
            }
            return self.events.flow_increase(sid);
        }
        if self.reset_history.lookup(sid).is_some()
            || sid <= self.last_stream[self.peer_of(sid) as usize]
        {
            Ok(())
        } else {
            Err(self.fatal(error_code::PROTOCOL_ERROR, "WINDOW_UPDATE on an idle stream"))
        }
    }

    fn decode_block(&mut self, block: &[u8]) -> Result<Vec<message::Header>> {
        match self.decoder.decode(block) {
            // Pseudo-headers ride on top of the regular-header cap.
            Ok(headers) if headers.len() > MAX_HEADERS + 5 => {
                Err(self.fatal(error_code::PROTOCOL_ERROR, "too many headers"))
            }
            Ok(headers) => Ok(headers),
            Err(_) => Err(self.fatal(error_code::COMPRESSION_ERROR, "malformed header block")),
        }
    }

    // ---- HTTP/1 receive states ----

    fn when_h1_head(&mut self) -> Result<Step> {
        if self.role == Role::Server
            && !self.config.disallow_h2_prior_knowledge
            && self.last_stream[Peer::Remote as usize] == 0
        {
            let n = self.buffer.len().min(CONNECTION_PREFACE.len());
            if n > 0 && self.buffer[..n] == CONNECTION_PREFACE[..n] {
                if n < CONNECTION_PREFACE.len() {
                    return Ok(Step::Wait);
                }
                // Prior-knowledge HTTP/2; the preface is consumed by the
                // h2 handshake states.
                return Ok(Step::Goto(State::H2Init));
            }
        }
        if self.buffer.is_empty() {
            return Ok(Step::Wait);
        }
        match self.role {
            Role::Server => self.h1_request_head(),
            Role::Client => self.h1_response_head(),
        }
    }

    fn h1_request_head(&mut self) -> Result<Step> {
        let Some(head) = h1::parse_request(&self.buffer)? else {
            return Ok(Step::Wait);
        };
        if self.streams.len() >= 1 {
            return Err(Error::Protocol("HTTP/1 pipelining is not supported"));
        }
        let ingested = h1::ingest(head.headers, true)?;
        self.buffer.advance(head.consumed);

        let last = self.last_stream[Peer::Remote as usize];
        let sid = if last == 0 { 1 } else { last + 2 };
        self.stream_open(sid, Peer::Remote)?;

        let mut upgrade_plain = false;
        if let Some(upgrade) = &ingested.upgrade {
            if upgrade.eq_ignore_ascii_case("h2c") {
                if !self.config.disallow_h2_upgrade && sid == 1 {
                    self.writev(&[UPGRADE_RESPONSE])?;
                    self.h1_upgrade_h2c = true;
                }
            } else {
                upgrade_plain = true;
            }
        }

        self.h1_stream = sid;
        self.h1_remaining = if ingested.chunked {
            BodyLen::Chunked
        } else {
            BodyLen::Exact(ingested.content_length.unwrap_or(0))
        };
        {
            let stream = self.streams.find_mut(sid).unwrap();
            stream.r_state = HalfState::Data;
        }
        let message = Message {
            code: 0,
            method: head.method,
            path: head.path,
            headers: ingested.headers,
        };
        self.events.message_head(sid, &message)?;
        if upgrade_plain {
            // The host answers by writing some response head; a 101
            // switches the remaining payload to raw passthrough.
            self.h1_paused = true;
            self.events.upgrade()?;
        }
        Ok(Step::Goto(State::H1Body))
    }

    fn h1_response_head(&mut self) -> Result<Step> {
        let sid = self.last_stream[Peer::Local as usize];
        let awaiting = matches!(
            self.streams.find(sid).map(|s| s.r_state),
            Some(HalfState::Headers)
        );
        if sid == 0 || !awaiting {
            return Err(Error::Protocol("response without an outstanding request"));
        }
        let Some(head) = h1::parse_response(&self.buffer)? else {
            return Ok(Step::Wait);
        };
        let ingested = h1::ingest(head.headers, false)?;
        self.buffer.advance(head.consumed);

        let message = Message::response(head.code, ingested.headers);
        if message.is_informational() && message.code != 101 {
            if ingested.chunked || ingested.content_length.unwrap_or(0) > 0 {
                return Err(Error::Protocol("informational response with a payload"));
            }
            // The final response will follow on the same stream.
            self.events.message_head(sid, &message)?;
            return Ok(Step::Goto(State::H1Head));
        }

        let head_response = self.streams.find(sid).unwrap().head_response;
        self.h1_stream = sid;
        self.h1_remaining = if message.code == 101 {
            BodyLen::UntilEof
        } else if head_response {
            BodyLen::Exact(0)
        } else if ingested.chunked {
            BodyLen::Chunked
        } else if let Some(length) = ingested.content_length {
            BodyLen::Exact(length)
        } else if message.code == 204 || message.code == 304 {
            BodyLen::Exact(0)
        } else {
            BodyLen::UntilEof
        };
        {
            let stream = self.streams.find_mut(sid).unwrap();
            stream.r_state = HalfState::Data;
        }
        self.events.message_head(sid, &message)?;
        Ok(Step::Goto(State::H1Body))
    }

    fn when_h1_body(&mut self) -> Result<Step> {
        if self.h1_paused {
            return Ok(Step::Wait);
        }
        let sid = self.h1_stream;
        match self.h1_remaining {
            BodyLen::Exact(0) => Ok(Step::Goto(State::H1Tail)),
            BodyLen::Exact(remaining) => {
                if self.buffer.is_empty() {
                    return Ok(Step::Wait);
                }
                let take = (self.buffer.len() as u64).min(remaining) as usize;
                let data = self.buffer.split_to(take).freeze();
                self.h1_remaining = BodyLen::Exact(remaining - take as u64);
                self.events.message_data(sid, &data)?;
                if remaining == take as u64 {
                    Ok(Step::Goto(State::H1Tail))
                } else {
                    Ok(Step::Wait)
                }
            }
            BodyLen::Chunked => Ok(Step::Goto(State::H1Chunk)),
            BodyLen::UntilEof => {
                if self.buffer.is_empty() {
                    return Ok(Step::Wait);
                }
                let data = self.buffer.split_to(self.buffer.len()).freeze();
                self.events.message_data(sid, &data)?;
                Ok(Step::Wait)
            }
        }
    }

    fn when_h1_chunk(&mut self) -> Result<Step> {
        match h1::parse_chunk_size(&self.buffer)? {
            None => Ok(Step::Wait),
            Some((consumed, 0)) => {
                self.buffer.advance(consumed);
                Ok(Step::Goto(State::H1Trailers))
            }
            Some((consumed, size)) => {
                self.buffer.advance(consumed);
                self.h1_chunk = size;
                Ok(Step::Goto(State::H1ChunkBody))
            }
        }
    }

    fn when_h1_chunk_body(&mut self) -> Result<Step> {
        if self.buffer.is_empty() {
            return Ok(Step::Wait);
        }
        let take = (self.buffer.len() as u64).min(self.h1_chunk) as usize;
        let data = self.buffer.split_to(take).freeze();
        self.h1_chunk -= take as u64;
        self.events.message_data(self.h1_stream, &data)?;
        if self.h1_chunk == 0 {
            Ok(Step::Goto(State::H1ChunkTail))
        } else {
            Ok(Step::Wait)
        }
    }

    fn when_h1_chunk_tail(&mut self) -> Result<Step> {
        if self.buffer.len() < 2 {
            return Ok(Step::Wait);
        }
        if &self.buffer[..2] != b"\r\n" {
            return Err(Error::Protocol("chunk not followed by CRLF"));
        }
        self.buffer.advance(2);
        Ok(Step::Goto(State::H1Chunk))
    }

    fn when_h1_trailers(&mut self) -> Result<Step> {
        // TODO: surface trailer fields through message_tail instead of
        // discarding them.
        loop {
            let Some(eol) = self.buffer.windows(2).position(|w| w == b"\r\n") else {
                return Ok(Step::Wait);
            };
            if eol == 0 {
                self.buffer.advance(2);
                return Ok(Step::Goto(State::H1Tail));
            }
            self.buffer.advance(eol + 2);
        }
    }

    fn when_h1_tail(&mut self) -> Result<Step> {
        let sid = self.h1_stream;
        self.h1_stream = 0;
        self.h1_remaining = BodyLen::Exact(0);
        self.events.message_tail(sid, None)?;
        self.close_read(sid)?;
        if self.h1_upgrade_h2c {
            self.h1_upgrade_h2c = false;
            return Ok(Step::Goto(State::H2Init));
        }
        Ok(Step::Goto(State::H1Head))
    }

    // ---- write path ----

    /// Send a request or response head on `sid`, creating the stream for
    /// new client-initiated requests. `last` closes the write half.
    pub fn write_head(&mut self, sid: u32, message: &Message, last: bool) -> Result<()> {
        if self.state == State::Closed {
            return Err(match self.mode {
                Mode::Uninitialized => Error::Assertion("connection not started"),
                _ => Error::Disconnect,
            });
        }
        match self.role {
            Role::Client => {
                if message.code != 0 {
                    return Err(Error::Assertion("clients send requests, not responses"));
                }
                if message.method.is_empty()
                    || (message.path.is_empty() && message.method != "CONNECT")
                {
                    return Err(Error::Assertion("request lacks a method or path"));
                }
            }
            Role::Server => {
                if message.code == 0 {
                    return Err(Error::Assertion("responses carry a status code"));
                }
                if !message.method.is_empty() || !message.path.is_empty() {
                    return Err(Error::Assertion("responses cannot carry a method or path"));
                }
            }
        }
        let informational = message.is_informational();
        if informational && last {
            return Err(Error::Assertion("informational responses cannot end the stream"));
        }
        self.validate_header_names(message, self.role == Role::Client)?;

        if self.streams.find(sid).is_none() {
            if self.role == Role::Client && self.peer_of(sid) == Peer::Local {
                self.stream_open(sid, Peer::Local)?;
            } else {
                return Err(Error::InvalidStream(sid));
            }
        }
        if self.streams.find(sid).unwrap().w_state != HalfState::Headers {
            return Err(Error::Assertion("message head already sent"));
        }

        match self.mode {
            Mode::Http2 => {
                let block = self.encode_head(message);
                self.write_frame(&Frame::headers(sid, block.into(), last))?;
            }
            Mode::Http1 => {
                use std::fmt::Write;
                let mut head = String::new();
                if self.role == Role::Client {
                    let _ = write!(head, "{} {} HTTP/1.1\r\n", message.method, message.path);
                } else {
                    let _ = write!(
                        head,
                        "HTTP/1.1 {} {}\r\n",
                        message.code,
                        h1::reason_phrase(message.code)
                    );
                }
                let mut has_length = false;
                for header in &message.headers {
                    match header.name.as_str() {
                        ":authority" => {
                            let _ = write!(head, "host: {}\r\n", header.value);
                        }
                        name if name.starts_with(':') => {}
                        name => {
                            if name == "content-length" || name == "transfer-encoding" {
                                has_length = true;
                            }
                            let _ = write!(head, "{}: {}\r\n", name, header.value);
                        }
                    }
                }
                let chunked = !last
                    && !has_length
                    && !informational
                    && message.code != 204
                    && message.code != 304;
                if chunked {
                    head.push_str("transfer-encoding: chunked\r\n");
                }
                head.push_str("\r\n");
                self.writev(&[head.as_bytes()])?;
                if chunked {
                    self.streams.find_mut(sid).unwrap().writing_chunked = true;
                }
            }
            Mode::Uninitialized => return Err(Error::Assertion("connection not started")),
        }

        if self.role == Role::Client && message.method == "HEAD" {
            self.streams.find_mut(sid).unwrap().head_response = true;
        }
        // 101 terminates the HTTP exchange, so it opens the write half
        // like a final response would.
        if !informational || message.code == 101 {
            self.streams.find_mut(sid).unwrap().w_state = HalfState::Data;
        }
        let resume = self.mode == Mode::Http1 && self.h1_paused && sid == self.h1_stream;
        if resume {
            self.h1_paused = false;
            if message.code == 101 {
                self.h1_remaining = BodyLen::UntilEof;
            }
        }
        if last {
            self.finalize_write(sid)?;
        }
        if resume {
            self.drive()?;
        }
        Ok(())
    }

    /// Send payload bytes. Returns how many were actually written, which
    /// under HTTP/2 may be less than offered when a flow window is
    /// exhausted; the rest must be retried after `flow_increase`.
    pub fn write_data(&mut self, sid: u32, data: &[u8], last: bool) -> Result<usize> {
        if self.state == State::Closed {
            return Err(match self.mode {
                Mode::Uninitialized => Error::Assertion("connection not started"),
                _ => Error::Disconnect,
            });
        }
        let Some(stream) = self.streams.find(sid) else {
            return Err(Error::InvalidStream(sid));
        };
        if stream.w_state != HalfState::Data {
            return Err(Error::Assertion("stream is not writable"));
        }
        match self.mode {
            Mode::Http2 => {
                let stream_window =
                    (stream.window_send + self.remote.initial_window_size as i64).max(0);
                let limit = stream_window.min(self.window_send).max(0) as u64;
                let sent = (data.len() as u64).min(limit) as usize;
                let fin = last && sent == data.len();
                if sent > 0 || fin {
                    self.write_frame(&Frame::data(
                        sid,
                        Bytes::copy_from_slice(&data[..sent]),
                        fin,
                    ))?;
                }
                self.window_send -= sent as i64;
                self.streams.find_mut(sid).unwrap().window_send -= sent as i64;
                if fin {
                    self.finalize_write(sid)?;
                }
                Ok(sent)
            }
            Mode::Http1 => {
                let chunked = stream.writing_chunked;
                if chunked {
                    if !data.is_empty() {
                        let size_line = format!("{:x}\r\n", data.len());
                        self.writev(&[size_line.as_bytes(), data, b"\r\n"])?;
                    }
                    if last {
                        self.writev(&[b"0\r\n\r\n"])?;
                    }
                } else if !data.is_empty() {
                    self.writev(&[data])?;
                }
                if last {
                    self.finalize_write(sid)?;
                }
                Ok(data.len())
            }
            Mode::Uninitialized => Err(Error::Assertion("connection not started")),
        }
    }

    /// Promise a pushed request on `parent`. The head and tail of the
    /// synthetic request are delivered back to the host as if the peer
    /// had sent it; the response then goes out on the returned stream.
    /// Quietly does nothing when the peer disabled push or a GOAWAY is
    /// pending. Returns the promised stream id, 0 when skipped.
    pub fn write_push(&mut self, parent: u32, message: &Message) -> Result<u32> {
        if self.role != Role::Server {
            return Err(Error::Assertion("only servers push"));
        }
        if self.mode != Mode::Http2 {
            return Err(Error::Assertion("push requires HTTP/2"));
        }
        if message.code != 0 || message.method.is_empty() {
            return Err(Error::Assertion("pushed message must be a request"));
        }
        self.validate_header_names(message, true)?;
        let parent_open = matches!(
            self.streams.find(parent),
            Some(s) if parent & 1 == 1 && s.w_state != HalfState::Closed
        );
        if !parent_open {
            return Err(Error::InvalidStream(parent));
        }
        if self.remote.enable_push == 0 || self.goaway_sent.is_some() {
            return Ok(0);
        }
        let child = self.next_local_stream();
        self.stream_open(child, Peer::Local)?;
        let block = self.encode_head(message);
        self.write_frame(&Frame::push_promise(parent, child, &block))?;
        self.events.message_head(child, message)?;
        self.events.message_tail(child, None)?;
        Ok(child)
    }

    /// Abort a stream, or the whole connection when `sid` is 0. A no-op
    /// outside HTTP/2.
    pub fn write_reset(&mut self, sid: u32, code: u32) -> Result<()> {
        if self.mode != Mode::Http2 {
            return Ok(());
        }
        if sid == 0 {
            let last = self
                .goaway_sent
                .unwrap_or(self.last_stream[Peer::Remote as usize]);
            self.write_frame(&Frame::goaway(last, code))?;
            self.goaway_sent = Some(last);
            return Ok(());
        }
        if self.streams.find(sid).is_some() {
            self.reset_stream(sid, code)
        } else {
            Ok(())
        }
    }

    pub fn write_ping(&mut self, payload: [u8; 8]) -> Result<()> {
        if self.mode != Mode::Http2 {
            return Err(Error::Assertion("pings require HTTP/2"));
        }
        self.write_frame(&Frame::ping(payload, false))
    }

    /// Explicitly replenish a receive window (`sid` 0 for the connection
    /// window) and tell the peer with a WINDOW_UPDATE. The escape hatch
    /// for manual flow control.
    pub fn open_flow(&mut self, sid: u32, delta: u32) -> Result<()> {
        if self.mode != Mode::Http2 {
            return Err(Error::Assertion("flow control requires HTTP/2"));
        }
        if delta == 0 {
            return Ok(());
        }
        if delta > 0x7FFF_FFFF {
            return Err(Error::Assertion("window increment too large"));
        }
        if sid == 0 {
            self.window_recv += delta as i64;
            return self.write_frame(&Frame::window_update(0, delta));
        }
        match self.streams.find_mut(sid) {
            None => Err(Error::InvalidStream(sid)),
            Some(stream) => {
                stream.window_recv += delta as i64;
                self.write_frame(&Frame::window_update(sid, delta))
            }
        }
    }

    // ---- plumbing ----

    fn peer_of(&self, id: u32) -> Peer {
        let client_side = id & 1 == 1;
        if (self.role == Role::Client) == client_side {
            Peer::Local
        } else {
            Peer::Remote
        }
    }

    fn validate_header_names(&self, message: &Message, request: bool) -> Result<()> {
        for header in &message.headers {
            let name = header.name.as_str();
            if name.starts_with(':') {
                if !(request && (name == ":authority" || name == ":scheme")) {
                    return Err(Error::Assertion("unexpected pseudo-header"));
                }
            } else if !message::valid_name(name) {
                return Err(Error::Assertion("header names must be lowercase tokens"));
            }
        }
        Ok(())
    }

    fn encode_head(&mut self, message: &Message) -> Vec<u8> {
        let code_string;
        let mut pairs: Vec<(&[u8], &[u8])> = Vec::with_capacity(message.headers.len() + 2);
        if message.code != 0 {
            code_string = message.code.to_string();
            pairs.push((b":status", code_string.as_bytes()));
        } else {
            pairs.push((b":method", message.method.as_bytes()));
            if !message.path.is_empty() {
                pairs.push((b":path", message.path.as_bytes()));
            }
        }
        for header in &message.headers {
            pairs.push((header.name.as_bytes(), header.value.as_bytes()));
        }
        self.encoder.encode(pairs)
    }

    /// Open a stream, enforcing parity, monotonicity, and (for local
    /// streams) the peer's concurrency limit.
    fn stream_open(&mut self, id: u32, initiator: Peer) -> Result<()> {
        let local = initiator == Peer::Local;
        let client_side = id & 1 == 1;
        let expected_client = matches!(
            (self.role, initiator),
            (Role::Client, Peer::Local) | (Role::Server, Peer::Remote)
        );
        if id == 0
            || id > 0x7FFF_FFFF
            || client_side != expected_client
            || id <= self.last_stream[initiator as usize]
        {
            return Err(if local {
                if id > 0x7FFF_FFFF {
                    Error::WouldBlock
                } else {
                    Error::InvalidStream(id)
                }
            } else {
                self.fatal(error_code::PROTOCOL_ERROR, "invalid stream id")
            });
        }
        if local {
            let limit = if self.mode == Mode::Http2 {
                self.remote.max_concurrent_streams
            } else {
                1
            };
            if self.stream_count[Peer::Local as usize] >= limit {
                return Err(Error::WouldBlock);
            }
        }
        // The side that will never read or write a pushed (even) stream
        // starts with that half pre-closed.
        let (r_state, w_state) = if client_side {
            (HalfState::Headers, HalfState::Headers)
        } else {
            match self.role {
                Role::Server => (HalfState::Closed, HalfState::Headers),
                Role::Client => (HalfState::Headers, HalfState::Closed),
            }
        };
        self.streams.insert(Stream::new(id, r_state, w_state));
        self.last_stream[initiator as usize] = id;
        self.stream_count[initiator as usize] += 1;
        self.events.stream_start(id)
    }

    fn close_read(&mut self, sid: u32) -> Result<()> {
        let both_closed = match self.streams.find_mut(sid) {
            None => return Ok(()),
            Some(stream) => {
                stream.r_state = HalfState::Closed;
                stream.w_state == HalfState::Closed
            }
        };
        if both_closed {
            self.stream_end(sid)?;
        }
        Ok(())
    }

    /// Close the write half after a final head or payload chunk.
    fn finalize_write(&mut self, sid: u32) -> Result<()> {
        let read_open = match self.streams.find_mut(sid) {
            None => return Ok(()),
            Some(stream) => {
                stream.w_state = HalfState::Closed;
                stream.r_state != HalfState::Closed
            }
        };
        if !read_open {
            return self.stream_end(sid);
        }
        if self.mode == Mode::Http2 && self.role == Role::Server {
            // Tell the peer the rest of its payload will not be read.
            self.write_frame(&Frame::rst_stream(sid, error_code::NO_ERROR))?;
            return self.stream_end_by_local(sid);
        }
        Ok(())
    }

    /// Answer a stream-scoped violation: RST_STREAM, then forget the
    /// stream. Never surfaces an error to `feed`.
    fn reset_stream(&mut self, sid: u32, code: u32) -> Result<()> {
        log::trace!("resetting stream {} ({})", sid, code);
        self.write_frame(&Frame::rst_stream(sid, code))?;
        self.stream_end_by_local(sid)
    }

    fn stream_end_by_local(&mut self, sid: u32) -> Result<()> {
        if let Some(stream) = self.streams.find(sid) {
            if stream.r_state != HalfState::Closed {
                // The peer may still have frames in flight for this id.
                self.reset_history
                    .push(sid, stream.r_state == HalfState::Headers);
            }
        }
        self.stream_end(sid)
    }

    fn stream_end(&mut self, sid: u32) -> Result<()> {
        if self.streams.remove(sid).is_some() {
            let initiator = self.peer_of(sid);
            self.stream_count[initiator as usize] -= 1;
            self.events.stream_end(sid)?;
        }
        Ok(())
    }

    /// Restore receive windows consumed by a DATA frame and notify the
    /// peer. `sid` 0 replenishes the connection window only.
    fn replenish(&mut self, sid: u32, amount: usize) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        self.window_recv += amount as i64;
        self.write_frame(&Frame::window_update(0, amount as u32))?;
        if sid != 0 {
            let open = match self.streams.find_mut(sid) {
                Some(stream) if stream.r_state != HalfState::Closed => {
                    stream.window_recv += amount as i64;
                    true
                }
                _ => false,
            };
            if open {
                self.write_frame(&Frame::window_update(sid, amount as u32))?;
            }
        }
        Ok(())
    }

    /// Emit a GOAWAY (HTTP/2) and build the error every connection-fatal
    /// peer violation surfaces through `feed`.
    fn fatal(&mut self, code: u32, reason: &'static str) -> Error {
        log::debug!("connection error {}: {}", code, reason);
        if self.mode == Mode::Http2 {
            let last = self
                .goaway_sent
                .unwrap_or(self.last_stream[Peer::Remote as usize]);
            if self.write_frame(&Frame::goaway(last, code)).is_ok() {
                self.goaway_sent = Some(last);
            }
        }
        if code == error_code::COMPRESSION_ERROR {
            Error::Compression(reason)
        } else {
            Error::Protocol(reason)
        }
    }

    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let mut out = BytesMut::with_capacity(FRAME_HEADER_SIZE + frame.payload.len());
        frame.encode(self.remote.max_frame_size, &mut out)?;
        self.writev(&[&out[..]])
    }

    fn writev(&mut self, chunks: &[&[u8]]) -> Result<()> {
        self.events.writev(chunks).map_err(|_| Error::Disconnect)
    }
}
