//! Stream lifecycle tracking.
//!
//! Each stream keeps independent read and write half-states plus
//! flow-window deltas relative to the SETTINGS-declared initial window.
//! Per the effective send window equation, the deltas survive mid-flight
//! `INITIAL_WINDOW_SIZE` changes without per-stream fixups.

use std::collections::HashMap;

/// Entries kept in the reset-history ring.
pub(crate) const RESET_HISTORY: usize = 16;

/// Half of a stream: headers expected, payload expected, or done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalfState {
    Headers,
    Data,
    Closed,
}

/// State for a single stream.
#[derive(Debug)]
pub struct Stream {
    pub id: u32,
    pub r_state: HalfState,
    pub w_state: HalfState,
    /// Send-window delta; effective window adds the peer's
    /// `initial_window_size`.
    pub window_send: i64,
    /// Receive-window delta; effective window adds the local
    /// `initial_window_size`.
    pub window_recv: i64,
    /// Declared `content-length` countdown. `None` when the payload is
    /// unbounded (no declaration, or chunked in HTTP/1).
    pub remaining_payload: Option<u64>,
    /// HTTP/1 write half wraps payload in chunked framing.
    pub writing_chunked: bool,
    /// The next inbound head answers a HEAD request, so the payload is
    /// empty no matter what the headers declare.
    pub head_response: bool,
}

impl Stream {
    pub(crate) fn new(id: u32, r_state: HalfState, w_state: HalfState) -> Self {
        Self {
            id,
            r_state,
            w_state,
            window_send: 0,
            window_recv: 0,
            remaining_payload: None,
            writing_chunked: false,
            head_response: false,
        }
    }
}

/// Active streams keyed by id.
///
/// The parity, monotonicity, and concurrency checks live on the
/// connection, which owns the counters they consult.
#[derive(Debug, Default)]
pub(crate) struct StreamTable {
    streams: HashMap<u32, Stream>,
}

impl StreamTable {
    pub fn insert(&mut self, stream: Stream) {
        self.streams.insert(stream.id, stream);
    }

    pub fn find(&self, id: u32) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn find_mut(&mut self, id: u32) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    pub fn remove(&mut self, id: u32) -> Option<Stream> {
        self.streams.remove(&id)
    }

    pub fn ids(&self) -> Vec<u32> {
        self.streams.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }
}

/// One recently locally-closed stream.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResetEntry {
    pub id: u32,
    /// The remote read half had not moved past HEADERS yet, so a late
    /// HEADERS block for this id still needs an HPACK decode-and-discard.
    pub in_headers: bool,
}

/// Fixed-size FIFO of recently locally-closed streams, so in-flight
/// frames from the peer are tolerated instead of faulted.
#[derive(Debug)]
pub(crate) struct ResetHistory {
    ring: [Option<ResetEntry>; RESET_HISTORY],
    next: usize,
}

impl Default for ResetHistory {
    fn default() -> Self {
        Self {
            ring: [None; RESET_HISTORY],
            next: 0,
        }
    }
}

impl ResetHistory {
    pub fn push(&mut self, id: u32, in_headers: bool) {
        self.ring[self.next] = Some(ResetEntry { id, in_headers });
        self.next = (self.next + 1) % RESET_HISTORY;
    }

    pub fn lookup(&self, id: u32) -> Option<ResetEntry> {
        self.ring
            .iter()
            .flatten()
            .find(|entry| entry.id == id)
            .copied()
    }
}
