//! http-sans-io: a socketless HTTP/1.1 + HTTP/2 protocol engine
//!
//! This crate provides a synchronous, transport-agnostic HTTP connection
//! state machine for environments that cannot (or prefer not to) use async
//! runtimes. The host owns the socket; the engine owns the protocol.
//!
//! # Features
//!
//! - **Sans-I/O Design**: no sockets, timers, or async runtime dependencies
//! - **Both protocol generations**: HTTP/1.0 and 1.1 parsing with chunked
//!   transfer coding, plus full RFC 7540 HTTP/2 framing, multiplexing,
//!   flow control, and HPACK header compression (via fluke-hpack)
//! - **h2c handling**: `Upgrade: h2c` and prior-knowledge prefaces move an
//!   HTTP/1 server connection to HTTP/2 in place
//! - **Flow Control**: automatic WINDOW_UPDATE replenishment, or manual
//!   replenishment when the host wants backpressure
//! - **CONTINUATION Assembly**: automatic header block reassembly, with a
//!   hard cap against flooding
//!
//! # Quick Start
//!
//! ```rust
//! use http_sans_io::{Connection, Events, Message, Result, Role, Version};
//!
//! struct Sink(Vec<u8>);
//!
//! impl Events for Sink {
//!     fn writev(&mut self, chunks: &[&[u8]]) -> Result<()> {
//!         for chunk in chunks {
//!             self.0.extend_from_slice(chunk);
//!         }
//!         Ok(())
//!     }
//!
//!     fn message_head(&mut self, id: u32, message: &Message) -> Result<()> {
//!         println!("stream {}: {} {}", id, message.method, message.path);
//!         Ok(())
//!     }
//! }
//!
//! let mut conn = Connection::new(Role::Server, Sink(Vec::new()));
//! conn.begin(Version::Http1)?;
//! conn.feed(b"GET / HTTP/1.1\r\nhost: example\r\n\r\n")?;
//! # Ok::<(), http_sans_io::Error>(())
//! ```
//!
//! # Architecture
//!
//! The engine is a single state machine over a buffered byte stream. Each
//! `feed` advances it as far as the input allows; parsed events and every
//! outbound byte are delivered synchronously through the [`Events`] trait
//! the connection was built with. Writes requested by the host
//! (`write_head`, `write_data`, ...) are produced into the same sink, with
//! HTTP/2 stream state and flow windows enforced.
//!
//! It does NOT provide:
//! - TCP/UDP transport (you provide the bytes)
//! - TLS or ALPN (the host selects the initial version)
//! - Routing or content interpretation
//! - HTTP/2 prioritization (PRIORITY frames are parsed and ignored)

pub mod connection;
pub mod error;
pub mod events;
pub mod frame;
mod h1;
pub mod hpack;
pub mod message;
pub mod settings;
pub mod stream;

pub use connection::{Config, Connection, Role, Version, MAX_CONTINUATIONS};
pub use error::{Error, Result};
pub use events::Events;
pub use frame::{
    error_code, flags, frame_type, Frame, FrameHeader, CONNECTION_PREFACE, FRAME_HEADER_SIZE,
};
pub use hpack::{HpackDecoder, HpackEncoder};
pub use message::{Header, Message, MAX_HEADERS};
pub use settings::{settings_id, Settings};
pub use stream::{HalfState, Stream};
