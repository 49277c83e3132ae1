//! Error taxonomy for the protocol engine.
//!
//! Connection-fatal peer violations surface as [`Error::Protocol`] after a
//! GOAWAY has been written; stream-scoped violations never surface at all
//! (the engine answers them with RST_STREAM and keeps going).

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Caller misuse: the request is invalid regardless of peer state
    /// (e.g. pings on an HTTP/1 connection, a response carrying a path).
    #[error("assertion failed: {0}")]
    Assertion(&'static str),

    /// A local call named a stream that does not exist or belongs to the
    /// wrong side.
    #[error("unknown or wrong-sided stream {0}")]
    InvalidStream(u32),

    /// Opening one more local stream would exceed the peer's
    /// max_concurrent_streams limit. Retry after a stream closes.
    #[error("local stream limit reached")]
    WouldBlock,

    /// The peer broke the protocol. On HTTP/2 a GOAWAY has already been
    /// written by the time this is returned.
    #[error("protocol error: {0}")]
    Protocol(&'static str),

    /// HPACK decoding failed. The dynamic table is desynchronized, so this
    /// is always connection-fatal (GOAWAY with COMPRESSION_ERROR).
    #[error("compression error: {0}")]
    Compression(&'static str),

    /// A supported-in-principle operation the engine does not implement,
    /// such as splitting an oversized PADDED frame.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// Terminal state: the peer ended the connection or the sink refused a
    /// write. Stop feeding and writing, discard the connection.
    #[error("connection terminated")]
    Disconnect,
}

impl Error {
    /// True for errors after which the connection must be discarded.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_) | Error::Compression(_) | Error::Disconnect
        )
    }
}
