//! HPACK: Header Compression for HTTP/2 (RFC 7541)
//!
//! Thin wrapper around `fluke-hpack` providing the decoder/encoder pair a
//! connection owns. The dynamic tables hold per-connection state, so a
//! decode failure desynchronizes them and must end the connection.

use crate::error::{Error, Result};
use crate::message::Header;

/// HPACK decoder for inbound header blocks.
pub struct HpackDecoder {
    inner: fluke_hpack::Decoder<'static>,
}

impl std::fmt::Debug for HpackDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackDecoder").finish()
    }
}

impl Default for HpackDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackDecoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Decoder::new(),
        }
    }

    /// Cap the dynamic table. Driven by the SETTINGS exchange.
    pub fn set_limit(&mut self, limit: u32) {
        self.inner.set_max_table_size(limit as usize);
    }

    /// Decode an HPACK-encoded header block.
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<Header>> {
        let pairs = self
            .inner
            .decode(data)
            .map_err(|_| Error::Compression("malformed header block"))?;
        Ok(pairs
            .into_iter()
            .map(|(name, value)| {
                Header::new(
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                )
            })
            .collect())
    }
}

/// HPACK encoder for outbound header blocks.
///
/// The underlying encoder emits literal representations and never grows its
/// dynamic table, so the SETTINGS-driven cap is recorded but produces no
/// table-resize signal on the wire.
pub struct HpackEncoder {
    inner: fluke_hpack::Encoder<'static>,
    limit: u32,
}

impl std::fmt::Debug for HpackEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpackEncoder")
            .field("limit", &self.limit)
            .finish()
    }
}

impl Default for HpackEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl HpackEncoder {
    pub fn new() -> Self {
        Self {
            inner: fluke_hpack::Encoder::new(),
            limit: 4096,
        }
    }

    /// Record the table cap negotiated via SETTINGS.
    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit;
    }

    /// Encode header pairs into an HPACK header block.
    pub fn encode<'a, I>(&mut self, headers: I) -> Vec<u8>
    where
        I: IntoIterator<Item = (&'a [u8], &'a [u8])>,
    {
        self.inner.encode(headers)
    }
}
