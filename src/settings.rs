//! SETTINGS snapshots (RFC 7540 Section 6.5).
//!
//! A connection keeps two of these: the values it advertised and the values
//! the peer advertised. Both start from the protocol defaults; the local
//! snapshot is replaced by the host configuration when the connection
//! starts, and the wire only carries the fields that differ.

use bytes::{BufMut, BytesMut};

use crate::frame::error_code;

/// HTTP/2 SETTINGS identifiers (RFC 7540 Section 6.5.2)
pub mod settings_id {
    pub const HEADER_TABLE_SIZE: u16 = 0x1;
    pub const ENABLE_PUSH: u16 = 0x2;
    pub const MAX_CONCURRENT_STREAMS: u16 = 0x3;
    pub const INITIAL_WINDOW_SIZE: u16 = 0x4;
    pub const MAX_FRAME_SIZE: u16 = 0x5;
    pub const MAX_HEADER_LIST_SIZE: u16 = 0x6;
}

/// One peer's SETTINGS. `u32::MAX` stands for "unlimited" where the
/// protocol default is no limit at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub header_table_size: u32,
    pub enable_push: u32,
    pub max_concurrent_streams: u32,
    pub initial_window_size: u32,
    pub max_frame_size: u32,
    pub max_header_list_size: u32,
}

impl Settings {
    /// The protocol defaults every connection starts from.
    pub fn standard() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: 1,
            max_concurrent_streams: u32::MAX,
            initial_window_size: 65535,
            max_frame_size: 16384,
            max_header_list_size: u32::MAX,
        }
    }

    /// The values this engine advertises unless the host overrides them.
    /// Identical to [`Settings::standard`] except for a concurrency cap.
    pub fn initial_local() -> Self {
        Self {
            max_concurrent_streams: 1024,
            ..Self::standard()
        }
    }

    /// Encode the fields where `self` differs from `base` as 6-byte
    /// (identifier, value) records.
    pub fn encode_delta(&self, base: &Settings, out: &mut BytesMut) {
        let pairs = [
            (settings_id::HEADER_TABLE_SIZE, self.header_table_size, base.header_table_size),
            (settings_id::ENABLE_PUSH, self.enable_push, base.enable_push),
            (settings_id::MAX_CONCURRENT_STREAMS, self.max_concurrent_streams, base.max_concurrent_streams),
            (settings_id::INITIAL_WINDOW_SIZE, self.initial_window_size, base.initial_window_size),
            (settings_id::MAX_FRAME_SIZE, self.max_frame_size, base.max_frame_size),
            (settings_id::MAX_HEADER_LIST_SIZE, self.max_header_list_size, base.max_header_list_size),
        ];
        for (id, value, default) in pairs {
            if value != default {
                out.put_u16(id);
                out.put_u32(value);
            }
        }
    }

    /// Apply one decoded (identifier, value) record. Unknown identifiers
    /// are ignored per RFC 7540 Section 6.5.2. Returns the GOAWAY error
    /// code and a reason when the value is out of bounds.
    pub fn apply(&mut self, id: u16, value: u32) -> Result<(), (u32, &'static str)> {
        match id {
            settings_id::HEADER_TABLE_SIZE => self.header_table_size = value,
            settings_id::ENABLE_PUSH => {
                if value > 1 {
                    return Err((error_code::PROTOCOL_ERROR, "ENABLE_PUSH must be 0 or 1"));
                }
                self.enable_push = value;
            }
            settings_id::MAX_CONCURRENT_STREAMS => self.max_concurrent_streams = value,
            settings_id::INITIAL_WINDOW_SIZE => {
                if value > 0x7FFF_FFFF {
                    return Err((
                        error_code::FLOW_CONTROL_ERROR,
                        "INITIAL_WINDOW_SIZE exceeds 2^31-1",
                    ));
                }
                self.initial_window_size = value;
            }
            settings_id::MAX_FRAME_SIZE => {
                if !(16384..=16777215).contains(&value) {
                    return Err((error_code::PROTOCOL_ERROR, "MAX_FRAME_SIZE out of range"));
                }
                self.max_frame_size = value;
            }
            settings_id::MAX_HEADER_LIST_SIZE => self.max_header_list_size = value,
            _ => {}
        }
        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::initial_local()
    }
}
