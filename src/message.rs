//! Message records and header-list normalization.
//!
//! After HPACK decode (or HTTP/1 head parsing) a header list is partitioned
//! into a pseudo-header prefix and regular headers. `:status`, `:method`
//! and `:path` are projected onto [`Message`] fields; `:scheme` and
//! `:authority` stay at the front of the header list.

/// Hard cap on regular headers per message; pseudo-headers ride on top.
pub const MAX_HEADERS: usize = 128;

/// A single header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub value: String,
}

impl Header {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A request or response head (or a trailer block, which uses only
/// `headers`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Response status code; 0 on requests.
    pub code: u32,
    /// Request method; empty on responses.
    pub method: String,
    /// Request target; empty on responses.
    pub path: String,
    pub headers: Vec<Header>,
}

impl Message {
    pub fn request(method: impl Into<String>, path: impl Into<String>, headers: Vec<Header>) -> Self {
        Self {
            code: 0,
            method: method.into(),
            path: path.into(),
            headers,
        }
    }

    pub fn response(code: u32, headers: Vec<Header>) -> Self {
        Self {
            code,
            method: String::new(),
            path: String::new(),
            headers,
        }
    }

    /// First value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name == name)
            .map(|h| h.value.as_str())
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.code)
    }
}

// Maps every allowed header-name byte to its canonical (lowercase) form
// and every disallowed byte, ':' included, to 0.
const fn transform_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0usize;
    while i < 256 {
        let c = i as u8;
        table[i] = match c {
            b'a'..=b'z' | b'0'..=b'9' => c,
            b'A'..=b'Z' => c + 32,
            b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' | b'^'
            | b'_' | b'`' | b'|' | b'~' => c,
            _ => 0,
        };
        i += 1;
    }
    table
}

static HEADER_TRANSFORM: [u8; 256] = transform_table();

/// HTTP/2 header names must already be lowercase tokens.
pub(crate) fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| HEADER_TRANSFORM[b as usize] == b)
}

/// Canonicalize an HTTP/1 header name, lowercasing as it goes. `None`
/// means the name contains a byte outside the token charset.
pub(crate) fn canonical_name(raw: &[u8]) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    let mut out = String::with_capacity(raw.len());
    for &b in raw {
        match HEADER_TRANSFORM[b as usize] {
            0 => return None,
            c => out.push(c as char),
        }
    }
    Some(out)
}

fn parse_uint(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// What kind of header block is being normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HeadKind {
    Request,
    Response,
    Trailers,
}

/// A normalized head plus the payload length it declares.
#[derive(Debug)]
pub(crate) struct ParsedHead {
    pub message: Message,
    pub content_length: Option<u64>,
}

/// Validate a decoded header list and project the pseudo-headers.
///
/// Errors are stream-scoped: the caller answers them with
/// RST_STREAM(PROTOCOL_ERROR), never a GOAWAY.
pub(crate) fn normalize(
    headers: Vec<Header>,
    kind: HeadKind,
) -> std::result::Result<ParsedHead, &'static str> {
    let mut message = Message::default();
    let mut content_length = None;
    let mut seen_status = false;
    let mut seen_scheme = false;
    let mut seen_authority = false;
    let mut in_pseudo_prefix = true;

    for header in headers {
        if header.name.starts_with(':') {
            if !in_pseudo_prefix {
                return Err("pseudo-header after a regular header");
            }
            if kind == HeadKind::Trailers {
                return Err("pseudo-header in trailers");
            }
            match (header.name.as_str(), kind) {
                (":method", HeadKind::Request) => {
                    if !message.method.is_empty() {
                        return Err("duplicate :method");
                    }
                    message.method = header.value;
                }
                (":path", HeadKind::Request) => {
                    if !message.path.is_empty() {
                        return Err("duplicate :path");
                    }
                    message.path = header.value;
                }
                (":scheme", HeadKind::Request) => {
                    if seen_scheme {
                        return Err("duplicate :scheme");
                    }
                    seen_scheme = true;
                    message.headers.push(header);
                }
                (":authority", HeadKind::Request) => {
                    if seen_authority {
                        return Err("duplicate :authority");
                    }
                    seen_authority = true;
                    message.headers.push(header);
                }
                (":status", HeadKind::Response) => {
                    if seen_status {
                        return Err("duplicate :status");
                    }
                    seen_status = true;
                    message.code = match parse_uint(&header.value) {
                        Some(code) if code <= 65535 => code as u32,
                        _ => return Err(":status is not a status code"),
                    };
                }
                _ => return Err("unknown pseudo-header"),
            }
            continue;
        }

        in_pseudo_prefix = false;
        if !valid_name(&header.name) {
            return Err("invalid header name");
        }
        match header.name.as_str() {
            "connection" => return Err("connection header is forbidden"),
            "te" if header.value != "trailers" => return Err("te must be \"trailers\""),
            "content-length" => {
                let parsed = parse_uint(&header.value).ok_or("content-length is not a number")?;
                match content_length {
                    Some(previous) if previous != parsed => {
                        return Err("conflicting content-length values")
                    }
                    _ => content_length = Some(parsed),
                }
                message.headers.push(header);
            }
            _ => message.headers.push(header),
        }
        if message.headers.len() > MAX_HEADERS {
            return Err("too many headers");
        }
    }

    match kind {
        HeadKind::Request => {
            // CONNECT carries only :method and :authority.
            if message.method != "CONNECT"
                && (message.method.is_empty() || message.path.is_empty() || !seen_scheme)
            {
                return Err("request lacks :method, :path, or :scheme");
            }
        }
        HeadKind::Response => {
            if !seen_status {
                return Err("response lacks :status");
            }
            if message.is_informational() && content_length.unwrap_or(0) > 0 {
                return Err("informational response declares a payload");
            }
        }
        HeadKind::Trailers => {}
    }

    Ok(ParsedHead {
        message,
        content_length,
    })
}
