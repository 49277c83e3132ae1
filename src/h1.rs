//! HTTP/1 head parsing and body-framing rules (RFC 7230).
//!
//! The head tokenizer itself is `httparse`; this module turns its output
//! into normalized header lists (lowercased names, `host` mapped to
//! `:authority`) and decides how the payload is delimited.

use crate::error::{Error, Result};
use crate::message::{self, Header, MAX_HEADERS};

/// How the current HTTP/1 payload is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyLen {
    /// Exactly this many bytes remain.
    Exact(u64),
    /// Chunked transfer coding.
    Chunked,
    /// Read until the peer closes, as after a 101 or a length-less
    /// response.
    UntilEof,
}

#[derive(Debug)]
pub(crate) struct RequestHead {
    pub consumed: usize,
    pub method: String,
    pub path: String,
    pub headers: Vec<Header>,
}

#[derive(Debug)]
pub(crate) struct ResponseHead {
    pub consumed: usize,
    pub code: u32,
    pub headers: Vec<Header>,
}

fn copy_headers(parsed: &[httparse::Header<'_>]) -> Result<Vec<Header>> {
    let mut headers = Vec::with_capacity(parsed.len());
    for header in parsed {
        let name = message::canonical_name(header.name.as_bytes())
            .ok_or(Error::Protocol("invalid header name"))?;
        let value = String::from_utf8_lossy(header.value).into_owned();
        headers.push(Header::new(name, value));
    }
    Ok(headers)
}

/// Parse a request head. `Ok(None)` means the head is still incomplete.
pub(crate) fn parse_request(buffer: &[u8]) -> Result<Option<RequestHead>> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut slots);
    match request.parse(buffer) {
        Ok(httparse::Status::Complete(consumed)) => Ok(Some(RequestHead {
            consumed,
            method: request.method.unwrap_or_default().to_owned(),
            path: request.path.unwrap_or_default().to_owned(),
            headers: copy_headers(request.headers)?,
        })),
        Ok(httparse::Status::Partial) => Ok(None),
        Err(_) => Err(Error::Protocol("malformed request head")),
    }
}

/// Parse a status line plus headers. `Ok(None)` means incomplete.
pub(crate) fn parse_response(buffer: &[u8]) -> Result<Option<ResponseHead>> {
    let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut slots);
    match response.parse(buffer) {
        Ok(httparse::Status::Complete(consumed)) => Ok(Some(ResponseHead {
            consumed,
            code: response.code.unwrap_or_default() as u32,
            headers: copy_headers(response.headers)?,
        })),
        Ok(httparse::Status::Partial) => Ok(None),
        Err(_) => Err(Error::Protocol("malformed response head")),
    }
}

/// A header list after HTTP/1 ingestion.
#[derive(Debug)]
pub(crate) struct Ingested {
    pub headers: Vec<Header>,
    pub content_length: Option<u64>,
    pub chunked: bool,
    pub upgrade: Option<String>,
}

/// Apply the HTTP/1 header rules: `host` becomes `:authority`, a synthetic
/// `:scheme: unknown` is injected on requests, transfer and length
/// declarations are policed, and `http2-settings` is consumed.
pub(crate) fn ingest(raw: Vec<Header>, request: bool) -> Result<Ingested> {
    let mut pseudo = Vec::new();
    let mut headers = Vec::new();
    let mut content_length = None;
    let mut chunked = false;
    let mut upgrade = None;

    if request {
        // The host fills in the real scheme above the core.
        pseudo.push(Header::new(":scheme", "unknown"));
    }

    for header in raw {
        match header.name.as_str() {
            "host" if request => pseudo.push(Header::new(":authority", header.value)),
            "transfer-encoding" => {
                let value = header.value.trim();
                if value.eq_ignore_ascii_case("identity") {
                    continue;
                }
                chunked = true;
                // A trailing "chunked" token is framing, not content
                // coding; the rest may pass through.
                let forwarded = match value.rsplit_once(',') {
                    _ if value.eq_ignore_ascii_case("chunked") => None,
                    Some((rest, last)) if last.trim().eq_ignore_ascii_case("chunked") => {
                        Some(rest.trim_end().trim_end_matches(',').to_owned())
                    }
                    _ => Some(value.to_owned()),
                };
                if let Some(forwarded) = forwarded {
                    headers.push(Header::new("transfer-encoding", forwarded));
                }
            }
            "content-length" => {
                let parsed = parse_decimal(&header.value)
                    .ok_or(Error::Protocol("content-length is not a number"))?;
                match content_length {
                    Some(previous) if previous != parsed => {
                        return Err(Error::Protocol("conflicting content-length values"))
                    }
                    _ => content_length = Some(parsed),
                }
                headers.push(header);
            }
            "upgrade" => {
                upgrade = Some(header.value.clone());
                headers.push(header);
            }
            // TODO: decode the base64 SETTINGS payload for h2c upgrades.
            "http2-settings" => {}
            _ => headers.push(header),
        }
    }

    pseudo.extend(headers);
    Ok(Ingested {
        headers: pseudo,
        content_length: if chunked { None } else { content_length },
        chunked,
        upgrade,
    })
}

fn parse_decimal(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

// Chunk-size lines are short; anything past this without a CRLF is junk.
const MAX_CHUNK_LINE: usize = 256;

/// Parse a `hex [; ext] CRLF` chunk-size line. `Ok(None)` means the line
/// terminator has not arrived yet.
pub(crate) fn parse_chunk_size(buffer: &[u8]) -> Result<Option<(usize, u64)>> {
    let Some(eol) = buffer.windows(2).position(|w| w == b"\r\n") else {
        if buffer.len() > MAX_CHUNK_LINE {
            return Err(Error::Protocol("chunk size line too long"));
        }
        return Ok(None);
    };
    let line = &buffer[..eol];
    let digits = line
        .iter()
        .position(|&b| !b.is_ascii_hexdigit())
        .unwrap_or(line.len());
    if digits == 0 || digits > 16 {
        return Err(Error::Protocol("invalid chunk size"));
    }
    // Chunk extensions are skipped to the end of the line.
    match line[digits..].first().copied() {
        None | Some(b';') => {}
        Some(_) => return Err(Error::Protocol("invalid chunk size line")),
    }
    let mut size: u64 = 0;
    for &b in &line[..digits] {
        let digit = (b as char).to_digit(16).unwrap() as u64;
        size = size << 4 | digit;
    }
    Ok(Some((eol + 2, size)))
}

/// Canonical reason phrase for a status line.
pub(crate) fn reason_phrase(code: u32) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        204 => "No Content",
        206 => "Partial Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        408 => "Request Timeout",
        411 => "Length Required",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        _ => "Unknown",
    }
}
