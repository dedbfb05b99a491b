//! Minimal HTTP/1.x head codec for the exchange driver.
//!
//! The response side is deliberately permissive: no minimum HTTP version is
//! imposed (an `HTTP/0.9` status line is accepted), any three-digit status
//! code parses, obs-fold header continuations are unfolded, and repeated
//! header names are appended rather than overwritten. Framing beyond
//! `Content-Length` and read-to-close is out of scope here.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use http::{HeaderMap, Method, Response, StatusCode, Version};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::trace;

/// Upper bound on the size of a response head.
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Errors from reading or parsing a response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// The peer closed the stream before a complete head arrived.
    #[error("connection closed before a complete response head")]
    UnexpectedEof,

    /// The status line could not be parsed.
    #[error("malformed status line: {0:?}")]
    StatusLine(String),

    /// The status line names an HTTP version this codec does not know.
    #[error("unsupported http version: {0:?}")]
    UnsupportedVersion(String),

    /// The status code is not a three-digit number.
    #[error("invalid status code: {0:?}")]
    StatusCode(String),

    /// A header line could not be parsed.
    #[error("malformed header line: {0:?}")]
    HeaderLine(String),

    /// The `Content-Length` header is not a valid length.
    #[error("invalid content-length: {0:?}")]
    ContentLength(String),

    /// The response head exceeded the size bound.
    #[error("response head too large")]
    TooLarge,

    /// I/O failure while reading the response.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub(crate) struct ResponseHead {
    pub(crate) version: Version,
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
}

/// Serialize a request head. The header map is written as-is, duplicates and
/// all; policy headers are the caller's business.
pub(crate) fn encode_request_head(method: &Method, path: &str, headers: &HeaderMap) -> BytesMut {
    let mut buf = BytesMut::with_capacity(256);
    buf.put_slice(method.as_str().as_bytes());
    buf.put_u8(b' ');
    buf.put_slice(path.as_bytes());
    buf.put_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers.iter() {
        buf.put_slice(name.as_str().as_bytes());
        buf.put_slice(b": ");
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }
    buf.put_slice(b"\r\n");
    buf
}

/// Read and parse one response off the stream: head, then body framed by
/// `Content-Length` when present, read-to-close otherwise.
pub(crate) async fn read_response<IO>(io: &mut IO) -> Result<Response<Bytes>, ParseError>
where
    IO: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    // back up far enough to catch a terminator split across reads
    let mut scanned: usize = 0;
    let head_end = loop {
        if let Some(idx) = find_head_end(&buf, scanned.saturating_sub(3)) {
            break idx;
        }
        scanned = buf.len();
        if buf.len() > MAX_HEAD_SIZE {
            return Err(ParseError::TooLarge);
        }
        if io.read_buf(&mut buf).await? == 0 {
            return Err(ParseError::UnexpectedEof);
        }
    };

    let head_bytes = buf.split_to(head_end);
    buf.advance(4);
    let head = parse_head(&head_bytes)?;
    trace!(status = %head.status, version = ?head.version, "response head parsed");

    let mut body = buf;
    match content_length(&head.headers)? {
        Some(length) => {
            while body.len() < length {
                if io.read_buf(&mut body).await? == 0 {
                    return Err(ParseError::UnexpectedEof);
                }
            }
            body.truncate(length);
        }
        None => loop {
            if io.read_buf(&mut body).await? == 0 {
                break;
            }
        },
    }

    let mut response = Response::new(body.freeze());
    *response.version_mut() = head.version;
    *response.status_mut() = head.status;
    *response.headers_mut() = head.headers;
    Ok(response)
}

fn find_head_end(buf: &[u8], from: usize) -> Option<usize> {
    buf.get(from..)?
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|idx| idx + from)
}

fn lossy(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

fn trim(value: &[u8]) -> &[u8] {
    let start = value
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .unwrap_or(value.len());
    let end = value
        .iter()
        .rposition(|&b| b != b' ' && b != b'\t')
        .map_or(start, |idx| idx + 1);
    &value[start..end]
}

/// Parse a response head (without the terminating blank line).
pub(crate) fn parse_head(head: &[u8]) -> Result<ResponseHead, ParseError> {
    let mut lines = head
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line));

    let status_line = lines.next().unwrap_or_default();
    let status_line = std::str::from_utf8(status_line)
        .map_err(|_| ParseError::StatusLine(lossy(status_line)))?;

    let mut parts = status_line.splitn(3, ' ');
    let version = match parts.next().unwrap_or_default() {
        "HTTP/0.9" => Version::HTTP_09,
        "HTTP/1.0" => Version::HTTP_10,
        "HTTP/1.1" => Version::HTTP_11,
        other => return Err(ParseError::UnsupportedVersion(other.to_owned())),
    };
    let code = parts
        .next()
        .ok_or_else(|| ParseError::StatusLine(status_line.to_owned()))?;
    let status = code
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| ParseError::StatusCode(code.to_owned()))?;
    // the remainder, if any, is the reason phrase; ignored

    let mut fields: Vec<(HeaderName, Vec<u8>)> = Vec::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        if line[0] == b' ' || line[0] == b'\t' {
            // obs-fold continuation of the previous field
            let (_, value) = fields
                .last_mut()
                .ok_or_else(|| ParseError::HeaderLine(lossy(line)))?;
            value.push(b' ');
            value.extend_from_slice(trim(line));
            continue;
        }
        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| ParseError::HeaderLine(lossy(line)))?;
        let name = HeaderName::from_bytes(&line[..colon])
            .map_err(|_| ParseError::HeaderLine(lossy(line)))?;
        fields.push((name, trim(&line[colon + 1..]).to_vec()));
    }

    let mut headers = HeaderMap::with_capacity(fields.len());
    for (name, value) in fields {
        let value =
            HeaderValue::from_bytes(&value).map_err(|_| ParseError::HeaderLine(lossy(&value)))?;
        headers.append(name, value);
    }

    Ok(ResponseHead {
        version,
        status,
        headers,
    })
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>, ParseError> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<usize>().ok())
            .map(Some)
            .ok_or_else(|| ParseError::ContentLength(lossy(value.as_bytes()))),
    }
}
