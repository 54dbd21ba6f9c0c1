//! Minimal HTTP request parser.
//!
//! Reads exactly one request from a buffered byte stream: a request line,
//! a header block terminated by a blank line, and an optional body whose
//! length comes from `Content-Length`. Chunked bodies, pipelining and
//! header folding are not supported.

use bytes::Bytes;
use std::collections::HashMap;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Largest body accepted by default (10 MiB)
pub const DEFAULT_MAX_BODY_BYTES: u64 = 10 * 1024 * 1024;

/// Why a request could not be parsed.
///
/// Any of these abandons the connection: no partial request is surfaced.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The request line was missing, unterminated, or had fewer than three tokens.
    #[error("malformed request line: {line:?}")]
    MalformedRequestLine {
        line: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The stream failed or ended before the blank line closing the headers.
    #[error("failed to read headers: {0}")]
    HeaderReadFailure(#[source] io::Error),

    /// The stream failed or ended before the declared body was delivered.
    #[error("failed to read body ({received} of {expected} bytes): {source}")]
    BodyReadFailure {
        expected: u64,
        received: u64,
        #[source]
        source: io::Error,
    },
}

/// A fully parsed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    path: String,
    headers: HashMap<String, String>,
    body: Bytes,
}

impl Request {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Look up a header value, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers, keyed by lowercased name.
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Declared body length, if `Content-Length` is a non-negative integer.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(parse_content_length)
    }
}

/// Limits applied while parsing.
#[derive(Debug, Clone, Copy)]
pub struct ParseLimits {
    /// A declared `Content-Length` above this fails the body read.
    pub max_body_bytes: u64,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Parse one request from `reader`.
///
/// Never reads past the end of the declared body.
pub async fn parse_request<R>(reader: &mut R, limits: &ParseLimits) -> Result<Request, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let (method, path) = read_request_line(reader).await?;
    let headers = read_headers(reader).await?;

    let body = match headers
        .get("content-length")
        .and_then(|v| parse_content_length(v))
    {
        Some(len) if len > 0 => read_body(reader, len, limits).await?,
        _ => Bytes::new(),
    };

    Ok(Request {
        method,
        path,
        headers,
        body,
    })
}

async fn read_request_line<R>(reader: &mut R) -> Result<(String, String), ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let line = read_line(reader)
        .await
        .map_err(|(partial, e)| ParseError::MalformedRequestLine {
            line: partial,
            source: Some(e),
        })?;

    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some(_version)) => Ok((method.to_string(), path.to_string())),
        _ => Err(ParseError::MalformedRequestLine {
            line: line.trim_end().to_string(),
            source: None,
        }),
    }
}

async fn read_headers<R>(reader: &mut R) -> Result<HashMap<String, String>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = HashMap::new();

    loop {
        let line = read_line(reader)
            .await
            .map_err(|(_, e)| ParseError::HeaderReadFailure(e))?;

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(headers);
        }

        // Lines without a name before the colon are ignored.
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if !name.is_empty() {
                headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
            }
        }
    }
}

async fn read_body<R>(reader: &mut R, len: u64, limits: &ParseLimits) -> Result<Bytes, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    if len > limits.max_body_bytes {
        return Err(ParseError::BodyReadFailure {
            expected: len,
            received: 0,
            source: io::Error::new(
                io::ErrorKind::InvalidData,
                format!("body exceeds limit of {} bytes", limits.max_body_bytes),
            ),
        });
    }

    // Grow with the data actually received rather than trusting the declared size.
    let mut body = Vec::new();
    let result = reader.take(len).read_to_end(&mut body).await;
    let received = body.len() as u64;

    if let Err(e) = result {
        return Err(ParseError::BodyReadFailure {
            expected: len,
            received,
            source: e,
        });
    }
    if received < len {
        return Err(ParseError::BodyReadFailure {
            expected: len,
            received,
            source: io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed before body"),
        });
    }

    Ok(Bytes::from(body))
}

/// Read one `\n`-terminated line.
///
/// End of stream before the terminator is an error; the partial line is
/// returned alongside it for diagnostics.
async fn read_line<R>(reader: &mut R) -> Result<String, (String, io::Error)>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let result = reader.read_until(b'\n', &mut buf).await;
    let line = String::from_utf8_lossy(&buf).into_owned();

    match result {
        Ok(_) if buf.last() == Some(&b'\n') => Ok(line),
        Ok(_) => Err((
            line,
            io::Error::new(io::ErrorKind::UnexpectedEof, "stream ended before newline"),
        )),
        Err(e) => Err((line, e)),
    }
}

fn parse_content_length(value: &str) -> Option<u64> {
    value.trim().parse().ok()
}
