//! HTTP/1.1 request model and the socket-level parser.
//!
//! The parser walks the byte stream through a small CRLF state machine:
//! a single `\r\n` terminates a header line, a double `\r\n` terminates the
//! header block. Multipart bodies are delimited by the boundary announced
//! in `Content-Type`, of which exactly one part is honoured.

use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Unknown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
    Unknown,
}

/// Why a request could not be read off the socket.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    /// The peer closed or the transport failed; close silently.
    ConnectionClosed,
    /// Nothing (useful) arrived within the read timeout; close silently.
    Timeout,
    /// The request line is not `METHOD URI VERSION`; answer 400.
    Malformed,
}

/// One parsed HTTP request.
///
/// The same value survives a `100 Continue` handshake: the first parser
/// pass fills the header fields, the second pass adds the multipart body.
#[derive(Debug, Default)]
pub struct HttpRequest {
    pub method: Option<Method>,
    pub version: Option<HttpVersion>,
    pub uri: String,
    pub uri_tokens: Vec<String>,
    pub header_lines: Vec<String>,
    pub content_length: usize,
    pub content_type: String,
    pub boundary: String,
    pub upload_filename: String,
    pub expect_100_continue: bool,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn method(&self) -> Method {
        self.method.unwrap_or(Method::Unknown)
    }

    /// True for the URI shapes the server answers on GET.
    pub fn is_valid_get_request(&self) -> bool {
        if self.method() != Method::Get {
            return false;
        }
        if matches!(self.uri.as_str(), "/files" | "/mrufiles" | "/mrufiles/zip") {
            return true;
        }
        match self.uri_tokens.as_slice() {
            [root, first, _id] => root.is_empty() && first == "files",
            [root, first, _id, last] => root.is_empty() && first == "files" && last == "zip",
            _ => false,
        }
    }

    /// True once a POST carries everything needed to store a file.
    pub fn is_valid_post_request(&self) -> bool {
        self.method() == Method::Post
            && self.uri == "/store"
            && !self.expect_100_continue
            && !self.upload_filename.is_empty()
    }

    /// Raw header block for verbose logging.
    pub fn header_text(&self) -> String {
        self.header_lines.concat()
    }

    fn parse_request_line(&mut self, line: &str) -> Result<(), ParseError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 3 {
            return Err(ParseError::Malformed);
        }
        let (method, uri, version) = (tokens[0], tokens[1], tokens[2]);
        self.method = Some(match method {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            _ => Method::Unknown,
        });
        self.parse_uri(uri);
        // anything beyond `HTTP/x.x` is ignored; a token that cannot be
        // cut at 8 bytes is no known version either
        let version = if version.len() > 8 {
            version.get(..8).unwrap_or("")
        } else {
            version
        };
        self.version = Some(match version {
            "HTTP/1.0" => HttpVersion::Http10,
            "HTTP/1.1" => HttpVersion::Http11,
            _ => HttpVersion::Unknown,
        });
        Ok(())
    }

    fn parse_uri(&mut self, token: &str) {
        let trimmed = token.trim();
        self.uri = trimmed.to_string();
        self.uri_tokens = trimmed.split('/').map(str::to_string).collect();
    }

    /// Extracts the fields the server cares about from one header line.
    ///
    /// Only headers starting with `C` or `E` are inspected: Content-Length,
    /// Content-Type (with its multipart boundary), Content-Disposition
    /// (with the upload filename) and Expect.
    fn parse_header(&mut self, line: &str) {
        let Some(first) = line.chars().next() else {
            return;
        };
        let prefix = first.to_ascii_uppercase();
        if prefix != 'C' && prefix != 'E' {
            return;
        }

        let mut tokens = line.split_whitespace();
        let Some(name) = tokens.next() else { return };
        let Some(value) = tokens.next() else { return };

        match name.to_ascii_uppercase().as_str() {
            "CONTENT-LENGTH:" => self.content_length = value.parse().unwrap_or(0),
            "CONTENT-TYPE:" => {
                self.content_type = value.to_string();
                for field in line.split(';') {
                    let field = field.trim();
                    if let Some(boundary) = field.strip_prefix("boundary=") {
                        if !boundary.is_empty() {
                            self.boundary = boundary.to_string();
                            break;
                        }
                    }
                }
            }
            "CONTENT-DISPOSITION:" => {
                for field in line.split(';') {
                    let field = field.trim();
                    if let Some(quoted) = field.strip_prefix("filename=\"") {
                        self.upload_filename = unescape_quoted(quoted);
                        break;
                    }
                }
            }
            "EXPECT:" => {
                if value.trim().eq_ignore_ascii_case("100-continue") {
                    self.expect_100_continue = true;
                }
            }
            _ => {}
        }
    }
}

/// Undoes the backslash escaping some clients apply inside the quoted
/// `filename` value (`\"`, `\'`, `\?`, `\\`) and stops at the closing
/// quote.
fn unescape_quoted(quoted: &str) -> String {
    let mut out = String::new();
    let mut escaped = false;
    for ch in quoted.chars() {
        let escapable = matches!(ch, '"' | '\'' | '?' | '\\');
        if escaped && escapable && !out.is_empty() {
            out.pop();
            out.push(ch);
        } else if ch == '"' {
            break;
        } else {
            out.push(ch);
        }
        escaped = ch == '\\';
    }
    out
}

/// Header-recognition state machine: `Lf1` marks end of a header line,
/// `Lf2` end of the header block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CrlfState {
    Idle,
    Cr1,
    Lf1,
    Cr2,
    Lf2,
}

impl CrlfState {
    fn feed(self, byte: u8) -> CrlfState {
        match self {
            CrlfState::Idle => match byte {
                b'\r' => CrlfState::Cr1,
                _ => CrlfState::Idle,
            },
            CrlfState::Cr1 => match byte {
                b'\n' => CrlfState::Lf1,
                _ => CrlfState::Idle,
            },
            CrlfState::Lf1 => match byte {
                b'\r' => CrlfState::Cr2,
                _ => CrlfState::Idle,
            },
            CrlfState::Cr2 => match byte {
                b'\n' => CrlfState::Lf2,
                _ => CrlfState::Idle,
            },
            CrlfState::Lf2 => CrlfState::Idle,
        }
    }
}

async fn read_byte<R>(reader: &mut R, read_timeout: Duration) -> Result<u8, ParseError>
where
    R: AsyncRead + Unpin,
{
    match time::timeout(read_timeout, reader.read_u8()).await {
        Ok(Ok(byte)) => Ok(byte),
        Ok(Err(_)) => Err(ParseError::ConnectionClosed),
        Err(_) => Err(ParseError::Timeout),
    }
}

/// Reads one request from `reader` into `request`.
///
/// With `Expect: 100-continue` set the call returns right after the header
/// block; the caller answers the interim response and invokes the parser
/// again on the same request to collect the body.
pub async fn read_request<R>(
    reader: &mut R,
    request: &mut HttpRequest,
    read_timeout: Duration,
) -> Result<(), ParseError>
where
    R: AsyncRead + Unpin,
{
    let mut line: Vec<u8> = Vec::new();
    let mut body: Vec<u8> = Vec::new();
    let mut crlf = CrlfState::Idle;
    let mut inside_body = false;
    let mut boundary_open = false;

    'receive: loop {
        let byte = match read_byte(reader, read_timeout).await {
            Ok(byte) => byte,
            Err(ParseError::Timeout) if !request.header_lines.is_empty() => {
                // a stalled peer does not invalidate what already arrived
                break 'receive;
            }
            Err(err) => return Err(err),
        };
        line.push(byte);
        crlf = crlf.feed(byte);

        if crlf == CrlfState::Lf2 && !inside_body {
            if line == b"\r\n" {
                line.clear();
            }
            if request.expect_100_continue {
                // body follows only after the interim response
                break 'receive;
            }
            if request.boundary.is_empty() {
                read_plain_body(reader, request.content_length, &mut body, read_timeout).await?;
                break 'receive;
            }
            inside_body = boundary_open;
        }

        if (crlf == CrlfState::Lf1 || crlf == CrlfState::Lf2) && !line.is_empty() {
            if !request.boundary.is_empty() {
                let trimmed = line.trim_ascii();
                if !inside_body && !boundary_open {
                    if trimmed == format!("--{}", request.boundary).as_bytes() {
                        boundary_open = true;
                        line.clear();
                        continue;
                    }
                } else if inside_body && trimmed == format!("--{}--", request.boundary).as_bytes() {
                    break 'receive;
                }
            }

            if inside_body {
                body.extend_from_slice(&line);
            } else if let Ok(text) = std::str::from_utf8(&line) {
                request.parse_header(text);
                request.header_lines.push(text.to_string());
            }
            line.clear();
        }
    }

    if request.header_lines.is_empty() {
        return Err(ParseError::ConnectionClosed);
    }
    if request.method.is_none() {
        let first = request.header_lines[0].clone();
        request.parse_request_line(&first)?;
    }

    // the CRLF preceding the closing boundary belongs to the envelope,
    // not to the payload
    if boundary_open && body.len() > 2 {
        body.truncate(body.len() - 2);
    }
    if !body.is_empty() {
        request.body = body;
    }

    Ok(())
}

async fn read_plain_body<R>(
    reader: &mut R,
    content_length: usize,
    body: &mut Vec<u8>,
    read_timeout: Duration,
) -> Result<(), ParseError>
where
    R: AsyncRead + Unpin,
{
    while body.len() < content_length {
        match read_byte(reader, read_timeout).await {
            Ok(byte) => body.push(byte),
            // a short body is served as-is; the announced length is advisory
            Err(ParseError::Timeout) => break,
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
