//! HTTP response formatting.
//!
//! Three shapes leave this module: error pages with a small HTML body,
//! the bare `100 Continue` interim line, and positive responses carrying
//! either a JSON string or the headers of a file whose bytes the session
//! streams afterwards.

use httpdate::fmt_http_date;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use crate::request::{HttpRequest, Method};

pub const SERVER_NAME: &str = "httpsrv";
const HTTP_VERSION: &str = "HTTP/1.1";

#[derive(Debug)]
pub struct HttpResponse {
    text: String,
    is_error: bool,
}

impl HttpResponse {
    /// Error response for `code`, with the matching reason phrase and an
    /// HTML body.
    pub fn error(code: u16) -> Self {
        let reason = reason_phrase(code);
        let body = format!(
            "<html><head><title>{code} {reason}</title></head>\
             <body>Sorry, I can't do that</body></html>\r\n"
        );
        let mut text = format!("{HTTP_VERSION} {code} {reason}\r\n");
        text += &format!("Date: {}\r\n", fmt_http_date(SystemTime::now()));
        text += &format!("Server: {SERVER_NAME}\r\n");
        text += &format!("Content-Length: {}\r\n", body.len());
        text += "Content-Type: text/html\r\n\r\n";
        text += &body;
        Self {
            text,
            is_error: true,
        }
    }

    /// The interim response of the `Expect: 100-continue` handshake.
    pub fn continue_100() -> Self {
        Self {
            text: format!("{HTTP_VERSION} 100 Continue\r\n\r\n"),
            is_error: false,
        }
    }

    /// Builds the response matching a processed request.
    ///
    /// A request still waiting for its deferred body gets `100 Continue`;
    /// a POST anywhere but `/store` is rejected and a POST that produced
    /// no stat record reports an internal failure. Everything else is a
    /// `200 OK` around `body` and/or the file at `file_to_send`.
    pub async fn build(
        request: &HttpRequest,
        body: &str,
        body_ext: &str,
        file_to_send: Option<&Path>,
    ) -> io::Result<Self> {
        if request.method() == Method::Unknown {
            return Ok(Self::error(403));
        }
        if request.method() == Method::Post {
            if request.expect_100_continue {
                return Ok(Self::continue_100());
            }
            if request.uri != "/store" {
                return Ok(Self::error(400));
            }
            if body.is_empty() {
                return Ok(Self::error(500));
            }
        }
        Self::positive(body, body_ext, file_to_send).await
    }

    /// `200 OK` carrying `body` and/or announcing the file at
    /// `file_to_send`, whose bytes follow the header block on the wire.
    pub async fn positive(
        body: &str,
        body_ext: &str,
        file_to_send: Option<&Path>,
    ) -> io::Result<Self> {
        let (content_length, last_modified, extension) = match file_to_send {
            Some(path) => {
                let meta = tokio::fs::metadata(path).await?;
                let modified = meta.modified().unwrap_or_else(|_| SystemTime::now());
                let extension = path
                    .extension()
                    .map(|ext| format!(".{}", ext.to_string_lossy()))
                    .unwrap_or_default();
                (meta.len() as usize, modified, extension)
            }
            None => (body.len(), SystemTime::now(), body_ext.to_string()),
        };

        let mut text = format!("{HTTP_VERSION} 200 OK\r\n");
        text += &format!("Date: {}\r\n", fmt_http_date(SystemTime::now()));
        text += &format!("Server: {SERVER_NAME}\r\n");
        text += &format!("Content-Length: {content_length}\r\n");
        text += &format!("Last-Modified: {}\r\n", fmt_http_date(last_modified));
        text += &format!("Content-Type: {}\r\n\r\n", mime_for_extension(&extension));
        if file_to_send.is_none() {
            text += body;
        }
        Ok(Self {
            text,
            is_error: false,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Header block (and any inline body) for verbose logging.
    pub fn header_text(&self) -> &str {
        &self.text
    }
}

fn reason_phrase(code: u16) -> &'static str {
    match code {
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Internal Server Error",
    }
}

fn mime_for_extension(extension: &str) -> &'static str {
    mime_guess::from_ext(extension.trim_start_matches('.'))
        .first_raw()
        .unwrap_or("application/octet-stream")
}
