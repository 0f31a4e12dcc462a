//! Per-connection HTTP session.
//!
//! One session owns one accepted socket and drives the
//! parse → dispatch → respond cycle until the peer goes away, an error
//! response is produced, or a file transfer completes.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::{self, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time;
use tracing::{debug, warn};

use crate::repository::{FileZipError, Repository, ZipBundle};
use crate::request::{self, HttpRequest, ParseError};
use crate::response::HttpResponse;
use crate::stat;

/// What a dispatched GET wants the session to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum GetAction {
    SendJsonFileList,
    SendMruFiles,
    SendFileStat,
    SendZipFile,
    SendInternalError,
    SendNotFound,
    SendInvalidRequest,
}

pub struct Session<S> {
    stream: S,
    repository: Arc<Repository>,
    read_timeout: Duration,
    id: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Session<S> {
    pub fn new(stream: S, repository: Arc<Repository>, read_timeout: Duration, fd: i32) -> Self {
        let id = format!("[{fd}] [{}]", stat::format_timestamp(SystemTime::now()));
        Self {
            stream,
            repository,
            read_timeout,
            id,
        }
    }

    pub async fn run(self) {
        let Session {
            stream,
            repository,
            read_timeout,
            id,
        } = self;
        debug!(session = %id, "---- HTTP SERVER SESSION STARTS");

        let (read_half, mut write_half) = io::split(stream);
        let mut reader = BufReader::new(read_half);
        let mut request = HttpRequest::default();

        loop {
            match request::read_request(&mut reader, &mut request, read_timeout).await {
                Ok(()) => {}
                Err(ParseError::Malformed) => {
                    let response = HttpResponse::error(400);
                    let _ = send_all(&mut write_half, response.as_bytes()).await;
                    break;
                }
                // transport-level failures close without a response
                Err(_) => break,
            }
            debug!(
                session = %id,
                version = ?request.version,
                content_type = %request.content_type,
                ">>> REQUEST\n{}",
                request.header_text()
            );

            let mut json = String::new();
            let mut bundle: Option<ZipBundle> = None;
            let mut response: Option<HttpResponse> = None;
            let mut send_zip = false;

            if request.expect_100_continue || request.is_valid_post_request() {
                process_post(&repository, &id, &request, &mut json).await;
            } else if request.is_valid_get_request() {
                match process_get(&repository, &request, &mut json, &mut bundle).await {
                    GetAction::SendZipFile => send_zip = true,
                    GetAction::SendInternalError => response = Some(HttpResponse::error(500)),
                    GetAction::SendNotFound => response = Some(HttpResponse::error(404)),
                    GetAction::SendInvalidRequest => response = Some(HttpResponse::error(400)),
                    GetAction::SendJsonFileList
                    | GetAction::SendMruFiles
                    | GetAction::SendFileStat => {}
                }
            } else {
                response = Some(HttpResponse::error(400));
            }

            let response = match response {
                Some(response) => response,
                None => {
                    let body_ext = if json.is_empty() { "" } else { ".json" };
                    let file = bundle.as_ref().map(|bundle| bundle.zip_path());
                    match HttpResponse::build(&request, &json, body_ext, file).await {
                        Ok(response) => response,
                        Err(err) => {
                            warn!(session = %id, error = %err, "building response failed");
                            HttpResponse::error(500)
                        }
                    }
                }
            };

            if send_all(&mut write_half, response.as_bytes()).await.is_err() {
                break;
            }

            if send_zip {
                let zip_path = bundle
                    .as_ref()
                    .map(|bundle| bundle.zip_path().to_path_buf())
                    .unwrap_or_default();
                if let Err(err) = send_file(&mut write_half, &zip_path).await {
                    warn!(session = %id, error = %err, path = %zip_path.display(), "error sending archive");
                    break;
                }
            }
            debug!(session = %id, "<<< RESPONSE\n{}", response.header_text());

            if response.is_error() {
                break;
            }
            if request.expect_100_continue {
                // same request, second parser pass collects the body
                request.expect_100_continue = false;
            } else {
                request = HttpRequest::default();
            }
            // one archive per connection, then hang up
            if send_zip {
                break;
            }
        }

        let _ = write_half.shutdown().await;
        debug!(session = %id, "---- HTTP SERVER SESSION ENDS");
    }
}

async fn process_post(repository: &Repository, id: &str, request: &HttpRequest, json: &mut String) {
    let filename = &request.upload_filename;
    debug!(session = %id, filename, "writing upload");
    match repository.store(filename, &request.body).await {
        Ok(rendered) => *json = rendered,
        // also hit on the first pass of the 100-continue handshake, where
        // no filename has arrived yet; the response builder sorts it out
        Err(err) => {
            debug!(session = %id, filename, error = ?err, "upload not stored");
        }
    }
}

async fn process_get(
    repository: &Repository,
    request: &HttpRequest,
    json: &mut String,
    bundle: &mut Option<ZipBundle>,
) -> GetAction {
    match request.uri.as_str() {
        "/files" => match repository.list_files_json().await {
            Ok(rendered) => {
                *json = rendered;
                GetAction::SendJsonFileList
            }
            Err(err) => {
                warn!(error = ?err, "file listing failed");
                GetAction::SendInternalError
            }
        },
        "/mrufiles" => match repository.mru_files_json().await {
            Ok(rendered) => {
                *json = rendered;
                GetAction::SendMruFiles
            }
            Err(err) => {
                warn!(error = ?err, "mru listing failed");
                GetAction::SendInternalError
            }
        },
        "/mrufiles/zip" => match repository.mru_files_zip().await {
            Ok(staged) => {
                *bundle = Some(staged);
                GetAction::SendZipFile
            }
            Err(err) => {
                warn!(error = ?err, "mru archive failed");
                GetAction::SendInternalError
            }
        },
        _ => match request.uri_tokens.as_slice() {
            // /files/<id>: the stat fetch also bumps the file timestamp
            [_, _, id] => match repository.stat_for_id(id, true).await {
                Ok(rendered) => {
                    *json = rendered;
                    GetAction::SendFileStat
                }
                Err(err) => {
                    warn!(id, error = ?err, "stat fetch failed");
                    GetAction::SendInternalError
                }
            },
            [_, _, id, _] => match repository.file_zip(id).await {
                Ok(staged) => {
                    *bundle = Some(staged);
                    GetAction::SendZipFile
                }
                Err(FileZipError::IdNotFound) => GetAction::SendNotFound,
                Err(err) => {
                    warn!(id, error = ?err, "archive failed");
                    GetAction::SendInternalError
                }
            },
            _ => GetAction::SendInvalidRequest,
        },
    }
}

/// Writes the whole buffer, treating a zero-length write as transient
/// transmit-queue congestion: pause for a second and try again instead of
/// giving up on the connection.
async fn send_all<W: AsyncWrite + Unpin>(writer: &mut W, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        let sent = writer.write(buf).await?;
        if sent == 0 {
            time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        buf = &buf[sent..];
    }
    Ok(())
}

async fn send_file<W: AsyncWrite + Unpin>(writer: &mut W, path: &Path) -> io::Result<u64> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let read = file.read(&mut buf).await?;
        if read == 0 {
            return Ok(total);
        }
        send_all(writer, &buf[..read]).await?;
        total += read as u64;
    }
}
