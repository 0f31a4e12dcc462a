//! TCP listener and per-connection dispatch.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time;
use tracing::{debug, warn};

use crate::repository::Repository;
use crate::session::Session;

pub struct HttpServer {
    listener: TcpListener,
    repository: Arc<Repository>,
    read_timeout: Duration,
}

impl HttpServer {
    /// Binds the listening socket on all interfaces.
    pub async fn bind(
        port: u16,
        repository: Arc<Repository>,
        read_timeout: Duration,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        Ok(Self {
            listener,
            repository,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, one detached session task per peer.
    ///
    /// A failed accept is logged and retried after a pause; it never brings
    /// the server down.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let fd = raw_fd(&stream);
                    debug!(%peer, fd, "connection accepted");
                    let session =
                        Session::new(stream, self.repository.clone(), self.read_timeout, fd);
                    tokio::spawn(session.run());
                }
                Err(err) => {
                    warn!(error = %err, "accept failed, retrying");
                    time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }
}

#[cfg(unix)]
fn raw_fd(stream: &TcpStream) -> i32 {
    use std::os::fd::AsRawFd;
    stream.as_raw_fd()
}

#[cfg(not(unix))]
fn raw_fd(_stream: &TcpStream) -> i32 {
    -1
}
