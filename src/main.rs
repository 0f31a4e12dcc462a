//! httpsrv server binary.
//!
//! A small HTTP/1.1 server around a flat directory of uploaded files:
//! multipart POST stores a file, GET endpoints list the repository, select
//! the most recently used window, and package files into zip archives.
//! The entry point wires configuration, logging, the repository, and the
//! accept loop together and maps startup failures to the exit code.

mod config;
mod fsutil;
mod index;
mod logging;
mod repository;
mod request;
mod response;
mod server;
mod session;
mod stat;

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use crate::config::Args;
use crate::repository::Repository;
use crate::server::HttpServer;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if args.version_requested() {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    logging::init_logging(args.verbose_enabled());

    let repository = match Repository::open(&args.store_dir, args.mru_files as usize).await {
        Ok(repository) => Arc::new(repository),
        Err(err) => {
            error!(error = %err, store_dir = %args.store_dir, "cannot initialize the local repository");
            return ExitCode::FAILURE;
        }
    };

    let read_timeout = Duration::from_millis(args.recv_timeout_ms);
    let server = match HttpServer::bind(args.port, repository.clone(), read_timeout).await {
        Ok(server) => server,
        Err(err) => {
            error!(error = %err, port = args.port, "cannot bind server port");
            return ExitCode::FAILURE;
        }
    };

    info!(
        port = args.port,
        repository = %repository.path().display(),
        mru_files = args.mru_files,
        "httpsrv is listening"
    );

    tokio::select! {
        _ = server.run() => ExitCode::FAILURE,
        _ = shutdown_signal() => {
            info!("received termination signal, shutting down");
            ExitCode::SUCCESS
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
