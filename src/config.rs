//! CLI arguments and server configuration defaults.

use clap::{ArgAction, Parser};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MRU_FILES: u16 = 3;
pub const DEFAULT_RECV_TIMEOUT_MS: u64 = 5_000;

#[cfg(windows)]
pub const DEFAULT_STORE_DIR: &str = "~/httpsrv";
#[cfg(not(windows))]
pub const DEFAULT_STORE_DIR: &str = "~/.httpsrv";

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(
    name = "httpsrv",
    about = "Directory-backed file repository served over HTTP/1.1",
    disable_version_flag = true
)]
pub struct Args {
    #[arg(
        short = 'p',
        long,
        env = "HTTPSRV_PORT",
        default_value_t = DEFAULT_PORT,
        help = "Bind the server to this TCP port"
    )]
    pub port: u16,
    #[arg(
        short = 'n',
        long = "mrufiles",
        env = "HTTPSRV_MRUFILES",
        default_value_t = DEFAULT_MRU_FILES,
        value_parser = clap::value_parser!(u16).range(1..=1000),
        help = "Size of the most-recently-used file window"
    )]
    pub mru_files: u16,
    #[arg(
        short = 'w',
        long = "storedir",
        env = "HTTPSRV_STORE_DIR",
        default_value = DEFAULT_STORE_DIR,
        help = "Repository directory for uploaded files"
    )]
    pub store_dir: String,
    #[arg(
        long,
        env = "HTTPSRV_RECV_TIMEOUT_MS",
        default_value_t = DEFAULT_RECV_TIMEOUT_MS,
        help = "Per-read socket timeout in milliseconds"
    )]
    pub recv_timeout_ms: u64,
    // counted so that `-v` prints the version while `-vv` keeps working
    // as the historical spelling of --verbose
    #[arg(
        short = 'v',
        long = "version",
        action = ArgAction::Count,
        help = "Print name and version"
    )]
    pub version: u8,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Enable request/response logging on stderr"
    )]
    pub verbose: bool,
}

impl Args {
    pub fn version_requested(&self) -> bool {
        self.version == 1
    }

    pub fn verbose_enabled(&self) -> bool {
        self.verbose || self.version >= 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let args = Args::parse_from(["httpsrv"]);
        assert_eq!(args.port, DEFAULT_PORT);
        assert_eq!(args.mru_files, DEFAULT_MRU_FILES);
        assert_eq!(args.store_dir, DEFAULT_STORE_DIR);
        assert_eq!(args.recv_timeout_ms, DEFAULT_RECV_TIMEOUT_MS);
        assert!(!args.version_requested());
        assert!(!args.verbose_enabled());
    }

    #[test]
    fn short_flags_parse() {
        let args = Args::parse_from(["httpsrv", "-p", "9090", "-n", "10", "-w", "/tmp/repo"]);
        assert_eq!(args.port, 9090);
        assert_eq!(args.mru_files, 10);
        assert_eq!(args.store_dir, "/tmp/repo");
    }

    #[test]
    fn mru_window_is_bounded() {
        assert!(Args::try_parse_from(["httpsrv", "-n", "0"]).is_err());
        assert!(Args::try_parse_from(["httpsrv", "-n", "1001"]).is_err());
        assert!(Args::try_parse_from(["httpsrv", "-n", "1000"]).is_ok());
    }

    #[test]
    fn version_and_verbose_spellings() {
        assert!(Args::parse_from(["httpsrv", "-v"]).version_requested());
        assert!(Args::parse_from(["httpsrv", "--version"]).version_requested());
        assert!(Args::parse_from(["httpsrv", "-vv"]).verbose_enabled());
        assert!(Args::parse_from(["httpsrv", "--verbose"]).verbose_enabled());
        assert!(!Args::parse_from(["httpsrv", "--verbose"]).version_requested());
    }

    #[test]
    fn unknown_flags_are_rejected() {
        assert!(Args::try_parse_from(["httpsrv", "--bogus"]).is_err());
    }
}
