//! Filesystem helpers shared by the repository and the HTTP layer.
//!
//! Home-directory expansion, directory bootstrap, timestamp touch, and the
//! name-to-id digest used across the whole server.

use filetime::FileTime;
use sha2::{Digest, Sha256};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Replaces a leading `~` or `~/` with the current user's home directory.
///
/// Any other path comes back unchanged. A missing home variable falls back
/// to the current directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        return PathBuf::from(home_dir());
    }
    if let Some(rest) = path.strip_prefix("~/") {
        return Path::new(&home_dir()).join(rest);
    }
    PathBuf::from(path)
}

fn home_dir() -> String {
    let var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    env::var(var).unwrap_or_else(|_| ".".to_string())
}

/// Creates `path` if it does not exist and returns its canonical form.
///
/// Fails when `path` exists but is not a directory.
pub fn ensure_directory(path: &Path) -> io::Result<PathBuf> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} exists and is not a directory", path.display()),
            ));
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => fs::create_dir_all(path)?,
        Err(err) => return Err(err),
    }
    fs::canonicalize(path)
}

/// Lowercase hex SHA-256 of the UTF-8 bytes of `src`.
///
/// This is the id under which a stored file is addressed; it hashes the
/// file *name*, so overwriting a file keeps its id stable.
pub fn hash_code(src: &str) -> String {
    hex::encode(Sha256::digest(src.as_bytes()))
}

/// Bumps access and modification time of `path` to now.
///
/// With `create_if_missing` a missing file is created empty instead of
/// failing.
pub fn touch(path: &Path, create_if_missing: bool) -> io::Result<()> {
    match fs::metadata(path) {
        Ok(_) => {
            let now = FileTime::now();
            filetime::set_file_times(path, now, now)
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound && create_if_missing => {
            fs::File::create(path).map(|_| ())
        }
        Err(err) => Err(err),
    }
}
