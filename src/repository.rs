//! The directory-backed file repository and its zip bundles.
//!
//! All uploaded files live flat in one canonical directory; every derived
//! view (listings, MRU selection, zip archives) is computed from a fresh
//! scan of that directory.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;
use tokio::task;
use tracing::debug;

use crate::fsutil;
use crate::index::{FilenameIndex, StatError};
use crate::stat::{self, FileStat};

pub const MRU_ZIP_NAME: &str = "mrufiles.zip";

/// Errors raised by plain repository operations.
#[derive(Debug)]
pub enum RepositoryError {
    Io(io::Error),
    Render(serde_json::Error),
}

impl From<io::Error> for RepositoryError {
    fn from(err: io::Error) -> Self {
        RepositoryError::Io(err)
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Render(err)
    }
}

/// Outcome of a zip request, kept separate so the session can map each
/// case to its own HTTP status.
#[derive(Debug)]
pub enum FileZipError {
    /// No file is known under the requested id.
    IdNotFound,
    /// The staging directory could not be created.
    TempDir(io::Error),
    /// Collecting or compressing the payload failed.
    Archive(io::Error),
}

/// A zip file staged in a private temp directory.
///
/// Dropping the bundle removes the staging directory and everything in it,
/// so the session keeps it alive until the archive bytes are on the wire.
#[derive(Debug)]
pub struct ZipBundle {
    zip_path: PathBuf,
    _staging: TempDir,
}

impl ZipBundle {
    pub fn zip_path(&self) -> &Path {
        &self.zip_path
    }
}

/// Flat directory of uploaded files plus the id index over it.
#[derive(Debug)]
pub struct Repository {
    path: PathBuf,
    mru_limit: usize,
    index: FilenameIndex,
}

impl Repository {
    /// Opens (creating if needed) the repository at `raw_path` and seeds
    /// the filename index from its current content.
    pub async fn open(raw_path: &str, mru_limit: usize) -> io::Result<Self> {
        let expanded = fsutil::expand_home(raw_path);
        let path = fsutil::ensure_directory(&expanded)?;
        let repository = Self {
            path,
            mru_limit,
            index: FilenameIndex::default(),
        };
        repository.index.scan(&repository.path).await?;
        Ok(repository)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Regular files of the repository sorted by modification time,
    /// oldest first. Callers walk it in reverse for MRU order.
    async fn time_ordered_files(&self) -> io::Result<Vec<(SystemTime, String)>> {
        let mut files = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.path).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let meta = entry.metadata().await?;
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push((modified, entry.file_name().to_string_lossy().to_string()));
        }
        files.sort_by_key(|(modified, _)| *modified);
        Ok(files)
    }

    /// Names of the most recently modified files, newest first.
    pub async fn mru_files(&self) -> io::Result<Vec<String>> {
        let files = self.time_ordered_files().await?;
        Ok(files
            .into_iter()
            .rev()
            .take(self.mru_limit)
            .map(|(_, name)| name)
            .collect())
    }

    /// JSON listing of the MRU files as full stat records.
    pub async fn mru_files_json(&self) -> Result<String, RepositoryError> {
        let mut stats = Vec::new();
        for name in self.mru_files().await? {
            let id = fsutil::hash_code(&name);
            // skip entries that vanished between listing and stat
            if let Ok(file_stat) = FileStat::from_file(&self.path.join(&name), &name, &id).await {
                stats.push(file_stat);
            }
        }
        Ok(stat::render_list(&stats)?)
    }

    /// Rebuilds the index from disk and returns the full JSON listing.
    pub async fn list_files_json(&self) -> Result<String, StatError> {
        self.index.rebuild_json(&self.path).await
    }

    /// Stat of one id; `touch` refreshes the file timestamp first.
    pub async fn stat_for_id(&self, id: &str, touch: bool) -> Result<String, StatError> {
        self.index.stat_for_id(&self.path, id, touch).await
    }

    /// Stores `content` under `name`, truncating any previous version, and
    /// returns the JSON stat of the stored file.
    ///
    /// Only the basename of `name` is honoured: clients are free to send
    /// client-side paths, but nothing may escape the repository directory.
    pub async fn store(&self, name: &str, content: &[u8]) -> Result<String, RepositoryError> {
        let name = Path::new(name)
            .file_name()
            .map(|base| base.to_string_lossy().to_string())
            .ok_or_else(|| {
                RepositoryError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "empty file name",
                ))
            })?;

        let target = self.path.join(&name);
        tokio::fs::write(&target, content).await?;

        let id = fsutil::hash_code(&name);
        self.index.insert(id.clone(), name.clone()).await;
        debug!(name, id, size = content.len(), "file stored");

        let file_stat = FileStat::from_file(&target, &name, &id).await?;
        Ok(file_stat.render()?)
    }

    /// Packages the MRU files into `mrufiles.zip` inside a fresh staging
    /// directory.
    pub async fn mru_files_zip(&self) -> Result<ZipBundle, FileZipError> {
        let staging = TempDir::new().map_err(FileZipError::TempDir)?;
        let zip_path = staging.path().join(MRU_ZIP_NAME);

        let names = self.mru_files().await.map_err(FileZipError::Archive)?;
        let entries: Vec<(PathBuf, String)> = names
            .into_iter()
            .map(|name| (self.path.join(&name), name))
            .collect();

        write_archive(zip_path.clone(), entries).await?;
        Ok(ZipBundle {
            zip_path,
            _staging: staging,
        })
    }

    /// Packages the single file known under `id` into `<name>.zip`.
    ///
    /// The source file is touched first so the timestamp surfaced by the
    /// archive reflects this download.
    pub async fn file_zip(&self, id: &str) -> Result<ZipBundle, FileZipError> {
        let name = self
            .index
            .lookup(id)
            .await
            .ok_or(FileZipError::IdNotFound)?;
        let staging = TempDir::new().map_err(FileZipError::TempDir)?;

        let source = self.path.join(&name);
        fsutil::touch(&source, false).map_err(FileZipError::Archive)?;

        let zip_path = staging.path().join(format!("{name}.zip"));
        write_archive(zip_path.clone(), vec![(source, name)]).await?;
        Ok(ZipBundle {
            zip_path,
            _staging: staging,
        })
    }
}

/// Runs the blocking zip assembly off the async workers.
async fn write_archive(
    zip_path: PathBuf,
    entries: Vec<(PathBuf, String)>,
) -> Result<(), FileZipError> {
    task::spawn_blocking(move || write_archive_blocking(&zip_path, &entries))
        .await
        .map_err(|err| FileZipError::Archive(io::Error::other(err)))?
        .map_err(FileZipError::Archive)
}

fn write_archive_blocking(zip_path: &Path, entries: &[(PathBuf, String)]) -> io::Result<()> {
    let file = std::fs::File::create(zip_path)?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default();

    for (source, entry_name) in entries {
        writer
            .start_file(entry_name.clone(), options)
            .map_err(io::Error::other)?;
        let mut reader = std::fs::File::open(source)?;
        std::io::copy(&mut reader, &mut writer)?;
    }

    writer.finish().map_err(io::Error::other)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::io::Read;
    use tempfile::tempdir;

    async fn make_repository(mru_limit: usize) -> (tempfile::TempDir, Repository) {
        let temp = tempdir().expect("tempdir");
        let repository = Repository::open(temp.path().to_str().expect("utf-8 path"), mru_limit)
            .await
            .expect("open repository");
        (temp, repository)
    }

    fn age_file(path: &Path, unix_seconds: i64) {
        let when = FileTime::from_unix_time(unix_seconds, 0);
        filetime::set_file_times(path, when, when).expect("set times");
    }

    fn read_zip_names(zip_path: &Path) -> Vec<String> {
        let file = std::fs::File::open(zip_path).expect("open zip");
        let archive = zip::ZipArchive::new(file).expect("read zip");
        archive.file_names().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn store_writes_file_and_returns_stat() {
        let (_temp, repository) = make_repository(3).await;
        let json = repository
            .store("hello.txt", b"Hello, world!")
            .await
            .expect("store");

        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["name"], "hello.txt");
        assert_eq!(value["size"], 13);
        assert_eq!(value["id"], fsutil::hash_code("hello.txt"));
        assert_eq!(
            std::fs::read(repository.path().join("hello.txt")).expect("read back"),
            b"Hello, world!"
        );
    }

    #[tokio::test]
    async fn store_overwrites_and_keeps_id() {
        let (_temp, repository) = make_repository(3).await;
        repository.store("same.txt", b"one").await.expect("store");
        let json = repository
            .store("same.txt", b"second body")
            .await
            .expect("overwrite");

        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        assert_eq!(value["size"], 11);
        assert_eq!(value["id"], fsutil::hash_code("same.txt"));

        let listing = repository.list_files_json().await.expect("listing");
        let entries: serde_json::Value = serde_json::from_str(&listing).expect("valid json");
        assert_eq!(entries.as_array().expect("array").len(), 1);
    }

    #[tokio::test]
    async fn store_uses_basename_only() {
        let (_temp, repository) = make_repository(3).await;
        repository
            .store("../../escape.txt", b"x")
            .await
            .expect("store");
        assert!(repository.path().join("escape.txt").is_file());
        assert!(!repository.path().parent().expect("parent").join("escape.txt").exists());
    }

    #[tokio::test]
    async fn mru_files_orders_newest_first() {
        let (_temp, repository) = make_repository(2).await;
        for (name, age) in [("a.txt", 100), ("b.txt", 200), ("c.txt", 300)] {
            repository.store(name, b"x").await.expect("store");
            age_file(&repository.path().join(name), age);
        }

        let names = repository.mru_files().await.expect("mru");
        assert_eq!(names, vec!["c.txt".to_string(), "b.txt".to_string()]);
    }

    #[tokio::test]
    async fn mru_files_json_respects_limit_of_one() {
        let (_temp, repository) = make_repository(1).await;
        for (name, age) in [
            ("one.txt", 10),
            ("two.txt", 20),
            ("three.txt", 30),
            ("four.txt", 40),
            ("five.txt", 50),
        ] {
            repository.store(name, b"x").await.expect("store");
            age_file(&repository.path().join(name), age);
        }

        let json = repository.mru_files_json().await.expect("mru json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("valid json");
        let entries = value.as_array().expect("array");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["name"], "five.txt");
    }

    #[tokio::test]
    async fn mru_files_json_empty_repository() {
        let (_temp, repository) = make_repository(3).await;
        assert_eq!(repository.mru_files_json().await.expect("mru json"), "[\n\n]\n");
    }

    #[tokio::test]
    async fn file_zip_contains_single_entry() {
        let (_temp, repository) = make_repository(3).await;
        let payload: Vec<u8> = (0u8..10).collect();
        repository.store("x.dat", &payload).await.expect("store");

        let bundle = repository
            .file_zip(&fsutil::hash_code("x.dat"))
            .await
            .expect("zip");
        assert_eq!(read_zip_names(bundle.zip_path()), vec!["x.dat".to_string()]);

        let file = std::fs::File::open(bundle.zip_path()).expect("open zip");
        let mut archive = zip::ZipArchive::new(file).expect("read zip");
        let mut entry = archive.by_name("x.dat").expect("entry");
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes).expect("unpack");
        assert_eq!(bytes, payload);
    }

    #[tokio::test]
    async fn file_zip_unknown_id() {
        let (_temp, repository) = make_repository(3).await;
        let result = repository.file_zip(&"0".repeat(64)).await;
        assert!(matches!(result, Err(FileZipError::IdNotFound)));
    }

    #[tokio::test]
    async fn mru_files_zip_collects_window() {
        let (_temp, repository) = make_repository(2).await;
        for (name, age) in [("old.txt", 100), ("mid.txt", 200), ("new.txt", 300)] {
            repository.store(name, b"x").await.expect("store");
            age_file(&repository.path().join(name), age);
        }

        let bundle = repository.mru_files_zip().await.expect("zip");
        assert!(bundle.zip_path().ends_with(MRU_ZIP_NAME));
        let mut names = read_zip_names(bundle.zip_path());
        names.sort();
        assert_eq!(names, vec!["mid.txt".to_string(), "new.txt".to_string()]);
    }

    #[tokio::test]
    async fn zip_bundle_drop_removes_staging_dir() {
        let (_temp, repository) = make_repository(3).await;
        repository.store("keep.txt", b"x").await.expect("store");

        let bundle = repository
            .file_zip(&fsutil::hash_code("keep.txt"))
            .await
            .expect("zip");
        let staging_dir = bundle.zip_path().parent().expect("parent").to_path_buf();
        assert!(staging_dir.exists());
        drop(bundle);
        assert!(!staging_dir.exists());
    }
}
