//! Concurrent id-to-filename index over the repository directory.
//!
//! The index is advisory: the filesystem stays authoritative, and the full
//! listing endpoint rebuilds the mapping from disk before answering.

use std::collections::HashMap;
use std::io;
use std::path::Path;
use tokio::sync::RwLock;

use crate::fsutil;
use crate::stat::{self, FileStat};

/// Failure modes of stat lookups against the index.
#[derive(Debug)]
pub enum StatError {
    /// The id is not present in the current mapping.
    UnknownId,
    /// The underlying file vanished or could not be read.
    Io(io::Error),
    /// The stat record could not be rendered.
    Render(serde_json::Error),
}

impl From<io::Error> for StatError {
    fn from(err: io::Error) -> Self {
        StatError::Io(err)
    }
}

impl From<serde_json::Error> for StatError {
    fn from(err: serde_json::Error) -> Self {
        StatError::Render(err)
    }
}

/// Thread-safe mapping from file id to file name.
///
/// Multi-reader / single-writer: lookups take the read lock, every mutation
/// takes the write lock.
#[derive(Debug, Default)]
pub struct FilenameIndex {
    entries: RwLock<HashMap<String, String>>,
}

impl FilenameIndex {
    /// Inserts one `(id, name)` pair.
    pub async fn insert(&self, id: String, name: String) {
        self.entries.write().await.insert(id, name);
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Swaps the whole mapping for `entries`.
    pub async fn replace(&self, entries: HashMap<String, String>) {
        *self.entries.write().await = entries;
    }

    /// Resolves `id` to its file name.
    pub async fn lookup(&self, id: &str) -> Option<String> {
        self.entries.read().await.get(id).cloned()
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Scans `path` and replaces the live mapping with the result.
    pub async fn scan(&self, path: &Path) -> io::Result<()> {
        let fresh = scan_directory(path).await?;
        self.replace(fresh).await;
        Ok(())
    }

    /// Rebuilds the mapping from disk and renders the full listing.
    ///
    /// The scan runs under the writer lock so readers observe either the
    /// previous mapping or the complete new one, never a partial state.
    pub async fn rebuild_json(&self, path: &Path) -> Result<String, StatError> {
        let mut entries = self.entries.write().await;

        let mut fresh = HashMap::new();
        let mut stats = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(entry) = dir.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            let id = fsutil::hash_code(&name);
            // a file may disappear between enumeration and stat; skip it
            match FileStat::from_file(&entry.path(), &name, &id).await {
                Ok(file_stat) => {
                    fresh.insert(id, name);
                    stats.push(file_stat);
                }
                Err(_) => continue,
            }
        }

        *entries = fresh;
        Ok(stat::render_list(&stats)?)
    }

    /// Renders the stat of one id, optionally bumping the file's timestamp
    /// first.
    pub async fn stat_for_id(
        &self,
        path: &Path,
        id: &str,
        touch: bool,
    ) -> Result<String, StatError> {
        let name = self.lookup(id).await.ok_or(StatError::UnknownId)?;
        let file_path = path.join(&name);
        if touch {
            fsutil::touch(&file_path, false)?;
        }
        let file_stat = FileStat::from_file(&file_path, &name, id).await?;
        Ok(file_stat.render()?)
    }
}

async fn scan_directory(path: &Path) -> io::Result<HashMap<String, String>> {
    let mut entries = HashMap::new();
    let mut dir = tokio::fs::read_dir(path).await?;
    while let Some(entry) = dir.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        entries.insert(fsutil::hash_code(&name), name);
    }
    Ok(entries)
}
