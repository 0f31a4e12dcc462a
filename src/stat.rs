//! JSON stat records describing files in the repository.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::time::SystemTime;

/// Attributes of one stored file as surfaced to clients.
///
/// `timestamp` carries the last access time so that a stat fetch which
/// touched the file reports the bump it caused.
#[derive(Debug, Serialize)]
pub struct FileStat {
    pub id: String,
    pub name: String,
    pub size: u64,
    pub timestamp: String,
}

impl FileStat {
    /// Reads `path` from disk and builds its stat record.
    pub async fn from_file(path: &Path, name: &str, id: &str) -> io::Result<Self> {
        let meta = tokio::fs::metadata(path).await?;
        let accessed = meta
            .accessed()
            .or_else(|_| meta.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        Ok(Self {
            id: id.to_string(),
            name: name.to_string(),
            size: meta.len(),
            timestamp: format_timestamp(accessed),
        })
    }

    /// Renders the record as a standalone JSON object.
    pub fn render(&self) -> Result<String, serde_json::Error> {
        Ok(serde_json::to_string_pretty(self)? + "\n")
    }
}

/// Renders a listing of stat records as a JSON array.
///
/// The empty listing keeps the historical wire shape `[\n\n]\n` that
/// clients of this protocol parse.
pub fn render_list(stats: &[FileStat]) -> Result<String, serde_json::Error> {
    if stats.is_empty() {
        return Ok("[\n\n]\n".to_string());
    }
    Ok(serde_json::to_string_pretty(stats)? + "\n")
}

/// UTC ISO-8601 with microseconds, `YYYY-MM-DDTHH:MM:SS.uuuuuuZ`.
pub fn format_timestamp(time: SystemTime) -> String {
    let utc: DateTime<Utc> = time.into();
    utc.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}
