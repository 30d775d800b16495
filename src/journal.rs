use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::visitor::VisitorRecord;

#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    #[error("Failed to serialize visitor record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write visitor log: {0}")]
    Io(#[from] std::io::Error),
}

/// Append-only text log, one file per calendar day.
pub struct VisitorJournal {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl VisitorJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("visitor_log_{}.txt", date.format("%Y-%m-%d")))
    }

    /// Append one record as an indented JSON block followed by a blank line.
    pub async fn append(&self, record: &VisitorRecord) -> Result<PathBuf, JournalError> {
        let mut entry = render_entry(record)?;
        entry.push_str("\n\n");

        let path = self.path_for(record.date);
        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await?;
        Ok(path)
    }
}

/// Pretty JSON with four-space indentation.
pub fn render_entry(record: &VisitorRecord) -> Result<String, serde_json::Error> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    record.serialize(&mut ser)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
