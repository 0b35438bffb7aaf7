//! Append-only CSV sink

use super::{QuoteSink, QuoteSnapshot};
use crate::error::SinkError;
use crate::matcher::MatchedPair;
use async_trait::async_trait;
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// File name used inside the sink directory
pub const SNAPSHOT_FILE: &str = "quote_snapshots.csv";

/// Appends snapshots to `<dir>/quote_snapshots.csv`
///
/// The header is written when the file is empty. Decimals are written as
/// their exact string form, so reading a file back yields the same values.
pub struct CsvSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(SNAPSHOT_FILE),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, snapshot: &QuoteSnapshot) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(snapshot)?;
        writer.flush()?;
        Ok(())
    }

    /// Read every snapshot from a CSV file written by this sink
    pub fn read_snapshots(path: impl AsRef<Path>) -> Result<Vec<QuoteSnapshot>, SinkError> {
        let file = File::open(path.as_ref())?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        reader
            .deserialize()
            .map(|row| row.map_err(SinkError::from))
            .collect()
    }
}

#[async_trait]
impl QuoteSink for CsvSink {
    async fn ensure_pair(&self, _pair: &MatchedPair) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn write(&self, snapshot: &QuoteSnapshot) -> Result<(), SinkError> {
        let _guard = self.lock.lock().await;
        self.append(snapshot)
    }
}
