//! Append-only CSV sink for admitted entries.
//!
//! Appends are flushed and synced before returning, so a crash or interrupt
//! loses at most the page being processed. The terminal normalization pass
//! rewrites the whole file through a temporary sibling and an atomic rename.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::SinkError;
use crate::models::{sort_for_output, CatalogEntry, COLUMNS, UNKNOWN_TITLE};

/// How a previously written file is parsed, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStrategy {
    Comma,
    Semicolon,
    /// Comma-separated, ragged rows allowed, unparseable rows dropped.
    Lenient,
}

impl ReadStrategy {
    const ORDER: [ReadStrategy; 3] = [
        ReadStrategy::Comma,
        ReadStrategy::Semicolon,
        ReadStrategy::Lenient,
    ];

    fn reader<'a>(self, data: &'a [u8]) -> csv::Reader<&'a [u8]> {
        let mut builder = ReaderBuilder::new();
        match self {
            ReadStrategy::Comma => builder.delimiter(b','),
            ReadStrategy::Semicolon => builder.delimiter(b';'),
            ReadStrategy::Lenient => builder.delimiter(b',').flexible(true),
        };
        builder.from_reader(data)
    }
}

/// Column positions resolved from a file's header row.
struct ColumnMap {
    item_id: usize,
    category: usize,
    cover_image_url: Option<usize>,
    title: Option<usize>,
    author: Option<usize>,
    publication_date_label: Option<usize>,
    review_count: Option<usize>,
}

impl ColumnMap {
    /// Fails unless the header names at least the id and category columns.
    fn from_headers(headers: &StringRecord) -> Option<Self> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);
        Some(Self {
            item_id: find(COLUMNS[0])?,
            category: find(COLUMNS[6])?,
            cover_image_url: find(COLUMNS[1]),
            title: find(COLUMNS[2]),
            author: find(COLUMNS[3]),
            publication_date_label: find(COLUMNS[4]),
            review_count: find(COLUMNS[5]),
        })
    }

    fn entry(&self, record: &StringRecord) -> Option<CatalogEntry> {
        let field = |index: Option<usize>| {
            index
                .and_then(|i| record.get(i))
                .map(|v| v.trim().to_string())
                .unwrap_or_default()
        };

        let item_id = field(Some(self.item_id));
        if item_id.is_empty() {
            return None;
        }

        let title = field(self.title);
        Some(CatalogEntry {
            item_id,
            cover_image_url: field(self.cover_image_url),
            title: if title.is_empty() {
                UNKNOWN_TITLE.to_string()
            } else {
                title
            },
            author: field(self.author),
            publication_date_label: field(self.publication_date_label),
            review_count: coerce_count(&field(self.review_count)),
            category: field(Some(self.category)),
        })
    }
}

/// Review counts read back from disk: integers, or floats some editors
/// write ("128.0"); anything else is zero.
fn coerce_count(value: &str) -> u64 {
    if let Ok(n) = value.parse::<u64>() {
        return n;
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 => f.trunc() as u64,
        _ => 0,
    }
}

/// The output file for a run.
#[derive(Debug, Clone)]
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn display(&self) -> String {
        self.path.display().to_string()
    }

    fn io_error(&self, source: io::Error) -> SinkError {
        SinkError::Io {
            path: self.display(),
            source,
        }
    }

    fn csv_error(&self, source: csv::Error) -> SinkError {
        SinkError::Csv {
            path: self.display(),
            source,
        }
    }

    fn ensure_parent(&self) -> Result<(), SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
            }
        }
        Ok(())
    }

    /// Append entries as rows. Writes the header first when the file is
    /// new or empty. No-op for an empty batch.
    pub fn append(&self, entries: &[CatalogEntry]) -> Result<usize, SinkError> {
        if entries.is_empty() {
            return Ok(0);
        }
        self.ensure_parent()?;

        let size = fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_error(e))?;

        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if size == 0 {
            writer
                .write_record(COLUMNS)
                .map_err(|e| self.csv_error(e))?;
        }
        for entry in entries {
            writer.serialize(entry).map_err(|e| self.csv_error(e))?;
        }
        writer.flush().map_err(|e| self.io_error(e))?;

        let file = writer.into_inner().map_err(|e| {
            let cause = e.error();
            self.io_error(io::Error::new(cause.kind(), cause.to_string()))
        })?;
        file.sync_data().map_err(|e| self.io_error(e))?;

        debug!("Appended {} rows to {}", entries.len(), self.display());
        Ok(entries.len())
    }

    /// Read every entry back, tolerating files edited by other tools.
    /// Duplicate ids keep their first row. A missing file is empty.
    pub fn read_all(&self) -> Result<Vec<CatalogEntry>, SinkError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if data.iter().all(u8::is_ascii_whitespace) {
            return Ok(Vec::new());
        }

        let mut failures = Vec::new();
        for strategy in ReadStrategy::ORDER {
            match read_with(strategy, &data) {
                Ok(entries) => {
                    debug!(
                        "Read {} rows from {} ({:?})",
                        entries.len(),
                        self.display(),
                        strategy
                    );
                    return Ok(dedup_by_id(entries));
                }
                Err(reason) => {
                    debug!("{:?} read of {} failed: {}", strategy, self.display(), reason);
                    failures.push(format!("{:?}: {}", strategy, reason));
                }
            }
        }

        Err(SinkError::Unreadable {
            path: self.display(),
            reason: failures.join("; "),
        })
    }

    /// Replace the file's contents with `entries`, header included.
    pub fn write_all(&self, entries: &[CatalogEntry]) -> Result<(), SinkError> {
        self.ensure_parent()?;
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let mut temp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(e))?;
        {
            let mut writer = WriterBuilder::new()
                .has_headers(false)
                .from_writer(temp.as_file_mut());
            writer
                .write_record(COLUMNS)
                .map_err(|e| self.csv_error(e))?;
            for entry in entries {
                writer.serialize(entry).map_err(|e| self.csv_error(e))?;
            }
            writer.flush().map_err(|e| self.io_error(e))?;
        }
        temp.as_file().sync_all().map_err(|e| self.io_error(e))?;

        temp.persist(&self.path).map_err(|e| SinkError::Persist {
            path: self.display(),
            reason: e.error.to_string(),
        })?;
        Ok(())
    }

    /// Rewrite the file in output order: category ascending, then review
    /// count descending. Returns the number of rows written.
    pub fn normalize(&self) -> Result<usize, SinkError> {
        let mut entries = self.read_all()?;
        sort_for_output(&mut entries);
        self.write_all(&entries)?;
        Ok(entries.len())
    }

    /// Delete the file. Returns whether there was one.
    pub fn remove(&self) -> Result<bool, SinkError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

fn read_with(strategy: ReadStrategy, data: &[u8]) -> Result<Vec<CatalogEntry>, String> {
    let mut reader = strategy.reader(data);
    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let columns = ColumnMap::from_headers(&headers)
        .ok_or_else(|| format!("header lacks {} or {}", COLUMNS[0], COLUMNS[6]))?;

    let mut entries = Vec::new();
    let mut dropped = 0usize;
    for (line, record) in reader.records().enumerate() {
        match record {
            Ok(record) => {
                if let Some(entry) = columns.entry(&record) {
                    entries.push(entry);
                }
            }
            Err(e) if strategy == ReadStrategy::Lenient => {
                debug!("Dropping unreadable row {}: {}", line + 2, e);
                dropped += 1;
            }
            Err(e) => return Err(e.to_string()),
        }
    }
    if dropped > 0 {
        warn!("Dropped {} unreadable rows", dropped);
    }
    Ok(entries)
}

fn dedup_by_id(entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.item_id.clone()))
        .collect()
}
