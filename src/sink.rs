//! Per-outlet output table.
//!
//! Records are appended to `<sanitised-domain>_data.csv` one row at a time and
//! flushed to disk after every append, so the dashboard can read partial
//! results while a crawl is still running. The table holds at most one row
//! per source URL; URLs already present when the table is reopened count as
//! seen. URLs are compared by [`dedup_key`], so `http`/`https`, `www.` and
//! trailing-slash variants of one page share a row.
//!
//! # Columns
//!
//! `author, headline, source_url, keywords, topics, outlet, scraped_at`
//!
//! Keywords and topics are joined with `", "`.

use crate::errors::SinkError;
use crate::models::{ArticleRecord, Outlet};
use crate::urls::dedup_key;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, instrument};
use url::Url;

pub const HEADER: [&str; 7] = [
    "author",
    "headline",
    "source_url",
    "keywords",
    "topics",
    "outlet",
    "scraped_at",
];

const LIST_SEPARATOR: &str = ", ";
const SOURCE_URL_COLUMN: usize = 2;

/// Result of a single append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appended {
    Written,
    /// A row for this URL already exists; nothing was written.
    Duplicate,
}

struct SinkState {
    writer: csv::Writer<File>,
    seen: HashSet<String>,
}

/// Append-only CSV table shared by every task of one crawl.
pub struct RecordSink {
    path: PathBuf,
    state: Mutex<SinkState>,
}

impl std::fmt::Debug for RecordSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordSink").field("path", &self.path).finish()
    }
}

impl RecordSink {
    /// Open (or create) the table for `outlet` inside `dir`.
    ///
    /// # Arguments
    ///
    /// * `dir` - Output directory; must already exist
    /// * `outlet` - Determines the file name
    ///
    /// # Returns
    ///
    /// The sink, with URLs of existing rows marked as seen, or a
    /// [`SinkError`] if the file cannot be read or created.
    pub fn open(dir: &Path, outlet: &Outlet) -> Result<Self, SinkError> {
        Self::open_path(dir.join(outlet.table_file_name()))
    }

    #[instrument(level = "debug", skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        let seen = existing_urls(&path)?;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_empty = file.metadata()?.len() == 0;
        let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
        if is_empty {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }

        if !seen.is_empty() {
            info!(rows = seen.len(), path = %path.display(), "Reopened existing output table");
        }
        Ok(Self {
            path,
            state: Mutex::new(SinkState { writer, seen }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of distinct source URLs in the table.
    pub fn row_count(&self) -> usize {
        self.lock().seen.len()
    }

    /// Append `record` unless its source URL is already in the table.
    ///
    /// The row is flushed and synced before this returns.
    pub fn append(&self, record: &ArticleRecord) -> Result<Appended, SinkError> {
        let key = url_key(&record.source_url);
        let mut state = self.lock();
        if state.seen.contains(&key) {
            debug!(url = %record.source_url, "Record already in table");
            return Ok(Appended::Duplicate);
        }

        let keywords = record.keywords.join(LIST_SEPARATOR);
        let topics = record.topics.join(LIST_SEPARATOR);
        state.writer.write_record([
            record.author.as_str(),
            record.headline.as_str(),
            record.source_url.as_str(),
            keywords.as_str(),
            topics.as_str(),
            record.outlet.as_str(),
            record.scraped_at.as_str(),
        ])?;
        state.writer.flush()?;
        state.writer.get_ref().sync_data()?;

        state.seen.insert(key);
        Ok(Appended::Written)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn existing_urls(path: &Path) -> Result<HashSet<String>, SinkError> {
    if !path.exists() {
        return Ok(HashSet::new());
    }
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let column = url_column(reader.headers()?);
    Ok(reader
        .records()
        .filter_map(Result::ok)
        .filter_map(|row| row.get(column).map(str::to_string))
        .filter(|url| !url.is_empty())
        .map(|url| url_key(&url))
        .collect())
}

/// Comparison key for a stored source URL; unparsable values compare verbatim.
fn url_key(raw: &str) -> String {
    Url::parse(raw).map_or_else(|_| raw.to_string(), |url| dedup_key(&url))
}

fn url_column(headers: &StringRecord) -> usize {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case("source_url"))
        .unwrap_or(SOURCE_URL_COLUMN)
}

/// Read every complete row of a table.
///
/// Rows that fail to parse (for example a line still being written) are
/// skipped.
pub fn read_records(path: &Path) -> Result<Vec<ArticleRecord>, SinkError> {
    let mut reader = ReaderBuilder::new().flexible(true).from_path(path)?;
    let records = reader
        .records()
        .filter_map(Result::ok)
        .filter(|row| row.len() >= HEADER.len())
        .map(|row| {
            let field = |i: usize| row.get(i).unwrap_or_default().to_string();
            let list = |i: usize| {
                row.get(i)
                    .unwrap_or_default()
                    .split(LIST_SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            };
            ArticleRecord {
                author: field(0),
                headline: field(1),
                source_url: field(2),
                keywords: list(3),
                topics: list(4),
                outlet: field(5),
                scraped_at: field(6),
            }
        })
        .collect();
    Ok(records)
}
