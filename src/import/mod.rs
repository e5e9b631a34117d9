//! Loading dump files into the engine.
//!
//! An import runs inside a single transaction: it either lands completely or
//! leaves the database untouched. Progress is derived from bytes consumed and
//! reported through a [`ProgressSink`]; a [`CancelToken`] is polled between
//! statements or records.

mod delimited;
pub(crate) mod history;
mod jsonl;
pub mod progress;
mod sql;
pub mod task;

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use progress::{CancelToken, ProgressSink, Tracker};

pub use history::ImportRecord;

/// On-disk layout of a dump file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DumpFormat {
    /// Plain SQL text, as produced by `sqlite3 .dump`.
    Sql,
    /// Comma-separated values with a header row.
    Csv,
    /// One JSON object per line.
    JsonLines,
}

impl DumpFormat {
    /// Pick a format. A platform name that names a format wins; otherwise the
    /// file extension decides, falling back to SQL.
    pub fn detect(platform: &str, path: &Path) -> Self {
        Self::from_name(platform)
            .or_else(|| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .and_then(Self::from_name)
            })
            .unwrap_or(Self::Sql)
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sql" | "sqlite" | "sqlite3" => Some(Self::Sql),
            "csv" => Some(Self::Csv),
            "jsonl" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sql => "sql",
            Self::Csv => "csv",
            Self::JsonLines => "jsonl",
        }
    }
}

impl fmt::Display for DumpFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What to import and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRequest {
    /// Free-form name of the system that produced the dump.
    pub platform: String,
    pub path: PathBuf,
}

impl ImportRequest {
    pub fn new(platform: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            platform: platform.into(),
            path: path.into(),
        }
    }

    pub fn format(&self) -> DumpFormat {
        DumpFormat::detect(&self.platform, &self.path)
    }
}

/// Outcome of a successful import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub platform: String,
    pub format: DumpFormat,
    pub source: PathBuf,
    /// Statements executed (SQL) or rows inserted (CSV, JSON-lines).
    pub records: u64,
    pub bytes: u64,
    /// Hex SHA-256 of the dump file.
    pub sha256: String,
}

/// Run an import on `conn`, emitting a terminal report whatever the outcome.
pub(crate) fn run(
    conn: &mut Connection,
    request: &ImportRequest,
    config: &EngineConfig,
    sink: &mut dyn ProgressSink,
    cancel: &CancelToken,
) -> Result<ImportSummary> {
    let format = request.format();
    let total_bytes = std::fs::metadata(&request.path).map(|m| m.len()).unwrap_or(0);
    let mut tracker = Tracker::new(sink, total_bytes, config.progress_step);
    tracker.start(format!(
        "Starting {format} import from {}",
        request.path.display()
    ));

    match load(conn, request, format, config, &mut tracker, cancel) {
        Ok(summary) => {
            tracker.complete();
            Ok(summary)
        }
        Err(EngineError::Cancelled) => {
            tracker.cancelled();
            Err(EngineError::Cancelled)
        }
        Err(e) => {
            tracker.fail(&e.to_string());
            Err(e)
        }
    }
}

fn load(
    conn: &mut Connection,
    request: &ImportRequest,
    format: DumpFormat,
    config: &EngineConfig,
    tracker: &mut Tracker<'_>,
    cancel: &CancelToken,
) -> Result<ImportSummary> {
    if cancel.is_cancelled() {
        return Err(EngineError::Cancelled);
    }
    let file = File::open(&request.path)?;
    let mut reader = BufReader::new(Hashing::new(file));

    let tx = conn.transaction()?;
    let records = match format {
        DumpFormat::Sql => sql::load(&tx, &mut reader, tracker, cancel)?,
        DumpFormat::Csv => {
            delimited::load(&tx, &mut reader, &table_name_for(&request.path), tracker, cancel)?
        }
        DumpFormat::JsonLines => {
            jsonl::load(&tx, &mut reader, &table_name_for(&request.path), tracker, cancel)?
        }
    };

    // Drain anything the loader left unread so the digest covers the file.
    std::io::copy(&mut reader, &mut std::io::sink())?;
    let hashing = reader.into_inner();
    let summary = ImportSummary {
        platform: request.platform.clone(),
        format,
        source: request.path.clone(),
        records,
        bytes: hashing.bytes,
        sha256: hashing.finish(),
    };

    if config.record_imports {
        history::record(&tx, &summary)?;
    }
    tx.commit()?;
    Ok(summary)
}

/// Table name derived from the dump file's stem, restricted to `[A-Za-z0-9_]`.
fn table_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "import".to_string()
    } else {
        name
    }
}

/// Quote an SQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Reader adapter that hashes and counts everything passing through it.
struct Hashing<R> {
    inner: R,
    hasher: Sha256,
    bytes: u64,
}

impl<R: Read> Hashing<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> String {
        format!("{:x}", self.hasher.finalize())
    }
}

impl<R: Read> Read for Hashing<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }
}
