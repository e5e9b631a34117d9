use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;

use super::ImportSummary;
use crate::consts::HISTORY_TABLE;
use crate::error::Result;

/// One row of the import history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRecord {
    pub id: i64,
    pub platform: String,
    pub format: String,
    pub source: String,
    pub sha256: String,
    pub records: i64,
    pub imported_at: String,
}

pub(crate) fn ensure_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {HISTORY_TABLE} (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            platform    TEXT NOT NULL,
            format      TEXT NOT NULL,
            source      TEXT NOT NULL,
            sha256      TEXT NOT NULL,
            records     INTEGER NOT NULL,
            imported_at TEXT NOT NULL DEFAULT (datetime('now'))
        )"
    ))?;
    Ok(())
}

pub(crate) fn record(conn: &Connection, summary: &ImportSummary) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO {HISTORY_TABLE} (platform, format, source, sha256, records)
             VALUES (?1, ?2, ?3, ?4, ?5)"
        ),
        rusqlite::params![
            summary.platform,
            summary.format.as_str(),
            summary.source.to_string_lossy().into_owned(),
            summary.sha256,
            summary.records as i64,
        ],
    )?;
    Ok(())
}

/// All recorded imports, oldest first. Empty when the table was never
/// created (read-only databases).
pub(crate) fn list(conn: &Connection) -> Result<Vec<ImportRecord>> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [HISTORY_TABLE],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    if !exists {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT id, platform, format, source, sha256, records, imported_at
         FROM {HISTORY_TABLE} ORDER BY id ASC"
    ))?;
    let records = stmt
        .query_map([], |row| {
            Ok(ImportRecord {
                id: row.get(0)?,
                platform: row.get(1)?,
                format: row.get(2)?,
                source: row.get(3)?,
                sha256: row.get(4)?,
                records: row.get(5)?,
                imported_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}
