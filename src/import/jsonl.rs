//! JSON-lines dumps: one object per line, keys become columns.

use std::collections::HashSet;
use std::io::BufRead;

use rusqlite::Connection;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use super::progress::{CancelToken, Tracker};
use super::quote_ident;
use crate::error::{EngineError, Result};

/// Columns of `table` as currently defined, or `None` when it does not exist.
fn existing_columns(conn: &Connection, table: &str) -> Result<Option<HashSet<String>>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<std::result::Result<HashSet<_>, _>>()?;
    Ok(if columns.is_empty() { None } else { Some(columns) })
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map_or(SqlValue::Null, SqlValue::Real),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}

/// Insert every object in `reader` into `table`. New keys add columns.
/// Returns the number of rows inserted.
pub(crate) fn load(
    conn: &Connection,
    mut reader: impl BufRead,
    table: &str,
    tracker: &mut Tracker<'_>,
    cancel: &CancelToken,
) -> Result<u64> {
    let quoted_table = quote_ident(table);
    let mut known = existing_columns(conn, table)?;
    let mut line = String::new();
    let mut line_no = 0;
    let mut consumed = 0u64;
    let mut inserted = 0u64;

    loop {
        line.clear();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break;
        }
        consumed += n as u64;
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let malformed = |reason: String| EngineError::MalformedDump {
            line: line_no,
            reason,
        };
        let object: Map<String, Value> = match serde_json::from_str(&line) {
            Ok(Value::Object(object)) => object,
            Ok(_) => return Err(malformed("expected a JSON object".to_string())),
            Err(e) => return Err(malformed(e.to_string())),
        };

        match known.as_mut() {
            None => {
                if object.is_empty() {
                    return Err(malformed(
                        "first record has no fields to define the table".to_string(),
                    ));
                }
                let columns: Vec<String> = object.keys().map(|k| quote_ident(k)).collect();
                conn.execute_batch(&format!(
                    "CREATE TABLE {quoted_table} ({})",
                    columns.join(", ")
                ))?;
                known = Some(object.keys().cloned().collect());
            }
            Some(columns) => {
                for key in object.keys() {
                    if columns.insert(key.clone()) {
                        conn.execute_batch(&format!(
                            "ALTER TABLE {quoted_table} ADD COLUMN {}",
                            quote_ident(key)
                        ))?;
                    }
                }
            }
        }

        if object.is_empty() {
            conn.execute(&format!("INSERT INTO {quoted_table} DEFAULT VALUES"), [])?;
        } else {
            let columns: Vec<String> = object.keys().map(|k| quote_ident(k)).collect();
            let placeholders: Vec<String> =
                (1..=columns.len()).map(|i| format!("?{i}")).collect();
            let mut insert = conn.prepare_cached(&format!(
                "INSERT INTO {quoted_table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            ))?;
            insert
                .execute(rusqlite::params_from_iter(object.values().map(to_sql)))
                .map_err(|e| malformed(e.to_string()))?;
        }
        inserted += 1;
        tracker.advance(consumed, inserted);
    }
    Ok(inserted)
}
