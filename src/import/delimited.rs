//! CSV dumps: header row first, one table per file.

use std::io::Read;

use rusqlite::Connection;
use rusqlite::types::Value;

use super::progress::{CancelToken, Tracker};
use super::quote_ident;
use crate::error::{EngineError, Result};

/// Insert every row of `reader` into `table`, creating it from the header
/// when missing. Returns the number of rows inserted.
pub(crate) fn load(
    conn: &Connection,
    reader: impl Read,
    table: &str,
    tracker: &mut Tracker<'_>,
    cancel: &CancelToken,
) -> Result<u64> {
    let mut rows = ::csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let columns: Vec<String> = rows
        .headers()
        .map_err(malformed)?
        .iter()
        .enumerate()
        .map(|(i, name)| match name.trim() {
            "" => format!("column_{}", i + 1),
            name => name.to_string(),
        })
        .collect();
    if columns.is_empty() {
        return Ok(0);
    }

    let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        quote_ident(table),
        quoted.join(", ")
    ))?;

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let mut insert = conn.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        quoted.join(", "),
        placeholders.join(", ")
    ))?;

    let mut record = ::csv::StringRecord::new();
    let mut inserted = 0u64;
    while rows.read_record(&mut record).map_err(malformed)? {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        insert
            .execute(rusqlite::params_from_iter(record.iter().map(infer)))
            .map_err(|e| EngineError::MalformedDump {
                line: record.position().map_or(0, |p| p.line() as usize),
                reason: e.to_string(),
            })?;
        inserted += 1;
        tracker.advance(rows.position().byte(), inserted);
    }
    Ok(inserted)
}

/// Integers and floats become numbers, empty cells NULL, the rest text.
fn infer(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = cell.parse::<f64>()
        && f.is_finite()
    {
        return Value::Real(f);
    }
    Value::Text(cell.to_string())
}

fn malformed(err: ::csv::Error) -> EngineError {
    match err.position() {
        Some(pos) => EngineError::MalformedDump {
            line: pos.line() as usize,
            reason: err.to_string(),
        },
        None => EngineError::Csv(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::progress::{ImportProgress, ProgressSink};

    fn load_str(conn: &Connection, text: &str) -> (Result<u64>, Vec<ImportProgress>) {
        let mut seen = Vec::new();
        let mut sink = |p: &ImportProgress| seen.push(p.clone());
        let result = {
            let sink: &mut dyn ProgressSink = &mut sink;
            let mut tracker = Tracker::new(sink, text.len() as u64, 10);
            load(conn, text.as_bytes(), "people", &mut tracker, &CancelToken::new())
        };
        (result, seen)
    }

    #[test]
    fn infers_cell_types() {
        assert_eq!(infer(""), Value::Null);
        assert_eq!(infer("42"), Value::Integer(42));
        assert_eq!(infer("-3.5"), Value::Real(-3.5));
        assert_eq!(infer("NaN"), Value::Text("NaN".to_string()));
        assert_eq!(infer("ada"), Value::Text("ada".to_string()));
    }

    #[test]
    fn creates_table_and_inserts_rows() {
        let conn = Connection::open_in_memory().unwrap();
        let (result, seen) = load_str(&conn, "name,age\nada,36\ngrace,\n");
        assert_eq!(result.unwrap(), 2);
        assert!(!seen.is_empty());

        let (name, age): (String, Option<i64>) = conn
            .query_row(
                "SELECT name, age FROM people WHERE name = 'grace'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(name, "grace");
        assert_eq!(age, None);
    }

    #[test]
    fn blank_headers_get_positional_names() {
        let conn = Connection::open_in_memory().unwrap();
        let (result, _) = load_str(&conn, "id,\n1,x\n");
        assert_eq!(result.unwrap(), 1);
        let v: String = conn
            .query_row("SELECT column_2 FROM people", [], |row| row.get(0))
            .unwrap();
        assert_eq!(v, "x");
    }

    #[test]
    fn ragged_row_is_malformed_with_line() {
        let conn = Connection::open_in_memory().unwrap();
        let (result, _) = load_str(&conn, "a,b\n1,2\n3\n");
        assert!(matches!(
            result,
            Err(EngineError::MalformedDump { line: 3, .. })
        ));
    }

    #[test]
    fn cancelled_token_stops_before_first_row() {
        let conn = Connection::open_in_memory().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut sink = |_: &ImportProgress| {};
        let mut tracker = Tracker::new(&mut sink, 10, 10);
        let result = load(&conn, "a\n1\n".as_bytes(), "t", &mut tracker, &cancel);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
