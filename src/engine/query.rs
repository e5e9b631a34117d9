use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// The outcome of one executed statement.
///
/// Serialized as the JSON text handed across the C boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOutput {
    pub query: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    /// Rows changed by a statement that returns no columns. Zero for reads.
    pub rows_affected: usize,
}

impl QueryOutput {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Tab-separated rendering for terminals, header first.
    pub fn render_table(&self) -> String {
        if self.columns.is_empty() {
            return format!("{} row(s) affected", self.rows_affected);
        }
        let mut out = self.columns.join("\t");
        for row in &self.rows {
            out.push('\n');
            let cells: Vec<String> = row.iter().map(render_cell).collect();
            out.push_str(&cells.join("\t"));
        }
        out
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Run a single statement on `conn`.
pub(crate) fn run(conn: &Connection, query: &str) -> Result<QueryOutput> {
    if query.trim().is_empty() {
        return Err(EngineError::InvalidArgument("query is empty".to_string()));
    }

    let mut stmt = conn.prepare(query)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    if columns.is_empty() {
        let rows_affected = stmt.execute([])?;
        return Ok(QueryOutput {
            query: query.to_string(),
            columns,
            rows: Vec::new(),
            rows_affected,
        });
    }

    let width = columns.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut cells = Vec::with_capacity(width);
        for i in 0..width {
            cells.push(to_json(row.get_ref(i)?));
        }
        rows.push(cells);
    }

    Ok(QueryOutput {
        query: query.to_string(),
        columns,
        rows,
        rows_affected: 0,
    })
}

fn to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}
