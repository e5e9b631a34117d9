pub mod connection;
pub mod query;

use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::consts::VERSION;
use crate::error::{EngineError, Result};
use crate::import::progress::{CancelToken, ProgressSink};
use crate::import::{self, ImportRecord, ImportRequest, ImportSummary, history};

pub use connection::ConnectionTarget;
pub use query::QueryOutput;

/// An open, ready engine. Every access goes through the connection mutex,
/// so one `Engine` can be shared across threads behind an `Arc`.
pub struct Engine {
    target: ConnectionTarget,
    config: EngineConfig,
    conn: Mutex<Connection>,
    /// The import currently holding the connection, if any. Kept outside
    /// `conn` so cancellation never waits on the import itself.
    active_import: Mutex<Option<ActiveImport>>,
}

struct ActiveImport {
    cancel: CancelToken,
    /// Progress sinks run here while `conn` is held.
    thread: ThreadId,
}

impl Engine {
    /// Parse `connection`, load [`EngineConfig`] from the environment and
    /// connect.
    pub fn open(connection: &str) -> Result<Self> {
        let target: ConnectionTarget = connection.parse()?;
        Self::open_with(target, EngineConfig::load()?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::open_with(ConnectionTarget::memory(), EngineConfig::default())
    }

    /// Connect to `target`. Fails if SQLite cannot open the location or the
    /// file is not a database.
    pub fn open_with(target: ConnectionTarget, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let conn = target.open()?;

        let timeout = target.busy_timeout.unwrap_or_else(|| config.busy_timeout());
        conn.busy_timeout(timeout)
            .map_err(|e| EngineError::Connection(format!("cannot set busy timeout: {e}")))?;

        // Reads the header page, so a non-database file is rejected here
        // instead of on the first query.
        conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| EngineError::Connection(format!("{target} is not usable: {e}")))?;

        if !target.is_read_only() {
            history::ensure_table(&conn).map_err(|e| {
                EngineError::Connection(format!("cannot prepare {target}: {e}"))
            })?;
        }

        info!(connection = %target, "engine connected");
        Ok(Self {
            target,
            config,
            conn: Mutex::new(conn),
            active_import: Mutex::new(None),
        })
    }

    pub fn version() -> &'static str {
        VERSION
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Execute one SQL statement.
    pub fn execute(&self, query: &str) -> Result<QueryOutput> {
        debug!(query, "executing query");
        let conn = self.conn()?;
        query::run(&conn, query).inspect_err(|e| warn!(query, error = %e, "query failed"))
    }

    /// Import a dump file, registering a fresh token so [`Engine::cancel_import`]
    /// can stop it.
    pub fn import(
        &self,
        request: &ImportRequest,
        sink: &mut dyn ProgressSink,
    ) -> Result<ImportSummary> {
        self.import_with_token(request, sink, &CancelToken::new())
    }

    /// Import a dump file under a caller-supplied cancellation token.
    pub fn import_with_token(
        &self,
        request: &ImportRequest,
        sink: &mut dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ImportSummary> {
        let mut conn = self.conn()?;
        self.set_active_import(Some(ActiveImport {
            cancel: cancel.clone(),
            thread: thread::current().id(),
        }))?;

        info!(
            platform = %request.platform,
            path = %request.path.display(),
            "starting import"
        );
        let result = import::run(&mut conn, request, &self.config, sink, cancel);
        self.set_active_import(None)?;

        match &result {
            Ok(summary) => info!(
                records = summary.records,
                bytes = summary.bytes,
                format = summary.format.as_str(),
                "import finished"
            ),
            Err(EngineError::Cancelled) => warn!("import cancelled"),
            Err(e) => warn!(error = %e, "import failed"),
        }
        result
    }

    /// Flag the running import, if any. Returns whether one was running.
    pub fn cancel_import(&self) -> Result<bool> {
        let active = self.active_import.lock().map_err(|_| EngineError::Poisoned)?;
        match active.as_ref() {
            Some(import) => {
                import.cancel.cancel();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Every recorded import, oldest first.
    pub fn import_history(&self) -> Result<Vec<ImportRecord>> {
        let conn = self.conn()?;
        history::list(&conn)
    }

    /// Lock the connection. A progress sink calling back into the engine
    /// that is running its import gets [`EngineError::Busy`] rather than
    /// waiting on a lock its own thread holds.
    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        let reentrant = self
            .active_import
            .lock()
            .map_err(|_| EngineError::Poisoned)?
            .as_ref()
            .is_some_and(|import| import.thread == thread::current().id());
        if reentrant {
            return Err(EngineError::Busy);
        }
        self.conn.lock().map_err(|_| EngineError::Poisoned)
    }

    fn set_active_import(&self, import: Option<ActiveImport>) -> Result<()> {
        *self.active_import.lock().map_err(|_| EngineError::Poisoned)? = import;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::progress::{ImportProgress, Silent};

    #[test]
    fn in_memory_engine_answers_queries() {
        let engine = Engine::in_memory().unwrap();
        let out = engine.execute("SELECT 1 AS one").unwrap();
        assert_eq!(out.columns, vec!["one"]);
        assert_eq!(out.rows, vec![vec![serde_json::json!(1)]]);
    }

    #[test]
    fn open_creates_history_table() {
        let engine = Engine::in_memory().unwrap();
        assert!(engine.import_history().unwrap().is_empty());
    }

    #[test]
    fn open_rejects_non_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "this is certainly not a sqlite database, it is text").unwrap();
        let err = Engine::open_with(ConnectionTarget::file(&path), EngineConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Connection(_)));
    }

    #[test]
    fn open_rejects_invalid_config() {
        let config = EngineConfig {
            progress_step: 0,
            ..EngineConfig::default()
        };
        let err = Engine::open_with(ConnectionTarget::memory(), config)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn cancel_without_import_reports_false() {
        let engine = Engine::in_memory().unwrap();
        assert!(!engine.cancel_import().unwrap());
    }

    #[test]
    fn missing_dump_file_fails_import() {
        let engine = Engine::in_memory().unwrap();
        let request = ImportRequest::new("sqlite", "/definitely/not/here.sql");
        let err = engine.import(&request, &mut Silent).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }

    #[test]
    fn sink_calling_back_into_engine_gets_busy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.sql");
        std::fs::write(&path, "CREATE TABLE one (x);\nINSERT INTO one VALUES (1);\n").unwrap();
        let engine = Engine::in_memory().unwrap();

        let mut nested = Vec::new();
        let mut sink = |_: &ImportProgress| {
            nested.push(engine.execute("SELECT 1").map(|_| ()));
            nested.push(engine.import_history().map(|_| ()));
            nested.push(engine.import(&ImportRequest::new("sqlite", &path), &mut Silent).map(|_| ()));
        };
        engine.import(&ImportRequest::new("sqlite", &path), &mut sink).unwrap();

        assert!(!nested.is_empty());
        assert!(nested.iter().all(|r| matches!(r, Err(EngineError::Busy))));
        // The lock is usable again once the import returns.
        assert_eq!(engine.execute("SELECT count(*) FROM one").unwrap().rows[0][0], 1);
    }

    #[test]
    fn version_is_package_version() {
        assert_eq!(Engine::version(), env!("CARGO_PKG_VERSION"));
    }
}
