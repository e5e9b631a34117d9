//! Connection string parsing and opening.
//!
//! Accepted forms:
//!
//! * `:memory:` / `sqlite::memory:` for a private in-memory database
//! * `sqlite://<path>` or a plain filesystem path
//! * `file:<uri>` passed to SQLite as a URI filename
//! * libpq-style `key=value` pairs, e.g. `host=localhost dbname=/tmp/app.db mode=rw`

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};

use crate::error::{EngineError, Result};

/// Hosts the embedded engine can serve. Anything else is a remote server.
const LOCAL_HOSTS: &[&str] = &["", "localhost", "127.0.0.1", "::1"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    Memory,
    File(PathBuf),
    Uri(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccessMode {
    /// Open read-write, creating the file if missing.
    #[default]
    ReadWriteCreate,
    /// Open read-write; the file must exist.
    ReadWrite,
    ReadOnly,
}

impl AccessMode {
    fn flags(self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        match self {
            Self::ReadWriteCreate => {
                base | OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
            }
            Self::ReadWrite => base | OpenFlags::SQLITE_OPEN_READ_WRITE,
            Self::ReadOnly => base | OpenFlags::SQLITE_OPEN_READ_ONLY,
        }
    }
}

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub location: Location,
    pub mode: AccessMode,
    /// Overrides the configured busy timeout when set.
    pub busy_timeout: Option<Duration>,
}

impl ConnectionTarget {
    pub fn memory() -> Self {
        Self {
            location: Location::Memory,
            mode: AccessMode::default(),
            busy_timeout: None,
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            location: Location::File(path.into()),
            mode: AccessMode::default(),
            busy_timeout: None,
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.mode == AccessMode::ReadOnly
    }

    /// Open the underlying SQLite connection. This is the real connection
    /// attempt: missing files in `rw`/`ro` mode and unreadable paths fail here.
    pub fn open(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::Memory => Connection::open_in_memory(),
            Location::File(path) => Connection::open_with_flags(path, self.mode.flags()),
            Location::Uri(uri) => Connection::open_with_flags(uri, self.mode.flags()),
        };
        conn.map_err(|e| EngineError::Connection(format!("cannot open {self}: {e}")))
    }

    fn parse_pairs(s: &str) -> Result<Self> {
        let mut target = Self::memory();
        let mut path: Option<PathBuf> = None;
        let mut force_memory = false;

        for pair in s.split_whitespace() {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| EngineError::InvalidArgument(format!("expected key=value, got `{pair}`")))?;
            let value = value.trim_matches('\'');
            match key {
                "host" => {
                    if !LOCAL_HOSTS.contains(&value) && !value.starts_with('/') {
                        return Err(EngineError::Connection(format!(
                            "remote host `{value}` is not reachable by the embedded engine"
                        )));
                    }
                }
                "dbname" | "path" => path = Some(PathBuf::from(value)),
                "mode" => match value {
                    "rwc" => target.mode = AccessMode::ReadWriteCreate,
                    "rw" => target.mode = AccessMode::ReadWrite,
                    "ro" => target.mode = AccessMode::ReadOnly,
                    "memory" => force_memory = true,
                    other => {
                        return Err(EngineError::InvalidArgument(format!(
                            "unknown mode `{other}` (expected rwc, rw, ro or memory)"
                        )));
                    }
                },
                "busy_timeout" => {
                    let ms: u64 = value.parse().map_err(|_| {
                        EngineError::InvalidArgument(format!(
                            "busy_timeout must be milliseconds, got `{value}`"
                        ))
                    })?;
                    target.busy_timeout = Some(Duration::from_millis(ms));
                }
                other => {
                    return Err(EngineError::InvalidArgument(format!(
                        "unknown connection parameter `{other}`"
                    )));
                }
            }
        }

        if let Some(path) = path
            && !force_memory
            && path.as_os_str() != ":memory:"
        {
            target.location = Location::File(path);
        }
        Ok(target)
    }
}

impl FromStr for ConnectionTarget {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(EngineError::InvalidArgument(
                "connection string is empty".to_string(),
            ));
        }
        if s == ":memory:" || s == "sqlite::memory:" {
            return Ok(Self::memory());
        }
        if let Some(rest) = s.strip_prefix("sqlite://") {
            return Ok(match rest {
                "" | ":memory:" => Self::memory(),
                path => Self::file(path),
            });
        }
        if s.starts_with("file:") {
            return Ok(Self {
                location: Location::Uri(s.to_string()),
                mode: uri_mode(s),
                busy_timeout: None,
            });
        }
        if s.split_whitespace().all(|token| token.contains('=')) {
            return Self::parse_pairs(s);
        }
        Ok(Self::file(s))
    }
}

/// The access mode a `file:` URI asks for with its `mode=` parameter.
/// SQLite itself rejects unknown values when opening.
fn uri_mode(uri: &str) -> AccessMode {
    let query = uri.split_once('?').map_or("", |(_, query)| query);
    let query = query.split_once('#').map_or(query, |(query, _)| query);
    query
        .split('&')
        .filter_map(|param| param.split_once('='))
        .filter(|(key, _)| *key == "mode")
        .map(|(_, value)| match value {
            "ro" => AccessMode::ReadOnly,
            "rw" => AccessMode::ReadWrite,
            _ => AccessMode::ReadWriteCreate,
        })
        .last()
        .unwrap_or_default()
}

impl fmt::Display for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Location::Memory => write!(f, "in-memory database"),
            Location::File(path) => write!(f, "{}", path.display()),
            Location::Uri(uri) => write!(f, "{uri}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<ConnectionTarget> {
        s.parse()
    }

    #[test]
    fn memory_forms() {
        assert_eq!(parse(":memory:").unwrap().location, Location::Memory);
        assert_eq!(parse("sqlite::memory:").unwrap().location, Location::Memory);
        assert_eq!(parse("sqlite://").unwrap().location, Location::Memory);
    }

    #[test]
    fn plain_path_and_sqlite_scheme() {
        assert_eq!(
            parse("/var/lib/app.db").unwrap().location,
            Location::File(PathBuf::from("/var/lib/app.db"))
        );
        assert_eq!(
            parse("sqlite:///tmp/x.db").unwrap().location,
            Location::File(PathBuf::from("/tmp/x.db"))
        );
    }

    #[test]
    fn uri_is_kept_verbatim() {
        let target = parse("file:shared?mode=memory&cache=shared").unwrap();
        assert_eq!(
            target.location,
            Location::Uri("file:shared?mode=memory&cache=shared".to_string())
        );
    }

    #[test]
    fn uri_mode_parameter_sets_access() {
        assert!(parse("file:/tmp/a.db?mode=ro").unwrap().is_read_only());
        assert!(parse("file:/tmp/a.db?cache=shared&mode=ro#frag").unwrap().is_read_only());
        assert_eq!(parse("file:/tmp/a.db?mode=rw").unwrap().mode, AccessMode::ReadWrite);
        assert_eq!(parse("file:/tmp/a.db").unwrap().mode, AccessMode::ReadWriteCreate);
        assert!(!parse("file:/tmp/mode=ro.db").unwrap().is_read_only());
    }

    #[test]
    fn empty_is_invalid() {
        assert!(matches!(parse("   "), Err(EngineError::InvalidArgument(_))));
    }

    #[test]
    fn localhost_without_dbname_is_memory() {
        let target = parse("host=localhost").unwrap();
        assert_eq!(target.location, Location::Memory);
        assert_eq!(target.mode, AccessMode::ReadWriteCreate);
    }

    #[test]
    fn pairs_set_path_mode_and_timeout() {
        let target = parse("host=127.0.0.1 dbname=/tmp/a.db mode=ro busy_timeout=250").unwrap();
        assert_eq!(target.location, Location::File(PathBuf::from("/tmp/a.db")));
        assert!(target.is_read_only());
        assert_eq!(target.busy_timeout, Some(Duration::from_millis(250)));
    }

    #[test]
    fn mode_memory_wins_over_dbname() {
        let target = parse("dbname=/tmp/a.db mode=memory").unwrap();
        assert_eq!(target.location, Location::Memory);
    }

    #[test]
    fn remote_host_is_refused() {
        let err = parse("host=db.example.com dbname=prod").unwrap_err();
        assert!(matches!(err, EngineError::Connection(_)));
    }

    #[test]
    fn unknown_key_is_invalid() {
        let err = parse("host=localhost sslmode=require").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn bad_timeout_is_invalid() {
        let err = parse("busy_timeout=soon").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn open_memory_succeeds() {
        let conn = ConnectionTarget::memory().open().unwrap();
        let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).unwrap();
        assert_eq!(one, 1);
    }

    #[test]
    fn open_missing_file_read_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut target = ConnectionTarget::file(dir.path().join("missing.db"));
        target.mode = AccessMode::ReadWrite;
        assert!(matches!(target.open(), Err(EngineError::Connection(_))));
    }

    #[test]
    fn display_describes_location() {
        assert_eq!(ConnectionTarget::memory().to_string(), "in-memory database");
        assert_eq!(ConnectionTarget::file("/tmp/x.db").to_string(), "/tmp/x.db");
    }
}
