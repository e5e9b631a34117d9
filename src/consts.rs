//! Project-wide constants.

use std::path::PathBuf;

pub const AUTHOR: &str = env!("CARGO_PKG_AUTHORS");
pub const HOMEPAGE: &str = env!("CARGO_PKG_HOMEPAGE");
pub const REPO: &str = env!("CARGO_PKG_REPOSITORY");

/// Engine version reported across the C boundary.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable prefix for [`EngineConfig`](crate::config::EngineConfig).
pub const ENV_PREFIX: &str = "LOCALDISC";

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "LOCALDISC_LOG";

/// Table that records every finished import.
pub const HISTORY_TABLE: &str = "_localdisc_imports";

/// Default database path: `~/.localdisc/localdisc.db`.
pub fn default_db_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".localdisc").join("localdisc.db"))
}

/// Format a number with comma separators (e.g. 1,234,567).
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(c);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consts_are_non_empty() {
        assert!(!AUTHOR.is_empty());
        assert!(!HOMEPAGE.is_empty());
        assert!(!REPO.is_empty());
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn version_matches_cargo_toml() {
        assert_eq!(VERSION, "0.1.0-alpha");
    }

    #[test]
    fn default_db_path_ends_with_file_name() {
        if let Some(path) = default_db_path() {
            assert!(path.ends_with(".localdisc/localdisc.db"));
        }
    }

    #[test]
    fn format_number_small() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(42), "42");
        assert_eq!(format_number(999), "999");
    }

    #[test]
    fn format_number_thousands() {
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(12_345), "12,345");
        assert_eq!(format_number(123_456), "123,456");
    }

    #[test]
    fn format_number_millions() {
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
