//! Startup banner and session summary display.

use crate::consts::{AUTHOR, HOMEPAGE, REPO, format_number};

/// Session configuration for display in the startup banner.
pub struct BannerInfo<'a> {
    pub connection: &'a str,
    pub access: &'a str,
    pub progress_step: u8,
    pub imports: usize,
}

/// Counters accumulated over one interactive session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub queries: u64,
    pub failed_queries: u64,
    pub imported_records: u64,
}

impl SessionStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Print the startup banner with session info.
pub fn print_banner(info: &BannerInfo) {
    println!(
        r#"
   ╔═══════════════════════════════════════╗
   ║          L O C A L   D I S C          ║
   ║     dumps in, answers out, offline    ║
   ╚═══════════════════════════════════════╝

   version   {}
   by        {}
   home      {}
   repo      {}
   database  {} ({})
   progress  every {}%
   history   {} import(s)

   SQL runs as typed. `.import <platform> <file>`, `.history`, `quit`.
"#,
        env!("CARGO_PKG_VERSION"),
        AUTHOR,
        HOMEPAGE,
        REPO,
        info.connection,
        info.access,
        info.progress_step,
        format_number(info.imports as u64),
    );
}

/// Print the session summary (query and import counters + farewell).
pub fn print_session_summary(stats: SessionStats) {
    if !stats.is_empty() {
        println!(
            "session: {:>6} queries ({} failed), {:>6} records imported",
            format_number(stats.queries),
            format_number(stats.failed_queries),
            format_number(stats.imported_records),
        );
    }
    println!("goodbye.");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn print_banner_does_not_panic() {
        let info = BannerInfo {
            connection: "in-memory database",
            access: "read-write",
            progress_step: 10,
            imports: 0,
        };
        print_banner(&info);
    }

    #[test]
    fn print_session_summary_with_activity() {
        print_session_summary(SessionStats {
            queries: 12,
            failed_queries: 1,
            imported_records: 1_500,
        });
    }

    #[test]
    fn empty_stats_are_detected() {
        assert!(SessionStats::default().is_empty());
        assert!(
            !SessionStats {
                queries: 1,
                ..Default::default()
            }
            .is_empty()
        );
    }
}
