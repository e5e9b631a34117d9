//! `tracing` subscriber setup.
//!
//! The library only emits events. The CLI installs a subscriber at startup;
//! the C entry points install one only when `LOCALDISC_LOG` is set, so a host
//! application that never asks for logs gets none on its stderr.

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::consts::LOG_ENV;

static FROM_ENV: Once = Once::new();

/// Filter from `LOCALDISC_LOG`, else `default_filter`.
pub fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install a stderr subscriber. Returns `false` if one was already installed,
/// by us or by the host.
pub fn init(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(filter(default_filter))
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .is_ok()
}

/// Install a subscriber once per process, and only if `LOCALDISC_LOG` is set.
pub fn init_from_env() {
    FROM_ENV.call_once(|| {
        if std::env::var_os(LOG_ENV).is_some() {
            init("warn");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        init("local_disc=debug");
        assert!(!init("local_disc=debug"));
    }

    #[test]
    fn init_from_env_is_idempotent() {
        init_from_env();
        init_from_env();
    }
}
