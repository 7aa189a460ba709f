//! Tracing setup for processes embedding the resolver.
//!
//! The default filter lets the resolver crates through at the requested
//! level and everything else at `warn`. A set `RUST_LOG` replaces it.

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Targets of the workspace crates, as they appear in events.
pub const RESOLVER_TARGETS: [&str; 4] = ["dra_allocator", "dra_pool", "dra_selector", "dra_api"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    /// Newline-delimited JSON with event fields at the top level.
    Json,
}

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    std::iter::once("warn".to_string())
        .chain(RESOLVER_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn resolver_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber.
///
/// Only the first installation in a process takes effect; returns whether
/// this call was it.
pub fn init_tracing(format: LogFormat, level: Level) -> bool {
    let registry = tracing_subscriber::registry().with(resolver_filter(level));
    let installed = match format {
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
        LogFormat::Json => registry.with(fmt::layer().json().flatten_event(true)).try_init(),
    };
    installed.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_resolver_crates() {
        assert_eq!(
            default_directives(Level::DEBUG),
            "warn,dra_allocator=debug,dra_pool=debug,dra_selector=debug,dra_api=debug"
        );
        for directive in default_directives(Level::TRACE).split(',') {
            assert!(directive.parse::<tracing_subscriber::filter::Directive>().is_ok(), "{directive}");
        }
    }

    #[test]
    fn test_log_format_names() {
        assert_eq!(serde_json::to_string(&LogFormat::Json).unwrap(), "\"json\"");
        assert_eq!(serde_json::from_str::<LogFormat>("\"text\"").unwrap(), LogFormat::Text);
    }

    #[test]
    fn test_second_install_is_refused() {
        init_tracing(LogFormat::Text, Level::WARN);
        assert!(!init_tracing(LogFormat::Json, Level::DEBUG));
        tracing::info!("still logging");
    }
}
