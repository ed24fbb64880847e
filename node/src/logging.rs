//! # Structured Logging
//!
//! `tracing` subscriber setup for `vela-node`. Every ledger operation logs
//! through `tracing` (commits at `info`, admission decisions at `debug`,
//! aborts at `warn`); this module decides where those events go.
//!
//! Output always goes to stderr. Stdout carries the replay report and quote
//! answers and must stay valid JSON.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directives used when `RUST_LOG` is unset: ledger commits and replay
/// progress, without per-step admission chatter.
pub const DEFAULT_DIRECTIVES: &str = "vela_node=info,vela_contracts=info";

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored, multi-field lines with source locations.
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// `"json"` in any case selects JSON; anything else falls back to pretty.
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Builds the filter from a `RUST_LOG` value, falling back to `default`
/// when it is absent or unparsable.
fn filter_from(rust_log: Option<&str>, default: &str) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(default))
}

/// Installs the global subscriber. Call once, before the first ledger
/// operation; a second call panics.
///
/// ```text
/// RUST_LOG=vela_contracts=debug vela-node replay demo/script.json
/// ```
pub fn init_logging(default_directives: &str, format: LogFormat) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = filter_from(rust_log.as_deref(), default_directives);
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }

    tracing::debug!(?format, "logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_parsing_is_lenient() {
        assert_eq!(LogFormat::from_str_lossy("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_str_lossy("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str_lossy("yaml"), LogFormat::Pretty);
    }

    #[test]
    fn rust_log_overrides_the_default_directives() {
        let filter = filter_from(Some("vela_contracts=debug"), DEFAULT_DIRECTIVES);
        assert_eq!(filter.to_string().to_lowercase(), "vela_contracts=debug");

        let filter = filter_from(None, "vela_node=warn");
        assert_eq!(filter.to_string().to_lowercase(), "vela_node=warn");
    }

    #[test]
    fn unparsable_rust_log_falls_back() {
        let filter = filter_from(Some("vela_node=loud"), "vela_node=warn");
        assert_eq!(filter.to_string().to_lowercase(), "vela_node=warn");
    }
}
