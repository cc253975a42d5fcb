//! Tracing setup for the `codefix` binary.
//!
//! Logs always go to stderr; stdout carries the report. The requested level
//! applies to the pipeline's own crates, while HTTP and runtime crates stay
//! at `warn` so a verbose run is not drowned in connection chatter.
//! `CODEFIX_LOG` (or `RUST_LOG`) replaces the default directives entirely.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable checked before `RUST_LOG`.
pub const LOG_ENV: &str = "CODEFIX_LOG";

const PIPELINE_TARGETS: &[&str] = &["codefix", "codefix_core", "codefix_lint", "lint_env_manager"];

/// Filter directives used when neither log variable is set.
pub fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    std::iter::once("warn".to_string())
        .chain(PIPELINE_TARGETS.iter().map(|target| format!("{target}={level}")))
        .collect::<Vec<_>>()
        .join(",")
}

fn filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)))
}

/// Install the global subscriber. Later calls are no-ops.
///
/// JSON output flattens event fields to the top level so `event` and the
/// other lifecycle fields can be filtered on directly.
pub fn init_tracing(json: bool, level: Level) {
    let registry = tracing_subscriber::registry().with(filter(level));
    let result = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(level >= Level::DEBUG)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
