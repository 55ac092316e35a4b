//! Tracing subscriber setup
//!
//! Every chain syncer runs inside a `chain_syncer` span carrying the chain
//! name and network, so file and stdout lines from concurrent chains can be
//! told apart without each call site repeating those fields.

use crate::config::AppConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Dependencies that log every statement or connection at info
const QUIET_TARGETS: &[&str] = &["sqlx", "hyper", "reqwest"];

/// `log_level` followed by a `warn` cap for chatty dependencies
fn filter_directive(log_level: &str) -> String {
    let mut directive = log_level.to_string();
    for target in QUIET_TARGETS {
        directive.push_str(&format!(",{}=warn", target));
    }
    directive
}

/// Unknown values keep a single file
fn rotation(name: &str) -> Rotation {
    match name {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// Install the global subscriber; keep the guard alive until exit so the
/// file writer flushes.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let file_appender = RollingFileAppender::new(
        rotation(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(&config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        let file_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        registry.with(file_layer).init();
    } else {
        let file_layer = fmt::layer()
            .with_target(false)
            .with_writer(non_blocking)
            .with_ansi(false);
        let stdout_layer = fmt::layer().with_target(false).with_ansi(true);
        registry.with(file_layer).with(stdout_layer).init();
    }

    guard
}
