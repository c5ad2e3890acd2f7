//! Structured log initialization (spec §2 "Logger"). JSON output with an
//! env-filter driven level, so every log line carries the request's
//! `tenant_id`/`user_id`/`correlation_id` fields attached via
//! [`crate::context::ModuleCtx`]'s `RequestContext::span`.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::bootstrap::config::AppConfig;

/// Installs the global `tracing` subscriber. Call once, at process start,
/// before any other module logs.
///
/// # Errors
/// Returns an error if a subscriber is already installed.
pub fn init_logging(config: &AppConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json().with_target(true).with_current_span(true))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
