//! Structured logging and the [`HealthMonitor`] the facade exposes for
//! operational visibility, per spec.md §4.9.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod health;

pub use health::{HealthMonitor, HealthSnapshot, Status};

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Initialize JSON-formatted structured logging, filtered by `RUST_LOG`
/// (e.g. `"info,decision_engine=debug"`). Idempotent: a second call is a
/// harmless no-op if a global subscriber is already installed.
pub fn init_json_logging() {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}
