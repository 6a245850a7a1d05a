//! The Audit Sink: a bounded ring of [`AuditEntry`] with aggregate stats.

#![deny(unsafe_code)]

mod exporter;

pub use exporter::{AuditExporter, ExportError, JsonlAuditExporter};

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::warn;

use superego_core::{Action, AuditEntry};

/// Default ring capacity, overridden by `SUPEREGO_AUDIT_CAPACITY`.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Aggregate statistics over the live audit window.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuditStats {
    /// Entries currently held.
    pub total: usize,
    /// Entries whose decision was `allow`.
    pub allowed: usize,
    /// Entries whose decision was `deny`.
    pub denied: usize,
    /// `allowed / total`, or 0.0 if empty.
    pub allow_rate: f64,
    /// Mean `processing_time_ms` across the window.
    pub avg_processing_time_ms: f64,
}

struct Inner {
    capacity: usize,
    entries: VecDeque<AuditEntry>,
}

/// A non-blocking, capacity-bounded audit log. `record` never takes more
/// than the `push_back`/`pop_front` pair under lock, so it never couples
/// evaluation latency to audit storage.
pub struct AuditSink {
    inner: Mutex<Inner>,
    exporter: Option<Box<dyn AuditExporter>>,
}

impl AuditSink {
    /// Build a sink with the given ring capacity and no exporter.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(Inner { capacity, entries: VecDeque::with_capacity(capacity.min(1024)) }), exporter: None }
    }

    /// Build a sink that also mirrors every entry to `exporter`.
    #[must_use]
    pub fn with_exporter(capacity: usize, exporter: Box<dyn AuditExporter>) -> Self {
        Self {
            inner: Mutex::new(Inner { capacity, entries: VecDeque::with_capacity(capacity.min(1024)) }),
            exporter: Some(exporter),
        }
    }

    /// Record one entry, evicting the oldest if the ring is at capacity.
    pub fn record(&self, entry: AuditEntry) {
        if let Some(exporter) = &self.exporter {
            if let Err(e) = exporter.export(&entry) {
                warn!(error = %e, "audit exporter failed; in-memory ring is unaffected");
            }
        }

        let mut inner = self.inner.lock().expect("audit sink mutex poisoned");
        if inner.entries.len() >= inner.capacity {
            inner.entries.pop_front();
        }
        inner.entries.push_back(entry);
    }

    /// Return a copy of the `n` most recent entries, newest last.
    #[must_use]
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let inner = self.inner.lock().expect("audit sink mutex poisoned");
        let skip = inner.entries.len().saturating_sub(n);
        inner.entries.iter().skip(skip).cloned().collect()
    }

    /// Compute aggregate stats over the live window.
    #[must_use]
    pub fn stats(&self) -> AuditStats {
        let inner = self.inner.lock().expect("audit sink mutex poisoned");
        let total = inner.entries.len();
        if total == 0 {
            return AuditStats::default();
        }

        let mut allowed = 0usize;
        let mut denied = 0usize;
        let mut time_sum = 0u64;
        for entry in &inner.entries {
            match entry.decision.action {
                Action::Allow => allowed += 1,
                Action::Deny => denied += 1,
            }
            time_sum += entry.decision.processing_time_ms;
        }

        AuditStats {
            total,
            allowed,
            denied,
            allow_rate: allowed as f64 / total as f64,
            avg_processing_time_ms: time_sum as f64 / total as f64,
        }
    }
}
