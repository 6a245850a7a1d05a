//! The Health Monitor: aggregates the status of every long-lived
//! component into one [`HealthSnapshot`], per spec.md §4.9.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use sysinfo::{Disks, System};

use audit::AuditSink;
use policy::PolicyStore;
use resilience::{BreakerState, CircuitBreaker};

/// A component's health, worst-of-its-parts rolled up into the overall
/// [`HealthSnapshot::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Fully operational.
    Healthy,
    /// Operational but in a reduced-confidence mode (e.g. breaker probing).
    Degraded,
    /// Not serving its normal function.
    Unhealthy,
}

/// Per-component health, named the way spec.md §4.9 enumerates them.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    /// Worst of every component's status below.
    pub status: Status,
    /// Healthy unless the current snapshot has no rules (a config watcher
    /// that never saw a valid document, or a reload that always failed).
    pub policy_store: Status,
    /// Derived from the circuit breaker's state: `closed -> healthy`,
    /// `half_open -> degraded`, `open -> unhealthy`.
    pub ai_sampler: Status,
    /// Always healthy: the audit ring evicts rather than blocks.
    pub audit_sink: Status,
    /// CPU utilization, 0.0-100.0.
    pub cpu_percent: f32,
    /// Memory utilization, 0.0-100.0.
    pub memory_percent: f32,
    /// Aggregate disk utilization across every mounted disk, 0.0-100.0.
    pub disk_percent: f32,
    /// Rule count in the active policy snapshot.
    pub active_rules: usize,
    /// Consecutive failures recorded by the circuit breaker.
    pub breaker_failure_count: u64,
}

/// Reads the current state of the policy store, circuit breaker and audit
/// sink, plus host CPU/memory, on each [`HealthMonitor::snapshot`] call.
/// Cheap to clone — every field is `Arc`-wrapped except the `sysinfo`
/// handle, which needs `&mut` to refresh and so lives behind a `Mutex`.
pub struct HealthMonitor {
    store: Arc<PolicyStore>,
    breaker: Arc<CircuitBreaker>,
    audit: Arc<AuditSink>,
    system: Mutex<System>,
}

impl HealthMonitor {
    /// Build a monitor over the given components.
    #[must_use]
    pub fn new(store: Arc<PolicyStore>, breaker: Arc<CircuitBreaker>, audit: Arc<AuditSink>) -> Self {
        Self { store, breaker, audit, system: Mutex::new(System::new()) }
    }

    fn disk_percent() -> f32 {
        let disks = Disks::new_with_refreshed_list();
        let (total, available) = disks
            .iter()
            .fold((0u64, 0u64), |(total, available), disk| (total + disk.total_space(), available + disk.available_space()));
        if total == 0 {
            return 0.0;
        }
        let used = total.saturating_sub(available);
        (used as f64 / total as f64 * 100.0) as f32
    }

    /// Compute a fresh [`HealthSnapshot`].
    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        let active_rules = self.store.snapshot().rules().len();
        let policy_store = if active_rules == 0 { Status::Degraded } else { Status::Healthy };

        let ai_sampler = match self.breaker.state() {
            BreakerState::Closed => Status::Healthy,
            BreakerState::HalfOpen => Status::Degraded,
            BreakerState::Open => Status::Unhealthy,
        };

        let audit_sink = Status::Healthy;
        let _ = self.audit.stats(); // touch the sink so a future hook has somewhere to plug in

        let (cpu_percent, memory_percent) = {
            let mut system = self.system.lock().expect("health monitor mutex poisoned");
            system.refresh_cpu_usage();
            system.refresh_memory();
            let cpu = system.global_cpu_usage();
            let memory_percent = if system.total_memory() == 0 {
                0.0
            } else {
                (system.used_memory() as f64 / system.total_memory() as f64 * 100.0) as f32
            };
            (cpu, memory_percent)
        };
        let disk_percent = Self::disk_percent();

        let status = policy_store.max(ai_sampler).max(audit_sink);

        HealthSnapshot {
            status,
            policy_store,
            ai_sampler,
            audit_sink,
            cpu_percent,
            memory_percent,
            disk_percent,
            active_rules,
            breaker_failure_count: self.breaker.failure_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policy::{compile, parse_document};
    use resilience::BreakerConfig;

    fn monitor(yaml: &str) -> HealthMonitor {
        let snapshot = compile(parse_document(yaml).unwrap()).unwrap();
        let store = Arc::new(PolicyStore::new(snapshot));
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig::default()));
        let audit = Arc::new(AuditSink::new(10));
        HealthMonitor::new(store, breaker, audit)
    }

    #[test]
    fn empty_policy_store_reports_degraded() {
        let m = monitor("rules: []\n");
        let snap = m.snapshot();
        assert_eq!(snap.policy_store, Status::Degraded);
        assert_eq!(snap.status, Status::Degraded);
    }

    #[test]
    fn populated_policy_store_with_closed_breaker_is_healthy() {
        let m = monitor("rules:\n  - id: r1\n    priority: 1\n    conditions:\n      tool_name: rm\n    action: deny\n");
        let snap = m.snapshot();
        assert_eq!(snap.policy_store, Status::Healthy);
        assert_eq!(snap.ai_sampler, Status::Healthy);
        assert_eq!(snap.status, Status::Healthy);
        assert_eq!(snap.active_rules, 1);
        assert!(snap.disk_percent >= 0.0 && snap.disk_percent <= 100.0);
    }

    #[tokio::test]
    async fn open_breaker_reports_unhealthy_overall() {
        let snapshot = compile(parse_document("rules:\n  - id: r1\n    priority: 1\n    conditions:\n      tool_name: rm\n    action: deny\n").unwrap()).unwrap();
        let store = Arc::new(PolicyStore::new(snapshot));
        let breaker = Arc::new(CircuitBreaker::new(BreakerConfig {
            failure_threshold: 1,
            recovery_timeout: std::time::Duration::from_secs(60),
            operation_timeout: std::time::Duration::from_secs(1),
        }));
        let _ = breaker.call(|| async { Err::<(), &str>("boom") }).await;

        let audit = Arc::new(AuditSink::new(10));
        let monitor = HealthMonitor::new(store, breaker, audit);
        let snap = monitor.snapshot();
        assert_eq!(snap.ai_sampler, Status::Unhealthy);
        assert_eq!(snap.status, Status::Unhealthy);
    }
}
