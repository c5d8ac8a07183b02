// ============================================================================
// METRICS REPORTER
// ============================================================================
// On-demand snapshot of host load plus gate and tracker state. CPU usage is
// the delta since the previous snapshot (the first one reads 0). Nothing here
// waits on the admission gate.
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sysinfo::System as SysInfoSystem;

use crate::activity::ActivityTracker;
use crate::gate::AdmissionGate;

/// Flat view returned by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Host CPU utilisation, percent
    pub cpu: f64,
    /// Host memory utilisation, percent
    pub memory: f64,
    /// Every caller seen since startup
    pub active_users: Vec<String>,
    /// Current admission capacity
    pub concurrency_limit: u32,
    /// Threads in this process
    pub running_tasks: usize,
}

pub struct MetricsReporter {
    system: Mutex<SysInfoSystem>,
    gate: AdmissionGate,
    tracker: Arc<ActivityTracker>,
}

impl MetricsReporter {
    pub fn new(gate: AdmissionGate, tracker: Arc<ActivityTracker>) -> Self {
        let mut system = SysInfoSystem::new();
        // Baseline for the first CPU delta.
        system.refresh_cpu();
        Self {
            system: Mutex::new(system),
            gate,
            tracker,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let (cpu, memory) = {
            let mut system = self.system.lock();
            system.refresh_cpu();
            system.refresh_memory();
            (
                f64::from(system.global_cpu_info().cpu_usage()),
                memory_percent(system.used_memory(), system.total_memory()),
            )
        };

        MetricsSnapshot {
            cpu,
            memory,
            active_users: self
                .tracker
                .known_callers()
                .into_iter()
                .map(|c| c.to_string())
                .collect(),
            concurrency_limit: self.gate.capacity(),
            running_tasks: process_thread_count(),
        }
    }
}

impl fmt::Debug for MetricsReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsReporter")
            .field("gate", &self.gate)
            .field("tracked_callers", &self.tracker.len())
            .finish()
    }
}

fn memory_percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (used as f64 / total as f64) * 100.0
}

// ----------------------------------------------------------------------------
// Thread Count
// ----------------------------------------------------------------------------

/// Threads in this process: /proc on Linux, runtime workers elsewhere.
pub fn process_thread_count() -> usize {
    proc_thread_count()
        .or_else(|| {
            tokio::runtime::Handle::try_current()
                .ok()
                .map(|handle| handle.metrics().num_workers())
        })
        .unwrap_or(1)
}

#[cfg(target_os = "linux")]
fn proc_thread_count() -> Option<usize> {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_status_threads(&status))
}

#[cfg(not(target_os = "linux"))]
fn proc_thread_count() -> Option<usize> {
    None
}

/// Pull the `Threads:` field out of /proc/<pid>/status.
fn parse_status_threads(status: &str) -> Option<usize> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Threads:"))
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::CallerId;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_status_threads() {
        let status = "Name:\taaw-host\nState:\tS (sleeping)\nThreads:\t17\nVmRSS:\t1024 kB\n";
        assert_eq!(parse_status_threads(status), Some(17));
        assert_eq!(parse_status_threads("Name:\tx\n"), None);
    }

    #[test]
    fn test_memory_percent() {
        assert_eq!(memory_percent(0, 0), 0.0);
        assert_eq!(memory_percent(512, 2048), 25.0);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_gate_and_tracker() {
        let gate = AdmissionGate::new(1);
        let tracker = Arc::new(ActivityTracker::new());
        let reporter = MetricsReporter::new(gate.clone(), tracker.clone());

        tracker.touch(&CallerId::from("demo-key"));
        gate.resize(3);

        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.concurrency_limit, 3);
        assert_eq!(snapshot.active_users, vec!["demo-key".to_string()]);
        assert!(snapshot.running_tasks >= 1);
        assert!((0.0..=100.0).contains(&snapshot.memory));
        assert!(snapshot.cpu >= 0.0);
    }

    #[tokio::test]
    async fn test_snapshot_does_not_wait_on_saturated_gate() {
        let gate = AdmissionGate::new(1);
        let _held = gate.acquire().await.unwrap();
        let reporter = MetricsReporter::new(gate.clone(), Arc::new(ActivityTracker::new()));

        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.concurrency_limit, 1);
        assert!(snapshot.active_users.is_empty());
    }
}
