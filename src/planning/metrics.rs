// src/planning/metrics.rs
//
// Planner observability. Shared atomic counters; clone handles freely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PlanningMetrics {
    pub total_cycles: Arc<AtomicU64>,
    pub stage_transitions: Arc<AtomicU64>,
    pub scenario_entries: Arc<AtomicU64>,
    pub scenario_exits: Arc<AtomicU64>,
    pub aborts: Arc<AtomicU64>,
    pub task_failures: Arc<AtomicU64>,
    pub maneuvers_completed: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl PlanningMetrics {
    pub fn new() -> Self {
        Self {
            total_cycles: Arc::new(AtomicU64::new(0)),
            stage_transitions: Arc::new(AtomicU64::new(0)),
            scenario_entries: Arc::new(AtomicU64::new(0)),
            scenario_exits: Arc::new(AtomicU64::new(0)),
            aborts: Arc::new(AtomicU64::new(0)),
            task_failures: Arc::new(AtomicU64::new(0)),
            maneuvers_completed: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_cycles: self.total_cycles.load(Ordering::Relaxed),
            stage_transitions: self.stage_transitions.load(Ordering::Relaxed),
            scenario_entries: self.scenario_entries.load(Ordering::Relaxed),
            scenario_exits: self.scenario_exits.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
            maneuvers_completed: self.maneuvers_completed.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PlanningMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_cycles: u64,
    pub stage_transitions: u64,
    pub scenario_entries: u64,
    pub scenario_exits: u64,
    pub aborts: u64,
    pub task_failures: u64,
    pub maneuvers_completed: u64,
    pub elapsed_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_counters() {
        let metrics = PlanningMetrics::new();
        let handle = metrics.clone();
        handle.inc(&handle.total_cycles);
        handle.inc(&handle.total_cycles);
        metrics.inc(&metrics.aborts);
        let summary = metrics.summary();
        assert_eq!(summary.total_cycles, 2);
        assert_eq!(summary.aborts, 1);
    }
}
