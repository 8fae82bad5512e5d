// src/planning/scenario.rs
//
// The scenario contract and the per-cycle dispatch loop. A scenario is one
// selectable planning strategy; the dispatcher owns a set of them, polls
// transferability every cycle, and falls back to the default (index 0)
// whenever nothing else applies.
//
// The dispatcher is also the retry authority: per-cycle failures inside a
// scenario are recoverable by contract, so they are counted here and the
// scenario is force-exited once the budget is exhausted.

use super::metrics::PlanningMetrics;
use super::side_pass::Stage;
use crate::tasks::TaskError;
use crate::types::TrajectoryPoint;
use crate::world::Frame;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum PlanningError {
    /// Fatal at init; the scenario must never become active.
    #[error("configuration error: {0}")]
    Config(String),
    /// A stage handler failed for this cycle.
    #[error("stage {stage:?}: {msg}")]
    Stage { stage: Stage, msg: String },
    /// A task failed for this cycle; carries the failing task's identity.
    #[error("task `{task}` failed in stage {stage:?}: {source}")]
    Task {
        stage: Stage,
        task: String,
        #[source]
        source: TaskError,
    },
}

pub trait Scenario {
    fn name(&self) -> &'static str;

    /// One-time setup: builds the task list from configuration and resets
    /// maneuver state. Malformed configuration fails here, never per cycle.
    fn init(&mut self) -> Result<(), PlanningError>;

    /// Per-cycle entry point. The frame is mutated in place to carry this
    /// cycle's outputs.
    fn process(
        &mut self,
        planning_start_point: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<(), PlanningError>;

    /// Pure query, no mutation. Polled by the dispatcher every cycle.
    fn is_transferable(
        &self,
        current: &dyn Scenario,
        ego_point: &TrajectoryPoint,
        frame: &Frame,
    ) -> bool;

    /// True once the scenario's maneuver has run to completion.
    fn is_complete(&self) -> bool {
        false
    }

    /// Discard all maneuver state; called on exit/preemption.
    fn reset(&mut self);
}

pub struct ScenarioDispatcher {
    scenarios: Vec<Box<dyn Scenario>>,
    active: usize,
    consecutive_failures: u32,
    max_consecutive_failures: u32,
    metrics: PlanningMetrics,
}

const DEFAULT_SCENARIO: usize = 0;

impl ScenarioDispatcher {
    /// The first registered scenario is the default fallback.
    pub fn new(
        scenarios: Vec<Box<dyn Scenario>>,
        max_consecutive_failures: u32,
        metrics: PlanningMetrics,
    ) -> Self {
        Self {
            scenarios,
            active: DEFAULT_SCENARIO,
            consecutive_failures: 0,
            max_consecutive_failures,
            metrics,
        }
    }

    pub fn init_all(&mut self) -> Result<(), PlanningError> {
        if self.scenarios.is_empty() {
            return Err(PlanningError::Config(
                "dispatcher needs at least a default scenario".to_string(),
            ));
        }
        for scenario in &mut self.scenarios {
            scenario.init()?;
            info!("scenario `{}` initialized", scenario.name());
        }
        Ok(())
    }

    pub fn active_name(&self) -> &'static str {
        self.scenarios[self.active].name()
    }

    pub fn run_cycle(&mut self, start: &TrajectoryPoint, frame: &mut Frame) {
        self.metrics.inc(&self.metrics.total_cycles);

        let target = self.select_target(start, frame);
        if target != self.active {
            info!(
                "scenario switch: {} → {}",
                self.scenarios[self.active].name(),
                self.scenarios[target].name()
            );
            if self.active != DEFAULT_SCENARIO {
                self.scenarios[self.active].reset();
                self.metrics.inc(&self.metrics.scenario_exits);
            }
            if target != DEFAULT_SCENARIO {
                self.metrics.inc(&self.metrics.scenario_entries);
            }
            self.active = target;
            self.consecutive_failures = 0;
        }

        match self.scenarios[self.active].process(start, frame) {
            Ok(()) => {
                self.consecutive_failures = 0;
                if self.scenarios[self.active].is_complete() {
                    info!(
                        "✅ scenario `{}` complete, back to default",
                        self.scenarios[self.active].name()
                    );
                    self.scenarios[self.active].reset();
                    self.metrics.inc(&self.metrics.scenario_exits);
                    self.active = DEFAULT_SCENARIO;
                }
            }
            Err(e) => {
                self.consecutive_failures += 1;
                warn!(
                    "cycle {} failed in `{}` ({}/{}): {e}",
                    frame.cycle,
                    self.scenarios[self.active].name(),
                    self.consecutive_failures,
                    self.max_consecutive_failures
                );
                if self.active != DEFAULT_SCENARIO
                    && self.consecutive_failures >= self.max_consecutive_failures
                {
                    warn!(
                        "❌ retry budget exhausted, force-exiting `{}`",
                        self.scenarios[self.active].name()
                    );
                    self.scenarios[self.active].reset();
                    self.metrics.inc(&self.metrics.scenario_exits);
                    self.active = DEFAULT_SCENARIO;
                    self.consecutive_failures = 0;
                }
            }
        }
    }

    fn select_target(&self, start: &TrajectoryPoint, frame: &Frame) -> usize {
        let current = self.scenarios[self.active].as_ref();
        if self.active == DEFAULT_SCENARIO {
            for (idx, scenario) in self.scenarios.iter().enumerate().skip(1) {
                if scenario.is_transferable(current, start, frame) {
                    return idx;
                }
            }
            DEFAULT_SCENARIO
        } else if current.is_transferable(current, start, frame) {
            self.active
        } else {
            // Preemption: conditions no longer justify the active scenario
            DEFAULT_SCENARIO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlannerConfig;
    use crate::planning::lane_follow::LaneFollowScenario;
    use crate::planning::metrics::PlanningMetrics;
    use crate::planning::side_pass::SidePassScenario;
    use crate::types::SlBoundary;
    use crate::world::{DecisionTag, Obstacle, ReferenceLine};

    fn dispatcher_with(
        max_failures: u32,
        metrics: PlanningMetrics,
    ) -> ScenarioDispatcher {
        let config = PlannerConfig::default();
        let scenarios: Vec<Box<dyn Scenario>> = vec![
            Box::new(LaneFollowScenario::new(config.clone())),
            Box::new(SidePassScenario::new(config, metrics.clone())),
        ];
        let mut dispatcher = ScenarioDispatcher::new(scenarios, max_failures, metrics);
        dispatcher.init_all().unwrap();
        dispatcher
    }

    fn blocking_obstacle() -> Obstacle {
        Obstacle::new_static(
            1,
            SlBoundary::new(34.8, 39.8, -1.2, 0.8),
            DecisionTag::Stop,
        )
    }

    fn make_frame(cycle: u64, obstacles: Vec<Obstacle>, junction_dist: f64) -> Frame {
        Frame::new(
            cycle,
            SlBoundary::new(0.0, 4.8, -1.05, 1.05),
            obstacles,
            ReferenceLine::straight(300.0, 1.0, 3.5, 5.0, 5.0),
            junction_dist,
        )
    }

    fn start_point() -> TrajectoryPoint {
        let mut start = TrajectoryPoint::default();
        start.path_point.s = 4.8;
        start.v = 5.0;
        start
    }

    #[test]
    fn test_enters_side_pass_on_blocking_obstacle() {
        let metrics = PlanningMetrics::new();
        let mut dispatcher = dispatcher_with(20, metrics.clone());
        assert_eq!(dispatcher.active_name(), "lane_follow");

        let mut frame = make_frame(0, vec![blocking_obstacle()], f64::MAX);
        dispatcher.run_cycle(&start_point(), &mut frame);
        assert_eq!(dispatcher.active_name(), "side_pass");
        assert_eq!(metrics.summary().scenario_entries, 1);
    }

    #[test]
    fn test_never_enters_near_intersection() {
        let mut dispatcher = dispatcher_with(20, PlanningMetrics::new());
        for cycle in 0..5 {
            let mut frame = make_frame(cycle, vec![blocking_obstacle()], 5.0);
            dispatcher.run_cycle(&start_point(), &mut frame);
            assert_eq!(
                dispatcher.active_name(),
                "lane_follow",
                "must not enter within the junction guard"
            );
        }
    }

    #[test]
    fn test_preempts_when_gate_lapses_before_commitment() {
        let mut dispatcher = dispatcher_with(20, PlanningMetrics::new());
        let mut frame = make_frame(0, vec![blocking_obstacle()], f64::MAX);
        dispatcher.run_cycle(&start_point(), &mut frame);
        assert_eq!(dispatcher.active_name(), "side_pass");

        // Obstacle drives away before the maneuver commits to anything
        let mut frame = make_frame(1, vec![], f64::MAX);
        dispatcher.run_cycle(&start_point(), &mut frame);
        assert_eq!(dispatcher.active_name(), "lane_follow");
    }

    #[test]
    fn test_retry_budget_forces_exit() {
        let metrics = PlanningMetrics::new();
        let mut dispatcher = dispatcher_with(3, metrics.clone());

        // A second hard-stop obstacle straddles the lane center inside the
        // stop fence: path validation fails every cycle
        let stray = Obstacle::new_static(
            2,
            SlBoundary::new(10.0, 12.0, 0.8, 1.9),
            DecisionTag::Stop,
        );
        for cycle in 0..3 {
            let mut frame =
                make_frame(cycle, vec![blocking_obstacle(), stray.clone()], f64::MAX);
            dispatcher.run_cycle(&start_point(), &mut frame);
        }
        assert_eq!(
            dispatcher.active_name(),
            "lane_follow",
            "budget of 3 consecutive failures must force the exit"
        );
        assert!(metrics.summary().task_failures >= 3);
        assert!(metrics.summary().scenario_exits >= 1);
    }
}
