// src/planning/side_pass.rs
//
// The side-pass maneuver: approach a blocking obstacle, generate a bypass
// path, stop at the wait point, wait for a clear pass window, pass.
//
// Maneuver state persists across planning cycles (~100ms each); every
// Process call runs exactly one stage handler and applies the transition
// function at the cycle boundary. Abort never moves forward: early stages
// exit the scenario, later stages fall back to the last safe commitment
// point.

use super::metrics::PlanningMetrics;
use super::predicates::{self, GateParams};
use super::scenario::{PlanningError, Scenario};
use crate::config::PlannerConfig;
use crate::tasks::{self, Task, TaskError};
use crate::types::{PathData, TrajectoryPoint};
use crate::world::Frame;
use tracing::{debug, info, warn};

// ============================================================================
// STAGES & TRANSITIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Unknown,
    ObstacleApproach,
    PathGeneration,
    WaitpointStop,
    SafetyDetection,
    ObstaclePass,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::ObstacleApproach => "OBSTACLE_APPROACH",
            Self::PathGeneration => "PATH_GENERATION",
            Self::WaitpointStop => "WAITPOINT_STOP",
            Self::SafetyDetection => "SAFETY_DETECTION",
            Self::ObstaclePass => "OBSTACLE_PASS",
        }
    }

    /// Configuration name → stage. `Unknown` is a sentinel and has no name.
    pub fn from_conf_name(name: &str) -> Option<Stage> {
        match name {
            "obstacle_approach" => Some(Self::ObstacleApproach),
            "path_generation" => Some(Self::PathGeneration),
            "waitpoint_stop" => Some(Self::WaitpointStop),
            "safety_detection" => Some(Self::SafetyDetection),
            "obstacle_pass" => Some(Self::ObstaclePass),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSignal {
    Complete,
    Continue,
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageAdvance {
    /// Stay in the scenario, at this stage next cycle.
    To(Stage),
    /// Leave the scenario; maneuver state is discarded.
    Exit,
    /// Maneuver ran to completion.
    Done,
}

/// Pure transition table. Abort never advances: before any commitment it
/// exits, afterwards it steps back to the last safe commitment point.
pub fn next_stage(stage: Stage, signal: StageSignal) -> StageAdvance {
    use Stage::*;
    use StageAdvance::*;
    use StageSignal::*;
    match (stage, signal) {
        (ObstacleApproach, Complete) => To(PathGeneration),
        (ObstacleApproach, Continue) => To(ObstacleApproach),
        (ObstacleApproach, Abort) => Exit,
        (PathGeneration, Complete) => To(WaitpointStop),
        (PathGeneration, Continue) => To(PathGeneration),
        (PathGeneration, Abort) => Exit,
        (WaitpointStop, Complete) => To(SafetyDetection),
        (WaitpointStop, Continue) => To(WaitpointStop),
        (WaitpointStop, Abort) => Exit,
        (SafetyDetection, Complete) => To(ObstaclePass),
        (SafetyDetection, Continue) => To(SafetyDetection),
        (SafetyDetection, Abort) => To(WaitpointStop),
        (ObstaclePass, Complete) => Done,
        (ObstaclePass, Continue) => To(ObstaclePass),
        (ObstaclePass, Abort) => To(PathGeneration),
        (Unknown, _) => Exit,
    }
}

// ============================================================================
// MANEUVER STATE
// ============================================================================

/// Everything that survives across cycles for one maneuver instance.
/// Created on scenario entry, mutated only inside Process, discarded on
/// exit.
#[derive(Debug)]
struct ManeuverState {
    stage: Stage,
    stage_initialized: bool,
    cycles_in_stage: u64,
    /// Set exactly once, during PathGeneration; never recomputed.
    wait_point_s: Option<f64>,
    /// The committed bypass path; immutable once ObstaclePass begins.
    committed_path: Option<PathData>,
    target_obstacle_id: Option<u32>,
    /// Whether the pass window has been observed open this maneuver.
    window_seen_open: bool,
    safety_clear_streak: u32,
}

impl ManeuverState {
    fn new() -> Self {
        Self {
            stage: Stage::ObstacleApproach,
            stage_initialized: false,
            cycles_in_stage: 0,
            wait_point_s: None,
            committed_path: None,
            target_obstacle_id: None,
            window_seen_open: false,
            safety_clear_streak: 0,
        }
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.stage_initialized = false;
        self.cycles_in_stage = 0;
    }
}

struct TaskGroup {
    stage: Stage,
    task_idx: Vec<usize>,
}

// ============================================================================
// SCENARIO
// ============================================================================

pub struct SidePassScenario {
    config: PlannerConfig,
    gates: GateParams,
    tasks: Vec<Box<dyn Task>>,
    groups: Vec<TaskGroup>,
    state: ManeuverState,
    complete: bool,
    metrics: PlanningMetrics,
}

impl SidePassScenario {
    pub fn new(config: PlannerConfig, metrics: PlanningMetrics) -> Self {
        let gates = GateParams::from_config(&config);
        Self {
            config,
            gates,
            tasks: Vec::new(),
            groups: Vec::new(),
            state: ManeuverState::new(),
            complete: false,
            metrics,
        }
    }

    pub fn stage(&self) -> Stage {
        self.state.stage
    }

    pub fn wait_point_s(&self) -> Option<f64> {
        self.state.wait_point_s
    }

    pub fn committed_path(&self) -> Option<&PathData> {
        self.state.committed_path.as_ref()
    }

    /// Position of a stage in the configuration's task grouping.
    pub fn stage_index_in_conf(&self, stage: Stage) -> Option<usize> {
        self.groups.iter().position(|g| g.stage == stage)
    }

    fn reset_maneuver(&mut self) {
        self.state = ManeuverState::new();
        self.complete = false;
    }

    // ────────────────────────────────────────────────────────────
    // Task execution
    // ────────────────────────────────────────────────────────────

    /// Default lane-keeping runner: the full registered task list, in
    /// order, against whatever geometry is installed in the frame (lane
    /// center, or a pre-installed committed bypass path).
    fn run_plan_on_reference_line(
        &mut self,
        start: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<(), PlanningError> {
        for i in 0..self.tasks.len() {
            self.exec_task(i, start, frame)?;
        }
        Ok(())
    }

    /// The stage-specific subset of the task list, per configuration.
    fn run_stage_tasks(
        &mut self,
        stage: Stage,
        start: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<(), PlanningError> {
        let group = self.stage_index_in_conf(stage).ok_or_else(|| {
            PlanningError::Stage {
                stage,
                msg: "stage missing from task configuration".to_string(),
            }
        })?;
        let indices = self.groups[group].task_idx.clone();
        for i in indices {
            self.exec_task(i, start, frame)?;
        }
        Ok(())
    }

    fn exec_task(
        &mut self,
        idx: usize,
        start: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<(), PlanningError> {
        let task = &mut self.tasks[idx];
        if let Err(e) = task.execute(start, frame) {
            self.metrics.inc(&self.metrics.task_failures);
            return Err(PlanningError::Task {
                stage: self.state.stage,
                task: task.name().to_string(),
                source: e,
            });
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────
    // Stage handlers
    // ────────────────────────────────────────────────────────────

    fn approach_obstacle(
        &mut self,
        start: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<StageSignal, PlanningError> {
        if !self.state.stage_initialized {
            info!("🚗 approaching blocking obstacle");
            self.state.stage_initialized = true;
        }

        if let Some(ob) = predicates::find_blocking_obstacle(
            &frame.ego_sl_boundary,
            &frame.obstacles,
            frame.reference_line.lane_width_m(),
            &self.gates,
        ) {
            frame.stop_point_s =
                Some(ob.sl_boundary.start_s - self.config.side_pass.stop_margin_m);
        }

        self.run_plan_on_reference_line(start, frame)?;

        if predicates::is_side_pass_scenario(start, frame, &self.gates) {
            Ok(StageSignal::Complete)
        } else {
            debug!("side-pass gate not satisfied, keep approaching");
            Ok(StageSignal::Continue)
        }
    }

    fn generate_path(
        &mut self,
        start: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<StageSignal, PlanningError> {
        if !self.state.stage_initialized {
            self.state.stage_initialized = true;
        }

        let blocking = predicates::find_blocking_obstacle(
            &frame.ego_sl_boundary,
            &frame.obstacles,
            frame.reference_line.lane_width_m(),
            &self.gates,
        )
        .map(|ob| (ob.id, ob.sl_boundary.start_s));
        let Some((ob_id, ob_start_s)) = blocking else {
            // Nothing left to bypass; keep lane-keeping outputs for the
            // cycle and let the scenario exit.
            warn!("blocking obstacle vanished before path generation");
            self.run_plan_on_reference_line(start, frame)?;
            return Ok(StageSignal::Abort);
        };

        match self.run_stage_tasks(Stage::PathGeneration, start, frame) {
            Ok(()) => {}
            Err(PlanningError::Task {
                task,
                source: TaskError::Infeasible(msg),
                ..
            }) => {
                warn!("❌ no feasible lateral corridor ({task}): {msg}");
                return Ok(StageSignal::Abort);
            }
            Err(e) => return Err(e),
        }

        let path = frame
            .planned_path
            .clone()
            .ok_or_else(|| PlanningError::Stage {
                stage: Stage::PathGeneration,
                msg: "path tasks completed without producing a path".to_string(),
            })?;

        if self.state.wait_point_s.is_none() {
            let wait = ob_start_s - self.config.side_pass.stop_margin_m;
            info!("📍 wait point set at s={wait:.1}");
            self.state.wait_point_s = Some(wait);
        }
        self.state.committed_path = Some(path);
        self.state.target_obstacle_id = Some(ob_id);
        Ok(StageSignal::Complete)
    }

    fn stop_on_wait_point(
        &mut self,
        start: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<StageSignal, PlanningError> {
        if !self.state.stage_initialized {
            self.state.stage_initialized = true;
        }

        let wait = self.state.wait_point_s.ok_or_else(|| PlanningError::Stage {
            stage: Stage::WaitpointStop,
            msg: "wait point not set".to_string(),
        })?;

        frame.stop_point_s = Some(wait);
        self.run_plan_on_reference_line(start, frame)?;

        let gap = wait - start.path_point.s;
        if gap.abs() <= self.config.side_pass.stop_tolerance_m
            && start.v <= self.config.side_pass.stop_speed_eps_mps
        {
            info!("✅ stopped at wait point (gap {gap:.2}m, v={:.2}m/s)", start.v);
            Ok(StageSignal::Complete)
        } else {
            debug!(
                "stopping: gap {gap:.2}m, v={:.2}m/s (cycle {} in stage)",
                start.v, self.state.cycles_in_stage
            );
            Ok(StageSignal::Continue)
        }
    }

    fn detect_safety(
        &mut self,
        start: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<StageSignal, PlanningError> {
        if !self.state.stage_initialized {
            self.state.window_seen_open = false;
            self.state.safety_clear_streak = 0;
            self.state.stage_initialized = true;
            info!("watching for a clear pass window");
        }

        let wait = self.state.wait_point_s.ok_or_else(|| PlanningError::Stage {
            stage: Stage::SafetyDetection,
            msg: "wait point not set".to_string(),
        })?;

        // Hold at the wait point while the window is evaluated
        frame.stop_point_s = Some(wait);
        self.run_plan_on_reference_line(start, frame)?;

        let clear = {
            let path = self
                .state
                .committed_path
                .as_ref()
                .ok_or_else(|| PlanningError::Stage {
                    stage: Stage::SafetyDetection,
                    msg: "no committed path".to_string(),
                })?;
            predicates::is_pass_window_clear(
                frame,
                path,
                self.state.target_obstacle_id,
                self.config.side_pass.safety_horizon_s,
                self.config.vehicle.width_m,
            )
        };

        if clear {
            self.state.window_seen_open = true;
            self.state.safety_clear_streak += 1;
            if self.state.safety_clear_streak >= self.config.side_pass.safety_confirm_cycles {
                info!(
                    "✅ pass window clear for {} cycles, committing",
                    self.state.safety_clear_streak
                );
                Ok(StageSignal::Complete)
            } else {
                Ok(StageSignal::Continue)
            }
        } else if self.state.window_seen_open {
            warn!("⚠️  pass window closed after opening — back to the wait point");
            Ok(StageSignal::Abort)
        } else {
            self.state.safety_clear_streak = 0;
            Ok(StageSignal::Continue)
        }
    }

    fn pass_obstacle(
        &mut self,
        start: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<StageSignal, PlanningError> {
        if !self.state.stage_initialized {
            info!("🚗 executing bypass path");
            self.state.stage_initialized = true;
        }

        let committed = self
            .state
            .committed_path
            .clone()
            .ok_or_else(|| PlanningError::Stage {
                stage: Stage::ObstaclePass,
                msg: "no committed path".to_string(),
            })?;

        // Bind the runner to the committed path instead of the lane center
        frame.planned_path = Some(committed);
        frame.target_speed_mps = Some(self.config.tasks.pass_speed_mps);

        match self.run_plan_on_reference_line(start, frame) {
            Ok(()) => {}
            Err(PlanningError::Task {
                source: TaskError::PathBlocked { obstacle_id },
                ..
            }) => {
                warn!("⚠️  committed path blocked by obstacle {obstacle_id} — re-planning");
                self.state.committed_path = None;
                return Ok(StageSignal::Abort);
            }
            Err(e) => return Err(e),
        }

        let behind = match self
            .state
            .target_obstacle_id
            .and_then(|id| frame.obstacle_by_id(id))
        {
            Some(ob) => ob.sl_boundary.end_s < frame.ego_rear_s(),
            // Gone from the obstacle list: nothing left to pass
            None => true,
        };
        if behind {
            info!("✅ obstacle fully behind the ego footprint");
            Ok(StageSignal::Complete)
        } else {
            Ok(StageSignal::Continue)
        }
    }
}

impl Scenario for SidePassScenario {
    fn name(&self) -> &'static str {
        "side_pass"
    }

    fn init(&mut self) -> Result<(), PlanningError> {
        self.config.validate().map_err(PlanningError::Config)?;

        self.tasks.clear();
        self.groups.clear();
        let stage_tasks = self.config.side_pass.stage_tasks.clone();
        for group_conf in &stage_tasks {
            let stage = Stage::from_conf_name(&group_conf.stage).ok_or_else(|| {
                PlanningError::Config(format!(
                    "unknown stage `{}` in side_pass.stage_tasks",
                    group_conf.stage
                ))
            })?;
            if self.groups.iter().any(|g| g.stage == stage) {
                return Err(PlanningError::Config(format!(
                    "stage `{}` configured twice",
                    group_conf.stage
                )));
            }
            let mut task_idx = Vec::new();
            for name in &group_conf.tasks {
                let idx = match self.tasks.iter().position(|t| t.name() == name.as_str()) {
                    Some(i) => i,
                    None => {
                        let task = tasks::build_task(name, &self.config).ok_or_else(|| {
                            PlanningError::Config(format!("unknown task `{name}`"))
                        })?;
                        self.tasks.push(task);
                        self.tasks.len() - 1
                    }
                };
                task_idx.push(idx);
            }
            self.groups.push(TaskGroup { stage, task_idx });
        }

        self.reset_maneuver();
        info!(
            "side pass initialized: {} tasks across {} stage groups",
            self.tasks.len(),
            self.groups.len()
        );
        Ok(())
    }

    fn process(
        &mut self,
        planning_start_point: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<(), PlanningError> {
        if self.complete {
            debug!("maneuver already complete, nothing to do");
            return Ok(());
        }

        frame.clear_outputs();
        let stage = self.state.stage;
        self.state.cycles_in_stage += 1;

        let signal = match stage {
            Stage::ObstacleApproach => self.approach_obstacle(planning_start_point, frame),
            Stage::PathGeneration => self.generate_path(planning_start_point, frame),
            Stage::WaitpointStop => self.stop_on_wait_point(planning_start_point, frame),
            Stage::SafetyDetection => self.detect_safety(planning_start_point, frame),
            Stage::ObstaclePass => self.pass_obstacle(planning_start_point, frame),
            Stage::Unknown => Err(PlanningError::Stage {
                stage,
                msg: "invalid stage".to_string(),
            }),
        }?;

        if signal == StageSignal::Abort {
            self.metrics.inc(&self.metrics.aborts);
        }

        match next_stage(stage, signal) {
            StageAdvance::To(next) if next != stage => {
                info!(
                    "stage {} → {} ({:?})",
                    stage.as_str(),
                    next.as_str(),
                    signal
                );
                self.metrics.inc(&self.metrics.stage_transitions);
                self.state.enter(next);
            }
            StageAdvance::To(_) => {}
            StageAdvance::Exit => {
                info!(
                    "🔄 side pass exits at {} — maneuver state discarded",
                    stage.as_str()
                );
                self.reset_maneuver();
            }
            StageAdvance::Done => {
                info!("✅ side pass maneuver complete");
                self.metrics.inc(&self.metrics.maneuvers_completed);
                self.complete = true;
            }
        }
        Ok(())
    }

    /// Entry requires the combined geometric gate. Once the maneuver has
    /// committed (wait point on record, or the pass is executing) the
    /// scenario stays applicable until it completes or exits on its own:
    /// the ego may be off the lane center, where the entry gate no longer
    /// evaluates meaningfully.
    fn is_transferable(
        &self,
        _current: &dyn Scenario,
        ego_point: &TrajectoryPoint,
        frame: &Frame,
    ) -> bool {
        if self.state.wait_point_s.is_some() || self.state.stage == Stage::ObstaclePass {
            return true;
        }
        predicates::is_side_pass_scenario(ego_point, frame, &self.gates)
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn reset(&mut self) {
        debug!("side pass state reset");
        self.reset_maneuver();
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SlBoundary, SlPoint};
    use crate::world::{DecisionTag, Obstacle, ReferenceLine};

    const EGO_LEN: f64 = 4.8;
    const DT: f64 = 0.1;

    fn new_scenario() -> (SidePassScenario, PlanningMetrics) {
        let metrics = PlanningMetrics::new();
        let mut scenario = SidePassScenario::new(PlannerConfig::default(), metrics.clone());
        scenario.init().unwrap();
        (scenario, metrics)
    }

    fn line() -> ReferenceLine {
        ReferenceLine::straight(300.0, 1.0, 3.5, 5.0, 5.0)
    }

    fn ego_state(front_s: f64, v: f64) -> (TrajectoryPoint, SlBoundary) {
        let mut start = TrajectoryPoint::default();
        start.path_point.s = front_s;
        start.path_point.x = front_s;
        start.v = v;
        let sl = SlBoundary::new(front_s - EGO_LEN, front_s, -1.05, 1.05);
        (start, sl)
    }

    fn blocking_obstacle(id: u32, start_s: f64) -> Obstacle {
        Obstacle::new_static(
            id,
            SlBoundary::new(start_s, start_s + 5.0, -1.2, 0.8),
            DecisionTag::Stop,
        )
    }

    fn make_frame(
        cycle: u64,
        front_s: f64,
        obstacles: Vec<Obstacle>,
        junction_dist: f64,
    ) -> Frame {
        let (_, sl) = ego_state(front_s, 0.0);
        Frame::new(cycle, sl, obstacles, line(), junction_dist)
    }

    fn committed_test_path() -> PathData {
        let mut path = PathData::default();
        for i in 0..90 {
            let s = i as f64;
            let l = if (25.0..=45.0).contains(&s) { 2.35 } else { 0.0 };
            path.points.push(Default::default());
            path.frenet_points.push(SlPoint { s, l });
        }
        path
    }

    // ────────────────────────────────────────────────────────────
    // Transition table
    // ────────────────────────────────────────────────────────────

    #[test]
    fn test_transition_table_all_fifteen_combinations() {
        use Stage::*;
        use StageAdvance::*;
        use StageSignal::*;
        let cases = [
            (ObstacleApproach, Complete, To(PathGeneration)),
            (ObstacleApproach, Continue, To(ObstacleApproach)),
            (ObstacleApproach, Abort, Exit),
            (PathGeneration, Complete, To(WaitpointStop)),
            (PathGeneration, Continue, To(PathGeneration)),
            (PathGeneration, Abort, Exit),
            (WaitpointStop, Complete, To(SafetyDetection)),
            (WaitpointStop, Continue, To(WaitpointStop)),
            (WaitpointStop, Abort, Exit),
            (SafetyDetection, Complete, To(ObstaclePass)),
            (SafetyDetection, Continue, To(SafetyDetection)),
            (SafetyDetection, Abort, To(WaitpointStop)),
            (ObstaclePass, Complete, Done),
            (ObstaclePass, Continue, To(ObstaclePass)),
            (ObstaclePass, Abort, To(PathGeneration)),
        ];
        for (stage, signal, expected) in cases {
            assert_eq!(
                next_stage(stage, signal),
                expected,
                "next_stage({stage:?}, {signal:?})"
            );
        }
    }

    #[test]
    fn test_unknown_stage_always_exits() {
        for signal in [StageSignal::Complete, StageSignal::Continue, StageSignal::Abort] {
            assert_eq!(next_stage(Stage::Unknown, signal), StageAdvance::Exit);
        }
    }

    // ────────────────────────────────────────────────────────────
    // Init / configuration
    // ────────────────────────────────────────────────────────────

    #[test]
    fn test_init_rejects_unknown_task_name() {
        let mut config = PlannerConfig::default();
        config.side_pass.stage_tasks[0]
            .tasks
            .push("qp_spline_path".to_string());
        let mut scenario = SidePassScenario::new(config, PlanningMetrics::new());
        let err = scenario.init().unwrap_err();
        assert!(matches!(err, PlanningError::Config(_)), "got {err:?}");
    }

    #[test]
    fn test_init_rejects_unknown_stage_name() {
        let mut config = PlannerConfig::default();
        config.side_pass.stage_tasks[0].stage = "lane_change".to_string();
        let mut scenario = SidePassScenario::new(config, PlanningMetrics::new());
        assert!(scenario.init().is_err());
    }

    #[test]
    fn test_stage_index_follows_configuration_order() {
        let (scenario, _) = new_scenario();
        assert_eq!(scenario.stage_index_in_conf(Stage::ObstacleApproach), Some(0));
        assert_eq!(scenario.stage_index_in_conf(Stage::PathGeneration), Some(1));
        assert_eq!(scenario.stage_index_in_conf(Stage::ObstaclePass), Some(4));
        assert_eq!(scenario.stage_index_in_conf(Stage::Unknown), None);
    }

    // ────────────────────────────────────────────────────────────
    // Transferability gate
    // ────────────────────────────────────────────────────────────

    #[test]
    fn test_not_transferable_near_intersection() {
        // Obstacle detected 5m before a 10m junction guard: never entered
        let (scenario, _) = new_scenario();
        let (start, _) = ego_state(4.8, 5.0);
        let frame = make_frame(0, 4.8, vec![blocking_obstacle(1, 34.8)], 5.0);
        assert!(!scenario.is_transferable(&scenario, &start, &frame));
    }

    #[test]
    fn test_transferable_with_blocking_obstacle_far_from_junction() {
        let (scenario, _) = new_scenario();
        let (start, _) = ego_state(4.8, 5.0);
        let frame = make_frame(0, 4.8, vec![blocking_obstacle(1, 34.8)], f64::MAX);
        assert!(scenario.is_transferable(&scenario, &start, &frame));
    }

    #[test]
    fn test_stays_transferable_mid_maneuver() {
        let (mut scenario, _) = new_scenario();
        scenario.state.enter(Stage::ObstaclePass);
        scenario.state.wait_point_s = Some(29.8);
        let (start, _) = ego_state(40.0, 4.0);
        // Ego is beside the obstacle: the entry gate is false, but the
        // maneuver is underway and must not be preempted by geometry alone
        let frame = make_frame(0, 40.0, vec![], f64::MAX);
        assert!(scenario.is_transferable(&scenario, &start, &frame));
    }

    // ────────────────────────────────────────────────────────────
    // End-to-end maneuver
    // ────────────────────────────────────────────────────────────

    #[test]
    fn test_full_maneuver_end_to_end() {
        let (mut scenario, metrics) = new_scenario();
        let obstacle = blocking_obstacle(1, 34.8);

        let mut front_s = 4.8;
        let mut v = 5.0;
        let mut stage_sequence = vec![scenario.stage()];
        let mut wait_points = Vec::new();

        for cycle in 0..2000u64 {
            let (start, ego_sl) = ego_state(front_s, v);
            let mut frame = Frame::new(cycle, ego_sl, vec![obstacle.clone()], line(), f64::MAX);
            scenario.process(&start, &mut frame).unwrap();

            if let Some(w) = scenario.wait_point_s() {
                wait_points.push(w);
            }
            if *stage_sequence.last().unwrap() != scenario.stage() {
                stage_sequence.push(scenario.stage());
            }
            if scenario.is_complete() {
                break;
            }

            // Integrate the cycle's speed profile to move the ego
            if let Some(profile) = &frame.speed_profile {
                let v_next = profile.v_at(DT);
                front_s += (v + v_next) / 2.0 * DT;
                v = v_next;
            }
        }

        assert!(
            scenario.is_complete(),
            "maneuver did not finish; stuck at {:?} (s={front_s:.1}, v={v:.2})",
            scenario.stage()
        );
        assert_eq!(
            stage_sequence,
            vec![
                Stage::ObstacleApproach,
                Stage::PathGeneration,
                Stage::WaitpointStop,
                Stage::SafetyDetection,
                Stage::ObstaclePass,
            ],
            "stages must advance strictly forward on the happy path"
        );
        assert_eq!(metrics.summary().aborts, 0, "no abort on the happy path");
        assert_eq!(metrics.summary().maneuvers_completed, 1);

        // Wait point: set exactly once, never recomputed
        assert!(!wait_points.is_empty());
        assert!(
            wait_points.windows(2).all(|w| w[0] == w[1]),
            "wait point changed mid-maneuver"
        );
        assert!((wait_points[0] - 29.8).abs() < 1e-9);

        // Committed path clears the obstacle by at least the clearance
        let path = scenario.committed_path().expect("committed path");
        let (lo, _hi) = path.l_range_in(34.8, 39.8).unwrap();
        assert!(
            lo - 0.8 >= 0.3,
            "path clears the obstacle by only {:.2}m",
            lo - 0.8
        );
    }

    // ────────────────────────────────────────────────────────────
    // Safety window regression
    // ────────────────────────────────────────────────────────────

    #[test]
    fn test_window_close_falls_back_to_waitpoint_stop() {
        let (mut scenario, _) = new_scenario();
        scenario.state.enter(Stage::SafetyDetection);
        scenario.state.wait_point_s = Some(29.8);
        scenario.state.target_obstacle_id = Some(1);
        scenario.state.committed_path = Some(committed_test_path());

        let (start, _) = ego_state(29.8, 0.0);

        // Cycle 1: quiet road, window opens (but confirm threshold not met)
        let mut frame = make_frame(0, 29.8, vec![blocking_obstacle(1, 34.8)], f64::MAX);
        scenario.process(&start, &mut frame).unwrap();
        assert_eq!(scenario.stage(), Stage::SafetyDetection);
        assert!(scenario.state.window_seen_open);

        // Cycle 2: oncoming traffic enters the corridor — window closes
        let oncoming = Obstacle {
            id: 11,
            sl_boundary: SlBoundary::new(60.0, 65.0, 1.5, 4.5),
            decision: DecisionTag::Ignore,
            speed_mps: -8.0,
        };
        let mut frame = make_frame(
            1,
            29.8,
            vec![blocking_obstacle(1, 34.8), oncoming],
            f64::MAX,
        );
        scenario.process(&start, &mut frame).unwrap();
        assert_eq!(
            scenario.stage(),
            Stage::WaitpointStop,
            "a closed window must re-stop, not exit the scenario"
        );
    }

    #[test]
    fn test_window_never_open_keeps_waiting() {
        let (mut scenario, _) = new_scenario();
        scenario.state.enter(Stage::SafetyDetection);
        scenario.state.wait_point_s = Some(29.8);
        scenario.state.target_obstacle_id = Some(1);
        scenario.state.committed_path = Some(committed_test_path());

        let (start, _) = ego_state(29.8, 0.0);
        let oncoming = Obstacle {
            id: 11,
            sl_boundary: SlBoundary::new(60.0, 65.0, 1.5, 4.5),
            decision: DecisionTag::Ignore,
            speed_mps: -8.0,
        };
        for cycle in 0..5 {
            let mut frame = make_frame(
                cycle,
                29.8,
                vec![blocking_obstacle(1, 34.8), oncoming.clone()],
                f64::MAX,
            );
            scenario.process(&start, &mut frame).unwrap();
            assert_eq!(
                scenario.stage(),
                Stage::SafetyDetection,
                "never-open window is Continue, not Abort"
            );
        }
    }

    // ────────────────────────────────────────────────────────────
    // Idempotence while a handler reports Continue
    // ────────────────────────────────────────────────────────────

    #[test]
    fn test_continue_cycles_are_idempotent() {
        let (mut scenario, _) = new_scenario();
        scenario.state.enter(Stage::WaitpointStop);
        scenario.state.wait_point_s = Some(29.8);
        scenario.state.committed_path = Some(committed_test_path());
        scenario.state.target_obstacle_id = Some(1);

        // Far from the wait point and still rolling: Continue every cycle
        for cycle in 0..4 {
            let (start, _) = ego_state(10.0, 2.0);
            let mut frame = make_frame(cycle, 10.0, vec![blocking_obstacle(1, 34.8)], f64::MAX);
            scenario.process(&start, &mut frame).unwrap();
            assert_eq!(scenario.stage(), Stage::WaitpointStop);
            assert_eq!(scenario.wait_point_s(), Some(29.8), "wait point recomputed");
        }
    }

    // ────────────────────────────────────────────────────────────
    // Pass abort → re-plan
    // ────────────────────────────────────────────────────────────

    #[test]
    fn test_blocked_pass_falls_back_to_path_generation() {
        let (mut scenario, metrics) = new_scenario();
        scenario.state.enter(Stage::ObstaclePass);
        scenario.state.wait_point_s = Some(29.8);
        scenario.state.target_obstacle_id = Some(1);
        scenario.state.committed_path = Some(committed_test_path());

        // A new hard-stop obstacle sits on the bypass corridor
        let intruder = Obstacle::new_static(
            2,
            SlBoundary::new(36.0, 38.0, 2.0, 3.0),
            DecisionTag::Stop,
        );
        let (start, _) = ego_state(30.0, 3.0);
        let mut frame = make_frame(
            0,
            30.0,
            vec![blocking_obstacle(1, 34.8), intruder],
            f64::MAX,
        );
        scenario.process(&start, &mut frame).unwrap();

        assert_eq!(scenario.stage(), Stage::PathGeneration, "re-plan, not exit");
        assert!(scenario.committed_path().is_none(), "stale path dropped");
        assert_eq!(scenario.wait_point_s(), Some(29.8), "wait point survives");
        assert_eq!(metrics.summary().aborts, 1);
    }

    #[test]
    fn test_replan_after_pass_abort_is_unconditional() {
        // Policy: the re-plan does not re-validate the entry gate; only the
        // dispatcher may exit the scenario. Junction suddenly near — the
        // re-plan still proceeds.
        let (mut scenario, _) = new_scenario();
        scenario.state.enter(Stage::PathGeneration);
        scenario.state.wait_point_s = Some(29.8);

        let (start, _) = ego_state(20.0, 1.0);
        let mut frame = make_frame(0, 20.0, vec![blocking_obstacle(1, 34.8)], 5.0);
        scenario.process(&start, &mut frame).unwrap();
        assert_eq!(
            scenario.stage(),
            Stage::WaitpointStop,
            "re-plan completed despite the lapsed entry gate"
        );
        assert_eq!(scenario.wait_point_s(), Some(29.8), "wait point not recomputed");
    }

    // ────────────────────────────────────────────────────────────
    // Abort at path generation exits the scenario
    // ────────────────────────────────────────────────────────────

    #[test]
    fn test_no_corridor_exits_scenario() {
        let (mut scenario, metrics) = new_scenario();
        scenario.state.enter(Stage::PathGeneration);

        // Obstacle spans the whole drivable width
        let wall = Obstacle::new_static(
            1,
            SlBoundary::new(34.8, 39.8, -4.5, 4.5),
            DecisionTag::Stop,
        );
        let (start, _) = ego_state(4.8, 2.0);
        let mut frame = make_frame(0, 4.8, vec![wall], f64::MAX);
        scenario.process(&start, &mut frame).unwrap();

        assert_eq!(scenario.stage(), Stage::ObstacleApproach, "back to entry stage");
        assert!(scenario.wait_point_s().is_none(), "maneuver state discarded");
        assert!(scenario.committed_path().is_none());
        assert_eq!(metrics.summary().aborts, 1);
    }

    // ────────────────────────────────────────────────────────────
    // Per-cycle failure does not advance the stage
    // ────────────────────────────────────────────────────────────

    #[test]
    fn test_handler_failure_keeps_stage() {
        let (mut scenario, metrics) = new_scenario();
        // A non-blocking hard-stop obstacle straddling the lane center ahead
        // of the stop fence: lane-keep path fails validation every cycle.
        let blocker = blocking_obstacle(1, 34.8);
        let stray = Obstacle::new_static(
            2,
            SlBoundary::new(10.0, 12.0, 0.8, 1.9),
            DecisionTag::Stop,
        );
        let (start, _) = ego_state(4.8, 5.0);
        let mut frame = make_frame(0, 4.8, vec![blocker, stray], f64::MAX);
        let err = scenario.process(&start, &mut frame).unwrap_err();
        match err {
            PlanningError::Task { stage, ref task, .. } => {
                assert_eq!(stage, Stage::ObstacleApproach);
                assert_eq!(task, "path_decider");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(scenario.stage(), Stage::ObstacleApproach, "stage must not advance");
        assert_eq!(metrics.summary().task_failures, 1);
    }
}
