// src/planning/lane_follow.rs
//
// Default scenario: keep the lane, respect stop decisions, cruise. Always
// transferable — it is the fallback every cycle can land on.

use super::predicates::{self, GateParams};
use super::scenario::{PlanningError, Scenario};
use super::side_pass::Stage;
use crate::config::PlannerConfig;
use crate::tasks::{self, Task};
use crate::types::TrajectoryPoint;
use crate::world::Frame;
use tracing::debug;

const TASK_NAMES: [&str; 3] = ["lane_keep_path", "path_decider", "speed_planner"];

pub struct LaneFollowScenario {
    config: PlannerConfig,
    tasks: Vec<Box<dyn Task>>,
    gates: GateParams,
}

impl LaneFollowScenario {
    pub fn new(config: PlannerConfig) -> Self {
        let gates = GateParams::from_config(&config);
        Self {
            config,
            tasks: Vec::new(),
            gates,
        }
    }
}

impl Scenario for LaneFollowScenario {
    fn name(&self) -> &'static str {
        "lane_follow"
    }

    fn init(&mut self) -> Result<(), PlanningError> {
        self.config
            .validate()
            .map_err(PlanningError::Config)?;
        self.tasks.clear();
        for name in TASK_NAMES {
            let task = tasks::build_task(name, &self.config)
                .ok_or_else(|| PlanningError::Config(format!("unknown task `{name}`")))?;
            self.tasks.push(task);
        }
        Ok(())
    }

    fn process(
        &mut self,
        planning_start_point: &TrajectoryPoint,
        frame: &mut Frame,
    ) -> Result<(), PlanningError> {
        frame.clear_outputs();

        // A hard-stop obstacle ahead still gets a stop fence even while the
        // side-pass scenario is not (or not yet) active.
        if let Some(ob) = predicates::find_blocking_obstacle(
            &frame.ego_sl_boundary,
            &frame.obstacles,
            frame.reference_line.lane_width_m(),
            &self.gates,
        ) {
            let fence = ob.sl_boundary.start_s - self.config.side_pass.stop_margin_m;
            debug!("lane follow holds behind obstacle {} at s={fence:.1}", ob.id);
            frame.stop_point_s = Some(fence);
        }

        for task in &mut self.tasks {
            if let Err(e) = task.execute(planning_start_point, frame) {
                return Err(PlanningError::Task {
                    stage: Stage::Unknown,
                    task: task.name().to_string(),
                    source: e,
                });
            }
        }
        Ok(())
    }

    fn is_transferable(
        &self,
        _current: &dyn Scenario,
        _ego_point: &TrajectoryPoint,
        _frame: &Frame,
    ) -> bool {
        true
    }

    fn reset(&mut self) {}
}
