// src/tasks/path_decider.rs
//
// Validates the cycle's planned path against hard-stop obstacles. Only the
// segment the ego will actually traverse is checked: when a stop fence is
// active, everything beyond it is unreachable this cycle.

use super::{Task, TaskError};
use crate::config::PlannerConfig;
use crate::types::TrajectoryPoint;
use crate::world::Frame;
use tracing::{debug, warn};

/// Longitudinal slack around an obstacle footprint during the check.
const LON_MARGIN_M: f64 = 0.5;

pub struct PathDeciderTask {
    clearance_m: f64,
    vehicle_width_m: f64,
}

impl PathDeciderTask {
    pub const NAME: &'static str = "path_decider";

    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            clearance_m: config.side_pass.min_bypass_clearance_m,
            vehicle_width_m: config.vehicle.width_m,
        }
    }
}

impl Task for PathDeciderTask {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(&mut self, _start: &TrajectoryPoint, frame: &mut Frame) -> Result<(), TaskError> {
        let path = frame
            .planned_path
            .as_ref()
            .ok_or_else(|| TaskError::Failed("no planned path to validate".to_string()))?;

        let reach_limit = frame.stop_point_s.map(|s| s + LON_MARGIN_M);
        let lat_buffer = self.vehicle_width_m / 2.0 + self.clearance_m;

        for ob in &frame.obstacles {
            if ob.decision != crate::world::DecisionTag::Stop {
                continue;
            }
            let s0 = ob.sl_boundary.start_s - LON_MARGIN_M;
            let s1 = ob.sl_boundary.end_s + LON_MARGIN_M;
            for p in &path.frenet_points {
                if p.s < s0 || p.s > s1 {
                    continue;
                }
                if let Some(limit) = reach_limit {
                    if p.s > limit {
                        continue;
                    }
                }
                if p.l > ob.sl_boundary.start_l - lat_buffer
                    && p.l < ob.sl_boundary.end_l + lat_buffer
                {
                    warn!(
                        "path point (s={:.1}, l={:.2}) intrudes on obstacle {} l=[{:.2}, {:.2}]",
                        p.s, p.l, ob.id, ob.sl_boundary.start_l, ob.sl_boundary.end_l
                    );
                    return Err(TaskError::PathBlocked { obstacle_id: ob.id });
                }
            }
        }

        debug!(
            "path clear against {} obstacle(s), reach limit {:?}",
            frame.obstacles.len(),
            reach_limit
        );
        Ok(())
    }
}
