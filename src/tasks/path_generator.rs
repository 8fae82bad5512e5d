// src/tasks/path_generator.rs
//
// Path generation tasks.
//
// `lane_keep_path` follows the reference-line center. `bypass_path_generator`
// nudges laterally around the blocking obstacle within road limits. Both
// leave an already-installed path untouched, so a committed bypass path can
// be pre-installed by the scenario and executed through the same pipeline.

use super::{Task, TaskError};
use crate::config::PlannerConfig;
use crate::planning::predicates::{self, GateParams};
use crate::types::{PathData, SlPoint, TrajectoryPoint};
use crate::world::Frame;
use tracing::{debug, info};

/// Longitudinal slack kept before/after the obstacle at full lateral offset.
const LON_BUFFER_M: f64 = 2.0;
/// Path length kept beyond the end of the return taper.
const TAIL_M: f64 = 5.0;

fn smoothstep01(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ============================================================================
// LANE KEEP
// ============================================================================

pub struct LaneKeepPathTask {
    resolution_m: f64,
    horizon_m: f64,
}

impl LaneKeepPathTask {
    pub const NAME: &'static str = "lane_keep_path";

    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            resolution_m: config.tasks.path_resolution_m,
            horizon_m: config.tasks.plan_horizon_m,
        }
    }
}

impl Task for LaneKeepPathTask {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(&mut self, start: &TrajectoryPoint, frame: &mut Frame) -> Result<(), TaskError> {
        if frame.planned_path.is_some() {
            debug!("path already installed, lane-keep generation skipped");
            return Ok(());
        }

        let s0 = start.path_point.s;
        let s1 = (s0 + self.horizon_m).min(frame.reference_line.length());
        if s1 - s0 < self.resolution_m {
            return Err(TaskError::Failed(format!(
                "reference line exhausted at s={s0:.1}"
            )));
        }

        let mut path = PathData::default();
        let mut s = s0;
        while s <= s1 {
            path.points.push(frame.reference_line.point_at(s));
            path.frenet_points.push(SlPoint { s, l: 0.0 });
            s += self.resolution_m;
        }

        frame.planned_path = Some(path);
        Ok(())
    }
}

// ============================================================================
// BYPASS
// ============================================================================

pub struct BypassPathTask {
    resolution_m: f64,
    horizon_m: f64,
    taper_m: f64,
    nudge_buffer_m: f64,
    clearance_m: f64,
    vehicle_width_m: f64,
    gates: GateParams,
}

impl BypassPathTask {
    pub const NAME: &'static str = "bypass_path_generator";

    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            resolution_m: config.tasks.path_resolution_m,
            horizon_m: config.tasks.plan_horizon_m,
            taper_m: config.tasks.lateral_taper_m,
            nudge_buffer_m: config.tasks.nudge_buffer_m,
            clearance_m: config.side_pass.min_bypass_clearance_m,
            vehicle_width_m: config.vehicle.width_m,
            gates: GateParams::from_config(config),
        }
    }

    /// Signed lateral target beside the obstacle, or None when neither side
    /// has room.
    fn pick_target_l(&self, frame: &Frame, ob_start_l: f64, ob_end_l: f64) -> Option<f64> {
        let road_left = frame.reference_line.road_left_width_m();
        let road_right = frame.reference_line.road_right_width_m();
        let corridor_left = road_left - ob_end_l;
        let corridor_right = road_right + ob_start_l;
        let needed = self.vehicle_width_m + self.clearance_m + self.nudge_buffer_m;

        let half_width = self.vehicle_width_m / 2.0;
        let offset = self.clearance_m + self.nudge_buffer_m + half_width;
        if corridor_left >= needed && corridor_left >= corridor_right {
            Some(ob_end_l + offset)
        } else if corridor_right >= needed {
            Some(ob_start_l - offset)
        } else {
            None
        }
    }
}

impl Task for BypassPathTask {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(&mut self, start: &TrajectoryPoint, frame: &mut Frame) -> Result<(), TaskError> {
        if frame.planned_path.is_some() {
            debug!("path already installed, bypass generation skipped");
            return Ok(());
        }

        let obstacle = predicates::find_blocking_obstacle(
            &frame.ego_sl_boundary,
            &frame.obstacles,
            frame.reference_line.lane_width_m(),
            &self.gates,
        )
        .ok_or_else(|| TaskError::Failed("no blocking obstacle to bypass".to_string()))?;

        let ob_id = obstacle.id;
        let ob = obstacle.sl_boundary;

        let target_l = self
            .pick_target_l(frame, ob.start_l, ob.end_l)
            .ok_or_else(|| {
                TaskError::Infeasible(format!(
                    "obstacle {ob_id} spans l=[{:.2}, {:.2}], road offers no side",
                    ob.start_l, ob.end_l
                ))
            })?;

        let ramp_in_end = ob.start_s - LON_BUFFER_M;
        let ramp_in_start = ramp_in_end - self.taper_m;
        let hold_end = ob.end_s + LON_BUFFER_M;
        let ramp_out_end = hold_end + self.taper_m;

        let s0 = start.path_point.s;
        let s1 = (s0 + self.horizon_m)
            .max(ramp_out_end + TAIL_M)
            .min(frame.reference_line.length());
        if s1 < ramp_out_end {
            return Err(TaskError::Failed(format!(
                "reference line ends at {:.1}, bypass needs {:.1}",
                frame.reference_line.length(),
                ramp_out_end
            )));
        }

        let mut path = PathData::default();
        let mut s = s0;
        while s <= s1 {
            let l = if s < ramp_in_start {
                0.0
            } else if s < ramp_in_end {
                target_l * smoothstep01((s - ramp_in_start) / self.taper_m)
            } else if s <= hold_end {
                target_l
            } else {
                target_l * (1.0 - smoothstep01((s - hold_end) / self.taper_m))
            };
            path.points.push(frame.reference_line.offset_point(s, l));
            path.frenet_points.push(SlPoint { s, l });
            s += self.resolution_m;
        }

        info!(
            "bypass path around obstacle {}: target_l={:.2}m over s=[{:.1}, {:.1}]",
            ob_id, target_l, ramp_in_start, ramp_out_end
        );
        frame.planned_path = Some(path);
        Ok(())
    }
}
