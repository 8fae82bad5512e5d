// src/planning/predicates.rs
//
// Pure geometric gates over the world snapshot. No mutation, no state:
// every decision here must be reproducible from the frame alone.

use crate::config::PlannerConfig;
use crate::types::{PathData, SlBoundary, TrajectoryPoint};
use crate::world::{DecisionTag, Frame, Obstacle};
use tracing::debug;

/// Obstacles slower than this are treated as standing for the pass-window
/// prediction.
const MIN_DYNAMIC_SPEED_MPS: f64 = 0.5;
/// Lateral offset above which a path point counts as part of the bypass.
const LATERAL_ACTIVE_EPS_M: f64 = 0.25;
/// Longitudinal slack added past the bypass region for the pass window.
const WINDOW_TAIL_M: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
pub struct GateParams {
    pub lookahead_m: f64,
    pub min_bypass_clearance_m: f64,
    pub vehicle_width_m: f64,
    pub intersection_guard_m: f64,
}

impl GateParams {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            lookahead_m: config.side_pass.lookahead_distance_m,
            min_bypass_clearance_m: config.side_pass.min_bypass_clearance_m,
            vehicle_width_m: config.vehicle.width_m,
            intersection_guard_m: config.side_pass.intersection_guard_m,
        }
    }
}

/// The nearest obstacle ahead that forces a lateral bypass: hard-stop
/// decision, inside the lookahead, overlapping the ego's forward corridor,
/// with no in-lane gap wide enough to slip through.
pub fn find_blocking_obstacle<'a>(
    ego_sl: &SlBoundary,
    obstacles: &'a [Obstacle],
    lane_width_m: f64,
    params: &GateParams,
) -> Option<&'a Obstacle> {
    let half_lane = lane_width_m / 2.0;
    let needed_gap = params.vehicle_width_m + params.min_bypass_clearance_m;

    let mut best: Option<&Obstacle> = None;
    for ob in obstacles {
        if ob.decision != DecisionTag::Stop {
            continue;
        }
        let gap_s = ob.sl_boundary.start_s - ego_sl.end_s;
        if gap_s < 0.0 || gap_s > params.lookahead_m {
            continue;
        }
        if !ob.sl_boundary.overlaps_l(ego_sl) {
            continue;
        }
        let left_gap = half_lane - ob.sl_boundary.end_l;
        let right_gap = ob.sl_boundary.start_l + half_lane;
        if left_gap.max(right_gap) >= needed_gap {
            debug!(
                "obstacle {} leaves a {:.2}m in-lane gap, not blocking",
                ob.id,
                left_gap.max(right_gap)
            );
            continue;
        }
        match best {
            Some(b) if b.sl_boundary.start_s <= ob.sl_boundary.start_s => {}
            _ => best = Some(ob),
        }
    }
    best
}

pub fn has_blocking_obstacle(
    ego_sl: &SlBoundary,
    obstacles: &[Obstacle],
    lane_width_m: f64,
    params: &GateParams,
) -> bool {
    find_blocking_obstacle(ego_sl, obstacles, lane_width_m, params).is_some()
}

/// Inclusive at the boundary: exactly the guard distance is far enough.
pub fn is_far_from_intersection(frame: &Frame, guard_m: f64) -> bool {
    frame.distance_to_junction_m >= guard_m
}

/// The combined entry gate for the side-pass maneuver.
pub fn is_side_pass_scenario(
    _planning_start_point: &TrajectoryPoint,
    frame: &Frame,
    params: &GateParams,
) -> bool {
    has_blocking_obstacle(
        &frame.ego_sl_boundary,
        &frame.obstacles,
        frame.reference_line.lane_width_m(),
        params,
    ) && is_far_from_intersection(frame, params.intersection_guard_m)
}

/// Pass-window check: no dynamic obstacle is predicted to enter the bypass
/// corridor within the horizon. The corridor is the laterally-offset part
/// of the committed path, swept by the vehicle width.
pub fn is_pass_window_clear(
    frame: &Frame,
    path: &PathData,
    exclude_id: Option<u32>,
    horizon_s: f64,
    vehicle_width_m: f64,
) -> bool {
    let Some((s0, s1, l_min, l_max)) = bypass_corridor(path, frame.ego_front_s(), vehicle_width_m)
    else {
        return true;
    };

    for ob in &frame.obstacles {
        if Some(ob.id) == exclude_id {
            continue;
        }
        if ob.speed_mps.abs() < MIN_DYNAMIC_SPEED_MPS {
            continue;
        }
        let drift = ob.speed_mps * horizon_s;
        let swept_s0 = ob.sl_boundary.start_s + drift.min(0.0);
        let swept_s1 = ob.sl_boundary.end_s + drift.max(0.0);
        if swept_s1 < s0 || swept_s0 > s1 {
            continue;
        }
        if ob.sl_boundary.end_l < l_min || ob.sl_boundary.start_l > l_max {
            continue;
        }
        debug!(
            "pass window closed by obstacle {} (v={:.1}m/s, swept s=[{:.1}, {:.1}])",
            ob.id, ob.speed_mps, swept_s0, swept_s1
        );
        return false;
    }
    true
}

/// (s0, s1, l_min, l_max) of the corridor the vehicle body sweeps while the
/// path is laterally active. None for a path that never leaves the center.
fn bypass_corridor(
    path: &PathData,
    ego_front_s: f64,
    vehicle_width_m: f64,
) -> Option<(f64, f64, f64, f64)> {
    let mut active_end: Option<f64> = None;
    let mut l_min = f64::MAX;
    let mut l_max = f64::MIN;
    for p in &path.frenet_points {
        if p.l.abs() >= LATERAL_ACTIVE_EPS_M {
            active_end = Some(p.s);
            l_min = l_min.min(p.l);
            l_max = l_max.max(p.l);
        }
    }
    let end = active_end?;
    let half = vehicle_width_m / 2.0;
    Some((ego_front_s, end + WINDOW_TAIL_M, l_min - half, l_max + half))
}
