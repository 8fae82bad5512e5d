// src/world/frame.rs
//
// Single source of truth for one planning cycle. Built by the caller from
// perception/localization, mutated in place by tasks and stage handlers to
// carry the cycle's outputs downstream.

use super::obstacle::Obstacle;
use super::reference_line::ReferenceLine;
use crate::types::{PathData, SlBoundary, SpeedProfile};

#[derive(Debug, Clone)]
pub struct Frame {
    pub cycle: u64,
    /// Ego footprint on the active reference line.
    pub ego_sl_boundary: SlBoundary,
    pub obstacles: Vec<Obstacle>,
    pub reference_line: ReferenceLine,
    /// Distance from the ego front to the next junction; `f64::MAX` when no
    /// junction is mapped ahead.
    pub distance_to_junction_m: f64,

    // ── Cycle outputs, cleared at the start of every Process call ──
    pub planned_path: Option<PathData>,
    pub speed_profile: Option<SpeedProfile>,
    /// Station the ego front must stop at this cycle, if any.
    pub stop_point_s: Option<f64>,
    /// Overrides the configured cruise speed for this cycle.
    pub target_speed_mps: Option<f64>,
}

impl Frame {
    pub fn new(
        cycle: u64,
        ego_sl_boundary: SlBoundary,
        obstacles: Vec<Obstacle>,
        reference_line: ReferenceLine,
        distance_to_junction_m: f64,
    ) -> Self {
        Self {
            cycle,
            ego_sl_boundary,
            obstacles,
            reference_line,
            distance_to_junction_m,
            planned_path: None,
            speed_profile: None,
            stop_point_s: None,
            target_speed_mps: None,
        }
    }

    pub fn clear_outputs(&mut self) {
        self.planned_path = None;
        self.speed_profile = None;
        self.stop_point_s = None;
        self.target_speed_mps = None;
    }

    pub fn obstacle_by_id(&self, id: u32) -> Option<&Obstacle> {
        self.obstacles.iter().find(|o| o.id == id)
    }

    pub fn ego_front_s(&self) -> f64 {
        self.ego_sl_boundary.end_s
    }

    pub fn ego_rear_s(&self) -> f64 {
        self.ego_sl_boundary.start_s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::obstacle::DecisionTag;

    #[test]
    fn test_outputs_cleared() {
        let line = ReferenceLine::straight(100.0, 1.0, 3.5, 5.0, 5.0);
        let mut frame = Frame::new(
            0,
            SlBoundary::new(0.0, 4.8, -1.05, 1.05),
            vec![Obstacle::new_static(
                7,
                SlBoundary::new(30.0, 35.0, -1.0, 1.0),
                DecisionTag::Stop,
            )],
            line,
            f64::MAX,
        );
        frame.stop_point_s = Some(25.0);
        frame.target_speed_mps = Some(3.0);
        frame.clear_outputs();
        assert!(frame.stop_point_s.is_none());
        assert!(frame.target_speed_mps.is_none());
        assert!(frame.planned_path.is_none());
        assert!(frame.speed_profile.is_none());
        assert!(frame.obstacle_by_id(7).is_some());
        assert!(frame.obstacle_by_id(8).is_none());
    }
}
