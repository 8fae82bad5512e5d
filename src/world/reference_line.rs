// src/world/reference_line.rs
//
// Reference-line geometry: an s-ordered polyline with lane and road widths.
// Construction belongs to the upstream map layer; the planner only samples
// and offsets it.

use crate::types::PathPoint;

#[derive(Debug, Clone)]
pub struct ReferenceLine {
    points: Vec<PathPoint>,
    lane_width_m: f64,
    /// Drivable width left of the line center (lane + shoulder).
    road_left_width_m: f64,
    /// Drivable width right of the line center.
    road_right_width_m: f64,
}

impl ReferenceLine {
    pub fn new(
        points: Vec<PathPoint>,
        lane_width_m: f64,
        road_left_width_m: f64,
        road_right_width_m: f64,
    ) -> Self {
        debug_assert!(
            points.windows(2).all(|w| w[0].s <= w[1].s),
            "reference line points must be s-ordered"
        );
        Self {
            points,
            lane_width_m,
            road_left_width_m,
            road_right_width_m,
        }
    }

    /// Straight line along +x starting at s = 0. Used by the simulation
    /// driver and tests.
    pub fn straight(
        length_m: f64,
        step_m: f64,
        lane_width_m: f64,
        road_left_width_m: f64,
        road_right_width_m: f64,
    ) -> Self {
        let n = (length_m / step_m).ceil() as usize + 1;
        let points = (0..n)
            .map(|i| {
                let s = (i as f64 * step_m).min(length_m);
                PathPoint {
                    x: s,
                    y: 0.0,
                    theta: 0.0,
                    kappa: 0.0,
                    s,
                }
            })
            .collect();
        Self::new(points, lane_width_m, road_left_width_m, road_right_width_m)
    }

    pub fn length(&self) -> f64 {
        self.points.last().map(|p| p.s).unwrap_or(0.0)
    }

    pub fn lane_width_m(&self) -> f64 {
        self.lane_width_m
    }

    pub fn road_left_width_m(&self) -> f64 {
        self.road_left_width_m
    }

    pub fn road_right_width_m(&self) -> f64 {
        self.road_right_width_m
    }

    /// Interpolated point at station `s`, clamped to the line's extent.
    pub fn point_at(&self, s: f64) -> PathPoint {
        let pts = &self.points;
        if pts.is_empty() {
            return PathPoint::default();
        }
        if s <= pts[0].s {
            return pts[0];
        }
        if s >= pts[pts.len() - 1].s {
            return pts[pts.len() - 1];
        }
        let idx = pts.partition_point(|p| p.s < s);
        let (a, b) = (pts[idx - 1], pts[idx]);
        let span = b.s - a.s;
        if span <= f64::EPSILON {
            return b;
        }
        let r = (s - a.s) / span;
        PathPoint {
            x: a.x + r * (b.x - a.x),
            y: a.y + r * (b.y - a.y),
            theta: a.theta + r * (b.theta - a.theta),
            kappa: a.kappa + r * (b.kappa - a.kappa),
            s,
        }
    }

    /// Point at station `s` shifted laterally by `l` (left positive).
    pub fn offset_point(&self, s: f64, l: f64) -> PathPoint {
        let base = self.point_at(s);
        PathPoint {
            x: base.x - l * base.theta.sin(),
            y: base.y + l * base.theta.cos(),
            ..base
        }
    }
}
