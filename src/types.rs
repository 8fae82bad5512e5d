// src/types.rs
//
// Core planning value types shared across the world model, tasks, and
// scenario layer. Everything here is road-relative: `s` runs along the
// reference line, `l` is the signed lateral offset (left positive).

/// A point on a planar path with its station along the reference line.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PathPoint {
    pub x: f64,
    pub y: f64,
    /// Heading in radians.
    pub theta: f64,
    /// Curvature in 1/m.
    pub kappa: f64,
    /// Station (longitudinal arc length) in m.
    pub s: f64,
}

/// Pose + kinematic state at plan time. The planning start point for a
/// cycle; `path_point.s` is the ego front-bumper station.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrajectoryPoint {
    pub path_point: PathPoint,
    /// Speed in m/s.
    pub v: f64,
    /// Acceleration in m/s².
    pub a: f64,
    /// Time offset from the cycle's plan time in s.
    pub relative_time: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlPoint {
    pub s: f64,
    pub l: f64,
}

/// Axis-aligned footprint in SL coordinates: `[start_s, end_s]` along the
/// lane, `[start_l, end_l]` across it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlBoundary {
    pub start_s: f64,
    pub end_s: f64,
    pub start_l: f64,
    pub end_l: f64,
}

impl SlBoundary {
    pub fn new(start_s: f64, end_s: f64, start_l: f64, end_l: f64) -> Self {
        Self {
            start_s,
            end_s,
            start_l,
            end_l,
        }
    }

    pub fn overlaps_l(&self, other: &SlBoundary) -> bool {
        self.start_l <= other.end_l && other.start_l <= self.end_l
    }

    pub fn overlaps_s(&self, other: &SlBoundary) -> bool {
        self.start_s <= other.end_s && other.start_s <= self.end_s
    }

    pub fn length_s(&self) -> f64 {
        self.end_s - self.start_s
    }

    pub fn width_l(&self) -> f64 {
        self.end_l - self.start_l
    }
}

/// A planned path: planar points plus their frenet (s/l) projection on the
/// reference line. The frenet points are kept sorted by `s`.
#[derive(Debug, Clone, Default)]
pub struct PathData {
    pub points: Vec<PathPoint>,
    pub frenet_points: Vec<SlPoint>,
}

impl PathData {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn start_s(&self) -> Option<f64> {
        self.frenet_points.first().map(|p| p.s)
    }

    pub fn end_s(&self) -> Option<f64> {
        self.frenet_points.last().map(|p| p.s)
    }

    /// Lateral offset at station `s`, linearly interpolated. None outside
    /// the path's s-range.
    pub fn l_at_s(&self, s: f64) -> Option<f64> {
        let pts = &self.frenet_points;
        if pts.is_empty() {
            return None;
        }
        if s < pts[0].s || s > pts[pts.len() - 1].s {
            return None;
        }
        let idx = pts.partition_point(|p| p.s < s);
        if idx == 0 {
            return Some(pts[0].l);
        }
        if idx >= pts.len() {
            return Some(pts[pts.len() - 1].l);
        }
        let (a, b) = (pts[idx - 1], pts[idx]);
        let span = b.s - a.s;
        if span <= f64::EPSILON {
            return Some(b.l);
        }
        let ratio = (s - a.s) / span;
        Some(a.l + ratio * (b.l - a.l))
    }

    /// Min/max lateral offset over frenet points with `s` in `[s0, s1]`.
    pub fn l_range_in(&self, s0: f64, s1: f64) -> Option<(f64, f64)> {
        let mut range: Option<(f64, f64)> = None;
        for p in &self.frenet_points {
            if p.s < s0 || p.s > s1 {
                continue;
            }
            range = Some(match range {
                Some((lo, hi)) => (lo.min(p.l), hi.max(p.l)),
                None => (p.l, p.l),
            });
        }
        range
    }
}

/// One point of a speed profile: at time `t`, be at station `s` with speed
/// `v` and acceleration `a`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpeedPoint {
    pub t: f64,
    pub s: f64,
    pub v: f64,
    pub a: f64,
}

#[derive(Debug, Clone, Default)]
pub struct SpeedProfile {
    pub points: Vec<SpeedPoint>,
}

impl SpeedProfile {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Speed at time `t`, linearly interpolated; clamps to the profile ends.
    pub fn v_at(&self, t: f64) -> f64 {
        let pts = &self.points;
        if pts.is_empty() {
            return 0.0;
        }
        if t <= pts[0].t {
            return pts[0].v;
        }
        if t >= pts[pts.len() - 1].t {
            return pts[pts.len() - 1].v;
        }
        let idx = pts.partition_point(|p| p.t < t);
        let (a, b) = (pts[idx - 1], pts[idx]);
        let span = b.t - a.t;
        if span <= f64::EPSILON {
            return b.v;
        }
        a.v + (t - a.t) / span * (b.v - a.v)
    }
}
