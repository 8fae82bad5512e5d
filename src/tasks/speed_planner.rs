// src/tasks/speed_planner.rs
//
// Speed profile generation over the cycle's planned path. Two modes:
//   stop fence set   → constant-deceleration profile ending at the fence
//   no fence         → ramp toward the cruise (or override) speed
// The profile is what the downstream trajectory assembly consumes; it is
// also what the simulation driver integrates to move the ego.

use super::{Task, TaskError};
use crate::config::PlannerConfig;
use crate::types::{SpeedPoint, SpeedProfile, TrajectoryPoint};
use crate::world::Frame;
use tracing::{debug, warn};

/// Below this remaining distance the vehicle just holds position.
const HOLD_DIST_M: f64 = 0.2;
/// Below this speed the vehicle is treated as standing for profile shaping.
const STANDSTILL_EPS_MPS: f64 = 0.3;
/// Creep speed used to close a gap to the fence from standstill.
const CREEP_SPEED_MPS: f64 = 1.0;

pub struct SpeedPlannerTask {
    cruise_speed_mps: f64,
    max_accel_mps2: f64,
    max_decel_mps2: f64,
    horizon_s: f64,
    dt_s: f64,
}

impl SpeedPlannerTask {
    pub const NAME: &'static str = "speed_planner";

    pub fn new(config: &PlannerConfig) -> Self {
        Self {
            cruise_speed_mps: config.tasks.cruise_speed_mps,
            max_accel_mps2: config.tasks.max_accel_mps2,
            max_decel_mps2: config.tasks.max_decel_mps2,
            horizon_s: config.tasks.profile_horizon_s,
            dt_s: config.tasks.profile_dt_s,
        }
    }

    fn hold_profile(&self, s0: f64) -> SpeedProfile {
        let mut profile = SpeedProfile::default();
        let mut t = 0.0;
        while t <= self.horizon_s + 1e-9 {
            profile.points.push(SpeedPoint {
                t,
                s: s0,
                v: 0.0,
                a: 0.0,
            });
            t += self.dt_s;
        }
        profile
    }

    fn stop_profile(&self, s0: f64, v0: f64, fence: f64) -> SpeedProfile {
        let dist = fence - s0;
        if dist <= HOLD_DIST_M {
            return self.hold_profile(s0);
        }

        if v0 < STANDSTILL_EPS_MPS {
            // Standing short of the fence: creep up, then stop.
            let v_creep = CREEP_SPEED_MPS.min((2.0 * self.max_decel_mps2 * dist).sqrt());
            let mut profile = SpeedProfile::default();
            let mut t = 0.0;
            let mut s = s0;
            let mut v = v0;
            while t <= self.horizon_s + 1e-9 {
                profile.points.push(SpeedPoint { t, s, v, a: 0.0 });
                let remaining = fence - s;
                let braking_v = (2.0 * self.max_decel_mps2 * remaining.max(0.0)).sqrt();
                v = v_creep.min(braking_v).min(v + self.max_accel_mps2 * self.dt_s);
                if remaining <= HOLD_DIST_M {
                    v = 0.0;
                }
                s += v * self.dt_s;
                t += self.dt_s;
            }
            return profile;
        }

        let mut decel = v0 * v0 / (2.0 * dist);
        if decel > self.max_decel_mps2 {
            warn!(
                "stop fence at {:.1}m needs {:.2}m/s² (limit {:.2}); braking at the limit",
                dist, decel, self.max_decel_mps2
            );
            decel = self.max_decel_mps2;
        }

        let mut profile = SpeedProfile::default();
        let mut t = 0.0;
        while t <= self.horizon_s + 1e-9 {
            let v = (v0 - decel * t).max(0.0);
            let s = if v > 0.0 {
                s0 + v0 * t - 0.5 * decel * t * t
            } else {
                (s0 + v0 * v0 / (2.0 * decel)).min(fence)
            };
            let a = if v > 0.0 { -decel } else { 0.0 };
            profile.points.push(SpeedPoint { t, s, v, a });
            t += self.dt_s;
        }
        profile
    }

    fn cruise_profile(&self, s0: f64, v0: f64, target: f64) -> SpeedProfile {
        let mut profile = SpeedProfile::default();
        let mut t = 0.0;
        let mut s = s0;
        let mut v = v0;
        while t <= self.horizon_s + 1e-9 {
            let a = if v < target {
                self.max_accel_mps2.min((target - v) / self.dt_s)
            } else if v > target {
                (-self.max_decel_mps2).max((target - v) / self.dt_s)
            } else {
                0.0
            };
            profile.points.push(SpeedPoint { t, s, v, a });
            v = (v + a * self.dt_s).max(0.0);
            s += v * self.dt_s;
            t += self.dt_s;
        }
        profile
    }
}

impl Task for SpeedPlannerTask {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn execute(&mut self, start: &TrajectoryPoint, frame: &mut Frame) -> Result<(), TaskError> {
        let s0 = start.path_point.s;
        let v0 = start.v.max(0.0);

        let profile = match frame.stop_point_s {
            Some(fence) => {
                debug!("stop profile: s={s0:.1} v={v0:.2} fence={fence:.1}");
                self.stop_profile(s0, v0, fence)
            }
            None => {
                let target = frame.target_speed_mps.unwrap_or(self.cruise_speed_mps);
                debug!("cruise profile: s={s0:.1} v={v0:.2} target={target:.2}");
                self.cruise_profile(s0, v0, target)
            }
        };

        frame.speed_profile = Some(profile);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SlBoundary;
    use crate::world::ReferenceLine;

    fn empty_frame() -> Frame {
        Frame::new(
            0,
            SlBoundary::new(0.0, 4.8, -1.05, 1.05),
            vec![],
            ReferenceLine::straight(200.0, 1.0, 3.5, 5.0, 5.0),
            f64::MAX,
        )
    }

    fn start_at(s: f64, v: f64) -> TrajectoryPoint {
        let mut start = TrajectoryPoint::default();
        start.path_point.s = s;
        start.v = v;
        start
    }

    #[test]
    fn test_stop_profile_reaches_zero_at_fence() {
        let mut task = SpeedPlannerTask::new(&PlannerConfig::default());
        let mut frame = empty_frame();
        frame.stop_point_s = Some(29.8);
        task.execute(&start_at(4.8, 5.0), &mut frame).unwrap();

        let profile = frame.speed_profile.unwrap();
        let last = profile.points.last().unwrap();
        // v0²/(2·d) = 25/50 = 0.5 m/s² → stops in 10 s, beyond the horizon;
        // speed must be monotonically non-increasing toward zero
        assert!(profile
            .points
            .windows(2)
            .all(|w| w[1].v <= w[0].v + 1e-9));
        assert!(last.s <= 29.8 + 1e-6);
    }

    #[test]
    fn test_hold_at_fence() {
        let mut task = SpeedPlannerTask::new(&PlannerConfig::default());
        let mut frame = empty_frame();
        frame.stop_point_s = Some(4.9);
        task.execute(&start_at(4.8, 0.0), &mut frame).unwrap();
        let profile = frame.speed_profile.unwrap();
        assert!(profile.points.iter().all(|p| p.v == 0.0));
    }

    #[test]
    fn test_creep_from_standstill_stops_before_fence() {
        let mut task = SpeedPlannerTask::new(&PlannerConfig::default());
        let mut frame = empty_frame();
        frame.stop_point_s = Some(8.0);
        task.execute(&start_at(4.8, 0.0), &mut frame).unwrap();
        let profile = frame.speed_profile.unwrap();
        assert!(profile.points.iter().any(|p| p.v > 0.0), "should creep");
        let last = profile.points.last().unwrap();
        assert!(last.s <= 8.0 + 1e-6);
        assert!(last.v < CREEP_SPEED_MPS + 1e-9);
    }

    #[test]
    fn test_cruise_ramps_to_override_speed() {
        let mut task = SpeedPlannerTask::new(&PlannerConfig::default());
        let mut frame = empty_frame();
        frame.target_speed_mps = Some(4.0);
        task.execute(&start_at(30.0, 0.5), &mut frame).unwrap();
        let profile = frame.speed_profile.unwrap();
        let last = profile.points.last().unwrap();
        assert!((last.v - 4.0).abs() < 1e-6, "ended at v={:.2}", last.v);
        assert!(last.s > 30.0);
    }
}
