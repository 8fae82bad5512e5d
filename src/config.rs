// src/config.rs
//
// Yaml-backed planner configuration. Loaded once at startup; validated at
// scenario init. Per-cycle code never re-reads configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub vehicle: VehicleConfig,
    pub side_pass: SidePassConfig,
    pub tasks: TaskConfig,
    pub logging: LoggingConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            vehicle: VehicleConfig::default(),
            side_pass: SidePassConfig::default(),
            tasks: TaskConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    pub length_m: f64,
    pub width_m: f64,
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            length_m: 4.8,
            width_m: 2.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SidePassConfig {
    /// How far ahead of the ego front a blocking obstacle is searched for.
    pub lookahead_distance_m: f64,
    /// Minimum lateral clearance to keep between the ego body and an
    /// obstacle edge. Doubles as the in-lane gap threshold below which an
    /// obstacle counts as blocking.
    pub min_bypass_clearance_m: f64,
    /// No lateral maneuver is started within this distance of the next
    /// junction.
    pub intersection_guard_m: f64,
    /// The wait point sits this far short of the blocking obstacle.
    pub stop_margin_m: f64,
    /// Longitudinal tolerance for "arrived at the wait point".
    pub stop_tolerance_m: f64,
    /// Speed below which the ego counts as stopped.
    pub stop_speed_eps_mps: f64,
    /// Prediction horizon for the pass-window check.
    pub safety_horizon_s: f64,
    /// Consecutive cycles the pass window must stay clear before the pass
    /// commits.
    pub safety_confirm_cycles: u32,
    /// Dispatcher retry budget: consecutive failed cycles before the
    /// scenario is force-exited.
    pub max_consecutive_failures: u32,
    /// Ordered task grouping per stage. Stage and task names are resolved
    /// at init; an unknown name is a fatal error.
    pub stage_tasks: Vec<StageTaskGroup>,
}

impl Default for SidePassConfig {
    fn default() -> Self {
        Self {
            lookahead_distance_m: 50.0,
            min_bypass_clearance_m: 0.3,
            intersection_guard_m: 10.0,
            stop_margin_m: 5.0,
            stop_tolerance_m: 0.5,
            stop_speed_eps_mps: 0.2,
            safety_horizon_s: 8.0,
            safety_confirm_cycles: 3,
            max_consecutive_failures: 20,
            stage_tasks: default_stage_tasks(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTaskGroup {
    pub stage: String,
    pub tasks: Vec<String>,
}

fn default_stage_tasks() -> Vec<StageTaskGroup> {
    let group = |stage: &str, tasks: &[&str]| StageTaskGroup {
        stage: stage.to_string(),
        tasks: tasks.iter().map(|t| t.to_string()).collect(),
    };
    vec![
        group(
            "obstacle_approach",
            &["lane_keep_path", "path_decider", "speed_planner"],
        ),
        group("path_generation", &["bypass_path_generator", "path_decider"]),
        group(
            "waitpoint_stop",
            &["lane_keep_path", "path_decider", "speed_planner"],
        ),
        group(
            "safety_detection",
            &["lane_keep_path", "path_decider", "speed_planner"],
        ),
        group("obstacle_pass", &["path_decider", "speed_planner"]),
    ]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Station step between generated path points.
    pub path_resolution_m: f64,
    /// Length of the path generated each cycle.
    pub plan_horizon_m: f64,
    /// Longitudinal length of the lateral ramp into / out of the bypass.
    pub lateral_taper_m: f64,
    /// Extra lateral margin added on top of the minimum clearance when
    /// placing the bypass path beside an obstacle.
    pub nudge_buffer_m: f64,
    pub cruise_speed_mps: f64,
    /// Target speed while executing the bypass.
    pub pass_speed_mps: f64,
    pub max_accel_mps2: f64,
    pub max_decel_mps2: f64,
    /// Time horizon of generated speed profiles.
    pub profile_horizon_s: f64,
    pub profile_dt_s: f64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            path_resolution_m: 1.0,
            plan_horizon_m: 80.0,
            lateral_taper_m: 10.0,
            nudge_buffer_m: 0.2,
            cruise_speed_mps: 5.0,
            pass_speed_mps: 4.0,
            max_accel_mps2: 1.0,
            max_decel_mps2: 2.0,
            profile_horizon_s: 8.0,
            profile_dt_s: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PlannerConfig {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config file {path}"))?;
        let config: PlannerConfig =
            serde_yaml::from_str(&contents).with_context(|| format!("parsing {path}"))?;
        Ok(config)
    }

    /// Structural validation of everything that must hold before a scenario
    /// may activate. Name resolution (stages, tasks) happens at scenario
    /// init where the registries live.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let positive = [
            ("vehicle.length_m", self.vehicle.length_m),
            ("vehicle.width_m", self.vehicle.width_m),
            (
                "side_pass.lookahead_distance_m",
                self.side_pass.lookahead_distance_m,
            ),
            (
                "side_pass.min_bypass_clearance_m",
                self.side_pass.min_bypass_clearance_m,
            ),
            (
                "side_pass.intersection_guard_m",
                self.side_pass.intersection_guard_m,
            ),
            ("side_pass.stop_margin_m", self.side_pass.stop_margin_m),
            ("side_pass.stop_tolerance_m", self.side_pass.stop_tolerance_m),
            ("side_pass.safety_horizon_s", self.side_pass.safety_horizon_s),
            ("tasks.path_resolution_m", self.tasks.path_resolution_m),
            ("tasks.plan_horizon_m", self.tasks.plan_horizon_m),
            ("tasks.lateral_taper_m", self.tasks.lateral_taper_m),
            ("tasks.cruise_speed_mps", self.tasks.cruise_speed_mps),
            ("tasks.pass_speed_mps", self.tasks.pass_speed_mps),
            ("tasks.max_accel_mps2", self.tasks.max_accel_mps2),
            ("tasks.max_decel_mps2", self.tasks.max_decel_mps2),
            ("tasks.profile_dt_s", self.tasks.profile_dt_s),
        ];
        for (name, value) in positive {
            if value <= 0.0 {
                return Err(format!("{name} must be positive, got {value}"));
            }
        }
        if self.side_pass.stop_speed_eps_mps < 0.0 {
            return Err("side_pass.stop_speed_eps_mps must be non-negative".to_string());
        }
        if self.side_pass.safety_confirm_cycles == 0 {
            return Err("side_pass.safety_confirm_cycles must be at least 1".to_string());
        }
        if self.side_pass.stage_tasks.is_empty() {
            return Err("side_pass.stage_tasks must not be empty".to_string());
        }
        for group in &self.side_pass.stage_tasks {
            if group.tasks.is_empty() {
                return Err(format!("stage `{}` has an empty task list", group.stage));
            }
        }
        Ok(())
    }
}
