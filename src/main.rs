// src/main.rs
//
// Simulation driver: builds a synthetic world (straight road, one static
// blocking obstacle ahead), then drives the scenario dispatcher cycle by
// cycle until the side-pass maneuver completes. The planner itself never
// sees the simulation — it only consumes frames, like in the real stack.

mod config;
mod planning;
mod tasks;
mod types;
mod world;

use anyhow::Result;
use config::PlannerConfig;
use planning::{
    LaneFollowScenario, PlanningMetrics, Scenario, ScenarioDispatcher, SidePassScenario,
};
use std::path::Path;
use tracing::info;
use types::{SlBoundary, TrajectoryPoint};
use world::{DecisionTag, Frame, Obstacle, ReferenceLine};

const CYCLE_DT_S: f64 = 0.1;
const MAX_CYCLES: u64 = 3000;

fn main() -> Result<()> {
    let config = if Path::new("config.yaml").exists() {
        PlannerConfig::load("config.yaml")?
    } else {
        PlannerConfig::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!("side_pass_planner={}", config.logging.level))
        .init();

    info!("🚗 side-pass planner simulation starting");

    let metrics = PlanningMetrics::new();
    let scenarios: Vec<Box<dyn Scenario>> = vec![
        Box::new(LaneFollowScenario::new(config.clone())),
        Box::new(SidePassScenario::new(config.clone(), metrics.clone())),
    ];
    let mut dispatcher = ScenarioDispatcher::new(
        scenarios,
        config.side_pass.max_consecutive_failures,
        metrics.clone(),
    );
    dispatcher.init_all()?;
    info!("✓ dispatcher ready");

    // Straight 300m road; a stalled vehicle blocks the lane 30m ahead
    let line = ReferenceLine::straight(300.0, 1.0, 3.5, 5.0, 5.0);
    let obstacle = Obstacle::new_static(
        1,
        SlBoundary::new(34.8, 39.8, -1.2, 0.8),
        DecisionTag::Stop,
    );
    info!(
        "world: obstacle {} at s=[{:.1}, {:.1}], l=[{:.1}, {:.1}]",
        obstacle.id,
        obstacle.sl_boundary.start_s,
        obstacle.sl_boundary.end_s,
        obstacle.sl_boundary.start_l,
        obstacle.sl_boundary.end_l
    );

    let half_width = config.vehicle.width_m / 2.0;
    let mut front_s = config.vehicle.length_m;
    let mut v = config.tasks.cruise_speed_mps;
    let mut lateral = 0.0_f64;

    for cycle in 0..MAX_CYCLES {
        let ego_sl = SlBoundary::new(
            front_s - config.vehicle.length_m,
            front_s,
            lateral - half_width,
            lateral + half_width,
        );
        let mut frame = Frame::new(cycle, ego_sl, vec![obstacle.clone()], line.clone(), f64::MAX);
        let mut start = TrajectoryPoint::default();
        start.path_point.s = front_s;
        start.path_point.x = front_s;
        start.path_point.y = lateral;
        start.v = v;

        dispatcher.run_cycle(&start, &mut frame);

        // Apply the cycle's outputs back to the simulated ego
        if let Some(profile) = &frame.speed_profile {
            let v_next = profile.v_at(CYCLE_DT_S);
            front_s += (v + v_next) / 2.0 * CYCLE_DT_S;
            v = v_next;
        }
        if let Some(path) = &frame.planned_path {
            if let Some(l) = path.l_at_s(front_s) {
                lateral = l;
            }
        }

        if cycle % 50 == 0 {
            info!(
                "cycle {cycle}: scenario={} s={:.1} v={:.2} l={:.2}",
                dispatcher.active_name(),
                front_s,
                v,
                lateral
            );
        }

        if metrics.summary().maneuvers_completed > 0
            && front_s > obstacle.sl_boundary.end_s + 20.0
        {
            info!("✅ bypass finished, ego well clear of the obstacle");
            break;
        }
    }

    let summary = metrics.summary();
    info!("run summary:\n{}", serde_json::to_string_pretty(&summary)?);
    if summary.maneuvers_completed == 0 {
        info!("⚠️  maneuver did not complete within {MAX_CYCLES} cycles");
    }
    Ok(())
}
