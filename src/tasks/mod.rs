// src/tasks/mod.rs
//
// Configurable computation units run by the scenario layer against one
// reference line per cycle. Each task consumes the planning start point and
// the mutable frame, leaving its result attached to the frame.
//
// Tasks are built once from configuration at scenario init and owned
// outright by the scenario; the list is never re-registered per cycle.

pub mod path_decider;
pub mod path_generator;
pub mod speed_planner;

pub use path_decider::PathDeciderTask;
pub use path_generator::{BypassPathTask, LaneKeepPathTask};
pub use speed_planner::SpeedPlannerTask;

use crate::config::PlannerConfig;
use crate::types::TrajectoryPoint;
use crate::world::Frame;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskError {
    /// Transient failure; the same stage retries next cycle.
    #[error("{0}")]
    Failed(String),
    /// No feasible lateral corridor exists. Not retryable with the same
    /// world state.
    #[error("no feasible corridor: {0}")]
    Infeasible(String),
    /// The path under validation collides with an obstacle.
    #[error("path blocked by obstacle {obstacle_id}")]
    PathBlocked { obstacle_id: u32 },
}

pub trait Task {
    fn name(&self) -> &'static str;

    fn execute(&mut self, start: &TrajectoryPoint, frame: &mut Frame) -> Result<(), TaskError>;
}

/// Resolve a configured task name to an instance. None for unknown names —
/// the caller turns that into a fatal init error.
pub fn build_task(name: &str, config: &PlannerConfig) -> Option<Box<dyn Task>> {
    match name {
        LaneKeepPathTask::NAME => Some(Box::new(LaneKeepPathTask::new(config))),
        BypassPathTask::NAME => Some(Box::new(BypassPathTask::new(config))),
        PathDeciderTask::NAME => Some(Box::new(PathDeciderTask::new(config))),
        SpeedPlannerTask::NAME => Some(Box::new(SpeedPlannerTask::new(config))),
        _ => None,
    }
}
