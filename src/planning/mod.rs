// src/planning/mod.rs
//
// Scenario layer. Decision flow per cycle:
//   dispatcher → is_transferable gates → active scenario → stage handlers
//               → task runner → frame outputs
//
// `side_pass` owns the maneuver state machine; `lane_follow` is the default
// scenario every cycle falls back to.

pub mod lane_follow;
pub mod metrics;
pub mod predicates;
pub mod scenario;
pub mod side_pass;

pub use lane_follow::LaneFollowScenario;
pub use metrics::{MetricsSummary, PlanningMetrics};
pub use scenario::{PlanningError, Scenario, ScenarioDispatcher};
pub use side_pass::{SidePassScenario, Stage, StageAdvance, StageSignal};
