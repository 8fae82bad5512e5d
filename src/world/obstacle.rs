// src/world/obstacle.rs

use crate::types::SlBoundary;
use serde::{Deserialize, Serialize};

/// Longitudinal decision attached to an obstacle by the upstream decision
/// layer. `Stop` marks a hard blocking condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionTag {
    Stop,
    Follow,
    Ignore,
    Nudge,
}

impl DecisionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stop => "STOP",
            Self::Follow => "FOLLOW",
            Self::Ignore => "IGNORE",
            Self::Nudge => "NUDGE",
        }
    }
}

/// An obstacle projected onto the active reference line: SL footprint plus
/// the signed longitudinal speed (negative = oncoming).
#[derive(Debug, Clone)]
pub struct Obstacle {
    pub id: u32,
    pub sl_boundary: SlBoundary,
    pub decision: DecisionTag,
    pub speed_mps: f64,
}

impl Obstacle {
    pub fn new_static(id: u32, sl_boundary: SlBoundary, decision: DecisionTag) -> Self {
        Self {
            id,
            sl_boundary,
            decision,
            speed_mps: 0.0,
        }
    }

    pub fn is_static(&self) -> bool {
        self.speed_mps.abs() < 0.1
    }

    pub fn is_oncoming(&self) -> bool {
        self.speed_mps < -0.1
    }
}
