use serde::{Deserialize, Serialize};

use crate::domain::stage::Stage;
use crate::errors::DomainError;
use crate::lifecycle::catalog::{self, definition};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionDirection {
    Forward,
    Rollback,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: Stage,
    pub to: Stage,
    pub direction: TransitionDirection,
}

/// Linear stage machine: one step forward, or undo exactly one step.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageTransitionEngine;

impl StageTransitionEngine {
    pub fn next_stage(&self, current: Stage) -> Option<Stage> {
        catalog::by_ordinal(current.ordinal() + 1).map(|entry| entry.stage)
    }

    pub fn previous_stage(&self, current: Stage) -> Option<Stage> {
        catalog::by_ordinal(current.ordinal() - 1).map(|entry| entry.stage)
    }

    pub fn can_transition(&self, from: Stage, to: Stage) -> bool {
        self.direction(from, to).is_some()
    }

    pub fn completion_percentage(&self, stage: Stage) -> u8 {
        definition(stage).completion_percentage
    }

    pub fn validate(&self, from: Stage, to: Stage) -> Result<StageTransition, DomainError> {
        self.direction(from, to)
            .map(|direction| StageTransition { from, to, direction })
            .ok_or(DomainError::InvalidStageTransition { from, to })
    }

    fn direction(&self, from: Stage, to: Stage) -> Option<TransitionDirection> {
        if self.next_stage(from) == Some(to) {
            Some(TransitionDirection::Forward)
        } else if self.next_stage(to) == Some(from) {
            Some(TransitionDirection::Rollback)
        } else {
            None
        }
    }
}
