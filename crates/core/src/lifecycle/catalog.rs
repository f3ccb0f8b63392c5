use serde::Serialize;

use crate::domain::stage::Stage;

/// Fixed description of one production stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct StageDefinition {
    pub stage: Stage,
    pub ordinal: u8,
    pub label: &'static str,
    pub completion_percentage: u8,
}

/// Ordered by ordinal; index `i` holds ordinal `i + 1`.
pub const STAGE_CATALOG: [StageDefinition; 4] = [
    StageDefinition {
        stage: Stage::Survey,
        ordinal: 1,
        label: "Survey",
        completion_percentage: 25,
    },
    StageDefinition {
        stage: Stage::Designing,
        ordinal: 2,
        label: "Designing",
        completion_percentage: 50,
    },
    StageDefinition {
        stage: Stage::ProductionAndInstallation,
        ordinal: 3,
        label: "Production & Installation",
        completion_percentage: 75,
    },
    StageDefinition {
        stage: Stage::AcceptanceAndDelivery,
        ordinal: 4,
        label: "Acceptance & Delivery",
        completion_percentage: 100,
    },
];

pub fn definition(stage: Stage) -> &'static StageDefinition {
    &STAGE_CATALOG[usize::from(stage.ordinal() - 1)]
}

pub fn by_ordinal(ordinal: u8) -> Option<&'static StageDefinition> {
    usize::from(ordinal).checked_sub(1).and_then(|index| STAGE_CATALOG.get(index))
}

pub fn initial_stage() -> Stage {
    STAGE_CATALOG[0].stage
}

pub fn terminal_stage() -> Stage {
    STAGE_CATALOG[STAGE_CATALOG.len() - 1].stage
}
