pub mod catalog;
pub mod ledger;
pub mod transitions;

pub use catalog::{StageDefinition, STAGE_CATALOG};
pub use ledger::{opening_entry, StageChange, StageLedger, StageTimeline, OPENING_NOTE};
pub use transitions::{StageTransition, StageTransitionEngine, TransitionDirection};
