//! Workflow state and the control-loop state machine.

mod machine;
mod state;

pub use machine::{
    start, step, Effect, Event, LoopPolicy, DEFAULT_K, DEFAULT_MAX_RETRIES,
    DEFAULT_RELAXED_K_FACTOR,
};
pub use state::{Phase, WorkflowState};
