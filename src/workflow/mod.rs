pub mod entity_flow;

pub use entity_flow::{EntityWorkflow, SearchOutcome, WorkflowResult, WorkflowState};
