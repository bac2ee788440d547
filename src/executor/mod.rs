pub mod context;
pub mod engine;
pub mod error;
mod iterative;
mod test_execution;

pub use context::build_interpolation_context;
pub use engine::{StepReport, WorkflowExecutor};
pub use error::ExecutorError;
