pub mod defaults;
pub mod error;
pub mod interpolate;
pub mod load;
pub mod model;

pub use defaults::{default_reviewer_verifier_map, default_workflow, write_default_workflow};
pub use error::DefinitionError;
pub use interpolate::{interpolate, interpolate_outputs, InterpolationContext};
pub use load::{load_from_file, load_from_string};
pub use model::{
    IterativePhase, PhaseDefinition, TestExecutionPhase, VariableValue, WorkflowDefinition,
};
