//! Experiment definitions, variable expansion and orchestration

pub mod definition;
pub mod session;
pub mod variables;

pub use definition::{DefinitionError, DefinitionResult, ExperimentDefinition};
pub use session::{
    ExperimentMeta, ExperimentRecord, ExperimentSession, RunContext, SessionError, TrialRecord,
};
pub use variables::{expand, ExpVarMatrix, ExpVars, VariableAxis};
