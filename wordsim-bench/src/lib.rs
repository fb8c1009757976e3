//! Word-pair similarity benchmark for LLMs
//!
//! This crate runs experiments that ask language models to rate the semantic
//! similarity or relatedness of word pairs and grades the answers against
//! human gold scores.
//!
//! # Features
//!
//! - Experiment definitions whose variables expand into every combination
//! - Single, batched and all-pairs prompt layouts
//! - Retrying multi-turn conversations with schema-checked tool answers
//! - Pearson correlation against gold values mapped onto a common scale
//! - Token usage and cost accounting per model
//! - Pairwise comparison tables across variables
//!
//! # Example
//!
//! ```no_run
//! use wordsim_bench::{
//!     config::Config,
//!     experiment::{ExperimentDefinition, ExperimentSession, RunContext},
//!     providers::ModelRegistry,
//!     reporting::{print_console_report, JsonResultSink},
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default();
//!     let definition = ExperimentDefinition::from_file("experiments/sample.toml")?;
//!
//!     let mut ctx = RunContext::new();
//!     let sink = JsonResultSink::create(&config.output.output_dir, &ctx.run_id)?;
//!     let mut session = ExperimentSession::new(definition, ModelRegistry::new(&config), Box::new(sink))?
//!         .with_config(&config);
//!
//!     session.run(&mut ctx).await;
//!     let summary = session.finish(&ctx, false)?;
//!     print_console_report(&summary);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod dataset;
pub mod experiment;
pub mod prompts;
pub mod providers;
pub mod reporting;
pub mod runner;
pub mod usage;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{
        combine, CombinedScore, ComparisonGroup, ComparisonGrouper, EvaluationResult, ReturnedScore,
        ScoreAlignmentEvaluator,
    };
    pub use crate::config::Config;
    pub use crate::dataset::{load_partition, DatasetPartition, MeasureType, Range};
    pub use crate::experiment::{
        expand, ExpVarMatrix, ExpVars, ExperimentDefinition, ExperimentRecord, ExperimentSession,
        RunContext,
    };
    pub use crate::prompts::{JobType, Prompt, PromptGenerator, PromptTemplate, WordPair};
    pub use crate::providers::{
        AnthropicClient, ModelCapability, ModelRegistry, ModelResponse, OpenAIClient, ProviderError,
        ProviderResult, ResponseTool,
    };
    pub use crate::reporting::{print_console_report, JsonResultSink, ResultSink, RunSummary};
    pub use crate::runner::{ResponseContract, ScoresContract, TrialConversationRunner, TrialResult, TrialSettings};
    pub use crate::usage::{Pricing, Usage, UsageTotals};
}
