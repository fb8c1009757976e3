//! Experiment orchestration
//!
//! [`ExperimentSession::run`] walks the variable combinations in expansion
//! order. Every combination resolves its dataset, prompt template and model,
//! runs its trials one after another, evaluates them and hands the record to
//! the result sink. Everything accumulated lives in a [`RunContext`] owned by
//! the caller, so a caller that stops the run early can still pass the
//! context to [`ExperimentSession::finish`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::definition::ExperimentDefinition;
use super::variables::{expand, ExpVars, DATASET, JOB_TYPE, LANGUAGE, MEASURE_TYPE, MODEL, PROMPT};
use crate::analysis::{
    combine, CombinedScore, ComparisonGrouper, EvaluationResult, ReturnedScore, ScoreAlignmentEvaluator,
    ScoredExperiment,
};
use crate::config::Config;
use crate::dataset::{load_partition, DatasetPartition, LoadError};
use crate::prompts::{JobType, PromptContext, PromptGenerator, PromptTemplate};
use crate::providers::{ModelCapability, ModelRegistry, ProviderError};
use crate::reporting::{ExperimentSummary, ReportError, ResultSink, RunSummary};
use crate::runner::{ContractError, ScoresContract, TrialConversationRunner, TrialResult, TrialSettings};
use crate::usage::UsageTotals;

/// Errors that stop a session
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("Report error: {0}")]
    Report(#[from] ReportError),
}

/// Why one combination could not be run
#[derive(Debug, thiserror::Error)]
enum ResolveError {
    #[error("variable {0} is not set")]
    MissingVariable(&'static str),

    #[error("dataset {path}: {source}")]
    Dataset { path: String, source: LoadError },

    #[error("unknown prompt template {0}")]
    UnknownPrompt(String),

    #[error("model: {0}")]
    Provider(#[from] ProviderError),
}

/// State accumulated over one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Usage of every model call made so far, win or lose
    pub usage: UsageTotals,
    pub experiments: Vec<ExperimentRecord>,
    /// Combinations left out by a filter variable
    pub skipped: Vec<ExpVars>,
}

impl RunContext {
    pub fn new() -> Self {
        let started_at = Utc::now();
        Self {
            run_id: started_at.format("%Y%m%d-%H%M%S").to_string(),
            started_at,
            usage: UsageTotals::new(),
            experiments: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolved facts about a combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMeta {
    pub index: usize,
    pub experiment: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub model_id: Option<String>,
    pub dataset_id: Option<String>,
    pub prompt_id: Option<String>,
    pub job_type: Option<JobType>,
    /// Set when the combination could not be resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the result sink failed to save the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
}

/// One trial and its verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: TrialResult,
    pub evaluation: EvaluationResult,
}

/// Everything recorded for one variable combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRecord {
    pub variables: ExpVars,
    pub meta: ExperimentMeta,
    pub usage: UsageTotals,
    pub results: Vec<TrialRecord>,
    pub summary: CombinedScore,
}

impl ExperimentRecord {
    fn new(index: usize, experiment: &str, variables: ExpVars) -> Self {
        Self {
            variables,
            meta: ExperimentMeta {
                index,
                experiment: experiment.to_string(),
                started_at: Utc::now(),
                completed_at: None,
                model_id: None,
                dataset_id: None,
                prompt_id: None,
                job_type: None,
                error: None,
                write_error: None,
            },
            usage: UsageTotals::new(),
            results: Vec::new(),
            summary: CombinedScore::default(),
        }
    }

    pub fn scored(&self) -> ScoredExperiment {
        ScoredExperiment {
            variables: self.variables.clone(),
            score: self.summary.avg,
        }
    }
}

enum Plan {
    Skip(String),
    Run(Resolved),
}

struct Resolved {
    partition: Arc<DatasetPartition>,
    template: PromptTemplate,
    model: Arc<dyn ModelCapability>,
}

/// Runs every combination of one experiment definition
pub struct ExperimentSession {
    definition: ExperimentDefinition,
    registry: ModelRegistry,
    sink: Box<dyn ResultSink>,
    runner: TrialConversationRunner,
    evaluator: ScoreAlignmentEvaluator,
    grouper: ComparisonGrouper,
    contract: ScoresContract,
    rng: StdRng,
    dataset_root: Option<PathBuf>,
    datasets: HashMap<PathBuf, Arc<DatasetPartition>>,
}

impl ExperimentSession {
    pub fn new(
        definition: ExperimentDefinition,
        registry: ModelRegistry,
        sink: Box<dyn ResultSink>,
    ) -> Result<Self, SessionError> {
        let contract = ScoresContract::new()?.with_require_complete(definition.require_complete);
        let rng = match definition.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            definition,
            registry,
            sink,
            runner: TrialConversationRunner::default(),
            evaluator: ScoreAlignmentEvaluator::default(),
            grouper: ComparisonGrouper::default(),
            contract,
            rng,
            dataset_root: None,
            datasets: HashMap::new(),
        })
    }

    /// Apply runner and evaluation settings from the application config
    pub fn with_config(self, config: &Config) -> Self {
        let mut session = self.with_trial_settings(config.runner.trial_settings());
        session.evaluator = ScoreAlignmentEvaluator::new(config.evaluation.alignment_settings());
        session.grouper = ComparisonGrouper::with_precision(config.evaluation.score_precision);
        session
    }

    pub fn with_trial_settings(mut self, settings: TrialSettings) -> Self {
        self.runner = TrialConversationRunner::new(settings);
        self
    }

    /// Resolve relative dataset paths against `root`
    pub fn with_dataset_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.dataset_root = Some(root.into());
        self
    }

    pub fn definition(&self) -> &ExperimentDefinition {
        &self.definition
    }

    /// Run every combination, pushing each finished record into `ctx`.
    ///
    /// Failures of one combination are recorded on its record and the run
    /// moves on to the next.
    pub async fn run(&mut self, ctx: &mut RunContext) {
        let combinations = expand(&self.definition.matrix());
        tracing::info!(
            "Experiment {}: {} combination(s), {} trial(s) each",
            self.definition.name,
            combinations.len(),
            self.definition.trials
        );

        let total = combinations.len();
        for (index, vars) in combinations.into_iter().enumerate() {
            tracing::info!("[{}/{}] {}", index + 1, total, vars.label());
            self.run_combination(index, vars, ctx).await;
        }
    }

    /// Build comparison tables from whatever `ctx` holds and write the summary
    pub fn finish(&mut self, ctx: &RunContext, interrupted: bool) -> Result<RunSummary, SessionError> {
        let variables = self.definition.matrix().active_names();
        let scored: Vec<ScoredExperiment> = ctx.experiments.iter().map(ExperimentRecord::scored).collect();
        let comparisons = self.grouper.compare(&variables, &scored);

        let summary = RunSummary {
            run_id: ctx.run_id.clone(),
            experiment: self.definition.name.clone(),
            started_at: ctx.started_at,
            completed_at: Utc::now(),
            interrupted,
            variables,
            experiments: ctx.experiments.iter().map(ExperimentSummary::from).collect(),
            skipped: ctx.skipped.len(),
            usage: ctx.usage.clone(),
            comparisons,
        };

        self.sink.write_summary(&summary)?;
        if interrupted {
            tracing::warn!(
                "Run {} interrupted after {} combination(s)",
                summary.run_id,
                summary.experiments.len()
            );
        }
        Ok(summary)
    }

    async fn run_combination(&mut self, index: usize, vars: ExpVars, ctx: &mut RunContext) {
        let mut record = ExperimentRecord::new(index, &self.definition.name, vars);

        let resolved = match self.resolve(&record.variables) {
            Ok(Plan::Run(resolved)) => resolved,
            Ok(Plan::Skip(reason)) => {
                tracing::info!("Skipping {}: {}", record.variables.label(), reason);
                ctx.skipped.push(record.variables);
                return;
            }
            Err(e) => {
                tracing::warn!("Cannot run {}: {}", record.variables.label(), e);
                let failure = EvaluationResult::exception(&e);
                record.summary = combine([&failure]);
                record.meta.error = Some(e.to_string());
                self.store(record, ctx);
                return;
            }
        };

        record.meta.model_id = Some(resolved.model.id().to_string());
        record.meta.dataset_id = Some(resolved.partition.id.clone());
        record.meta.prompt_id = Some(resolved.template.id.clone());
        record.meta.job_type = Some(resolved.template.job_type);

        let prompt_vars = record.variables.without(PROMPT);
        let prompt_ctx = PromptContext {
            partition: &resolved.partition,
            target: self.evaluator.settings().target,
        };

        for trial in 0..self.definition.trials {
            let prompt = resolved.template.generate(&prompt_vars, &prompt_ctx, &mut self.rng);
            let result = self
                .runner
                .run(resolved.model.as_ref(), &self.contract, &prompt, &mut ctx.usage)
                .await;

            if let Err(e) = record.usage.merge_totals(&result.usage) {
                tracing::warn!("Usage of trial {} not recorded: {}", trial + 1, e);
            }

            let evaluation = self.evaluate(&resolved.partition, &result);
            tracing::info!(
                "  trial {}/{}: {} ({} call(s))",
                trial + 1,
                self.definition.trials,
                evaluation,
                result.total_tries
            );
            record.results.push(TrialRecord {
                trial: result,
                evaluation,
            });
        }

        record.summary = combine(record.results.iter().map(|r| &r.evaluation));
        tracing::info!("  average score {:.3}", record.summary.avg);
        self.store(record, ctx);
    }

    /// Hand the record to the sink and keep it in `ctx`. A failed write is
    /// noted on the record and does not stop the run.
    fn store(&mut self, mut record: ExperimentRecord, ctx: &mut RunContext) {
        record.meta.completed_at = Some(Utc::now());
        if let Err(e) = self.sink.write_experiment(&record) {
            tracing::error!("Could not save {}: {}", record.variables.label(), e);
            record.meta.write_error = Some(e.to_string());
        }
        ctx.experiments.push(record);
    }

    fn evaluate(&self, partition: &DatasetPartition, result: &TrialResult) -> EvaluationResult {
        if !result.success {
            return result
                .last_failure()
                .cloned()
                .unwrap_or_else(|| EvaluationResult::exception("trial failed without a recorded failure"));
        }

        let payloads = result.data.as_deref().unwrap_or_default();
        let returned = ReturnedScore::from_payloads(payloads);
        self.evaluator
            .evaluate(partition, &result.prompt.asked_pairs(), &returned)
    }

    fn resolve(&mut self, vars: &ExpVars) -> Result<Plan, ResolveError> {
        let dataset = vars.get(DATASET).ok_or(ResolveError::MissingVariable(DATASET))?;
        let partition = self.partition(dataset)?;

        if !partition.matches(vars.get(LANGUAGE), vars.get(MEASURE_TYPE)) {
            return Ok(Plan::Skip(format!(
                "partition {} is {} {}",
                partition.id, partition.language, partition.measure_type
            )));
        }

        let prompt_id = vars.get(PROMPT).ok_or(ResolveError::MissingVariable(PROMPT))?;
        let template = self
            .definition
            .template(prompt_id)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownPrompt(prompt_id.to_string()))?;

        if let Some(job_type) = vars.get(JOB_TYPE) {
            if JobType::from_str(job_type).ok() != Some(template.job_type) {
                return Ok(Plan::Skip(format!(
                    "template {} is {}",
                    template.id, template.job_type
                )));
            }
        }

        let model_spec = vars.get(MODEL).ok_or(ResolveError::MissingVariable(MODEL))?;
        let model = self.registry.resolve(model_spec)?;

        Ok(Plan::Run(Resolved {
            partition,
            template,
            model,
        }))
    }

    fn partition(&mut self, path: &str) -> Result<Arc<DatasetPartition>, ResolveError> {
        let full = match &self.dataset_root {
            Some(root) if Path::new(path).is_relative() => root.join(path),
            _ => PathBuf::from(path),
        };

        if let Some(partition) = self.datasets.get(&full) {
            return Ok(partition.clone());
        }

        let partition = load_partition(&full).map_err(|source| ResolveError::Dataset {
            path: path.to_string(),
            source,
        })?;
        tracing::debug!("Loaded partition {} ({} pairs)", partition.id, partition.data.len());

        let partition = Arc::new(partition);
        self.datasets.insert(full, partition.clone());
        Ok(partition)
    }
}
