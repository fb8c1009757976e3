//! Prompt generators
//!
//! A generator turns one variable combination and its dataset partition into
//! a [`Prompt`]. It is called again for every trial, so randomized pair
//! sampling differs from run to run.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{JobType, Prompt, TurnPrompt, WordPair};
use crate::dataset::{DatasetPartition, Range};
use crate::experiment::variables::{ExpVars, LANGUAGE};

/// Inputs a generator may draw on besides the variables
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub partition: &'a DatasetPartition,
    /// Scale the model is asked to answer on
    pub target: Range,
}

/// Builds prompts for a variable combination
pub trait PromptGenerator: Send + Sync {
    fn id(&self) -> &str;

    fn job_type(&self) -> JobType;

    /// Generate a prompt. `vars` never contains the prompt variable itself.
    fn generate(&self, vars: &ExpVars, ctx: &PromptContext<'_>, rng: &mut dyn RngCore) -> Prompt;
}

/// Text template with `{pairs}`, `{min}`, `{max}`, `{measure}` and
/// `{language}` placeholders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub job_type: JobType,
    pub text: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Ask only a random sample of this many pairs
    #[serde(default)]
    pub sample_size: Option<usize>,
}

fn default_batch_size() -> usize {
    10
}

const DEFAULT_TEXT: &str = "Rate the semantic {measure} of each of the following {language} word pairs \
on a scale from {min} (not at all) to {max} (identical meaning). \
Answer with the `scores` tool, one entry per pair.\n\n{pairs}";

impl PromptTemplate {
    pub fn new(id: impl Into<String>, job_type: JobType, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_type,
            text: text.into(),
            batch_size: default_batch_size(),
            sample_size: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = Some(sample_size);
        self
    }

    /// Built-in templates, one per job type
    pub fn defaults() -> Vec<PromptTemplate> {
        vec![
            PromptTemplate::new("single", JobType::Single, DEFAULT_TEXT).with_sample_size(20),
            PromptTemplate::new("batched", JobType::Batched, DEFAULT_TEXT),
            PromptTemplate::new("all-pairs", JobType::AllPairs, DEFAULT_TEXT),
        ]
    }

    fn render(&self, pairs: &[WordPair], vars: &ExpVars, ctx: &PromptContext<'_>) -> String {
        let listing = pairs
            .iter()
            .map(|p| format!("- {}, {}", p.first(), p.second()))
            .collect::<Vec<_>>()
            .join("\n");
        let language = vars.get(LANGUAGE).unwrap_or(&ctx.partition.language);

        self.text
            .replace("{pairs}", &listing)
            .replace("{min}", &format_bound(ctx.target.min))
            .replace("{max}", &format_bound(ctx.target.max))
            .replace("{measure}", ctx.partition.measure_type.as_str())
            .replace("{language}", language)
    }
}

fn format_bound(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

impl PromptGenerator for PromptTemplate {
    fn id(&self) -> &str {
        &self.id
    }

    fn job_type(&self) -> JobType {
        self.job_type
    }

    fn generate(&self, vars: &ExpVars, ctx: &PromptContext<'_>, rng: &mut dyn RngCore) -> Prompt {
        let mut seen = HashSet::new();
        let mut pairs: Vec<WordPair> = ctx
            .partition
            .data
            .iter()
            .map(|e| WordPair::new(&e.term1, &e.term2))
            .filter(|p| seen.insert(p.key()))
            .collect();

        pairs.shuffle(rng);
        if let Some(n) = self.sample_size {
            pairs.truncate(n);
        }

        let chunk_size = match self.job_type {
            JobType::Single => 1,
            JobType::Batched => self.batch_size.max(1),
            JobType::AllPairs => pairs.len().max(1),
        };

        let turns = pairs
            .chunks(chunk_size)
            .map(|chunk| TurnPrompt {
                text: self.render(chunk, vars, ctx),
                pairs: chunk.to_vec(),
            })
            .collect();

        Prompt {
            id: self.id.clone(),
            job_type: self.job_type,
            turns,
        }
    }
}
