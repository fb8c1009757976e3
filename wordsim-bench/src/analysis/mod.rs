//! Scoring of model answers against gold data

pub mod aggregate;
pub mod alignment;
pub mod comparator;
pub mod evaluation;
pub mod stats;

pub use aggregate::{combine, CombinedScore};
pub use alignment::{AlignmentSettings, ReturnedScore, ScoreAlignmentEvaluator};
pub use comparator::{ComparisonGroup, ComparisonGrouper, ScoredExperiment};
pub use evaluation::{EvaluationResult, PairScore};
pub use stats::{normalize, pearson, Correlation};
