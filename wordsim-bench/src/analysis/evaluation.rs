//! Evaluation outcomes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::stats::Correlation;
use crate::prompts::WordPair;

/// Score attached to a word pair, on either the model or the gold side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub pair: WordPair,
    pub score: f64,
}

impl PairScore {
    pub fn new(pair: WordPair, score: f64) -> Self {
        Self { pair, score }
    }
}

/// Outcome of validating or evaluating a model answer.
///
/// Turn-level failures and trial-level verdicts share this type, so a failed
/// trial reports the failure that ended it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EvaluationResult {
    /// The model call itself failed
    ExceptionThrown { error: String },
    /// The model returned no text
    NoData,
    /// The returned text was not JSON
    JsonSyntaxError { got: String, error: String },
    /// The JSON did not match the response schema
    JsonSchemaError { got: Value, errors: Vec<String> },
    /// The acceptance predicate rejected the answer
    InvalidData { got: Value, reason: String },
    /// No returned score could be used
    NonUsableData {
        #[serde(default)]
        got: Vec<PairScore>,
    },
    /// Too few answered pairs to trust a correlation
    InsufficientData {
        got: Vec<PairScore>,
        expected: Vec<PairScore>,
        matched: usize,
        asked: usize,
    },
    /// The answered pairs are not the asked pairs
    MismatchedData {
        got: Vec<PairScore>,
        asked: Vec<WordPair>,
    },
    DataCorrect {
        got: Vec<PairScore>,
        expected: Vec<PairScore>,
        correlation: Correlation,
    },
    DataPartiallyIncorrect {
        got: Vec<PairScore>,
        expected: Vec<PairScore>,
        correlation: Correlation,
        score: f64,
    },
    DataIncomplete { percentage: f64 },
    DataIncorrect,
}

impl EvaluationResult {
    /// Stable kebab-case name of the variant
    pub fn tag(&self) -> &'static str {
        match self {
            EvaluationResult::ExceptionThrown { .. } => "exception-thrown",
            EvaluationResult::NoData => "no-data",
            EvaluationResult::JsonSyntaxError { .. } => "json-syntax-error",
            EvaluationResult::JsonSchemaError { .. } => "json-schema-error",
            EvaluationResult::InvalidData { .. } => "invalid-data",
            EvaluationResult::NonUsableData { .. } => "non-usable-data",
            EvaluationResult::InsufficientData { .. } => "insufficient-data",
            EvaluationResult::MismatchedData { .. } => "mismatched-data",
            EvaluationResult::DataCorrect { .. } => "data-correct",
            EvaluationResult::DataPartiallyIncorrect { .. } => "data-partially-incorrect",
            EvaluationResult::DataIncomplete { .. } => "data-incomplete",
            EvaluationResult::DataIncorrect => "data-incorrect",
        }
    }

    /// Credit this outcome contributes to an average
    pub fn partial_score(&self) -> f64 {
        match self {
            EvaluationResult::DataCorrect { .. } => 1.0,
            EvaluationResult::DataPartiallyIncorrect { score, .. } => *score,
            EvaluationResult::DataIncomplete { percentage } => *percentage,
            _ => 0.0,
        }
    }

    pub fn exception(error: impl std::fmt::Display) -> Self {
        EvaluationResult::ExceptionThrown { error: error.to_string() }
    }
}

impl std::fmt::Display for EvaluationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationResult::ExceptionThrown { error } => write!(f, "exception-thrown: {}", error),
            EvaluationResult::JsonSyntaxError { error, .. } => write!(f, "json-syntax-error: {}", error),
            EvaluationResult::JsonSchemaError { errors, .. } => {
                write!(f, "json-schema-error: {}", errors.join("; "))
            }
            EvaluationResult::InvalidData { reason, .. } => write!(f, "invalid-data: {}", reason),
            EvaluationResult::InsufficientData { matched, asked, .. } => {
                write!(f, "insufficient-data: {}/{} pairs matched", matched, asked)
            }
            EvaluationResult::DataPartiallyIncorrect { score, .. } => {
                write!(f, "data-partially-incorrect: {:.3}", score)
            }
            EvaluationResult::DataIncomplete { percentage } => {
                write!(f, "data-incomplete: {:.3}", percentage)
            }
            other => write!(f, "{}", other.tag()),
        }
    }
}
