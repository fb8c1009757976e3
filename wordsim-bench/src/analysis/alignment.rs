//! Alignment of model scores against gold values

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::evaluation::{EvaluationResult, PairScore};
use super::stats::{normalize, pearson};
use crate::dataset::{DatasetPartition, Range};
use crate::prompts::WordPair;

/// Correlations this close to 1 count as exact agreement
const PERFECT_CORRELATION_EPSILON: f64 = 1e-12;

/// One score as returned by the model, before any checking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnedScore {
    pub words: Vec<String>,
    pub score: Option<f64>,
}

impl ReturnedScore {
    pub fn new(words: &[&str], score: Option<f64>) -> Self {
        Self {
            words: words.iter().map(|w| w.to_string()).collect(),
            score,
        }
    }

    /// Collect the `scores` entries of validated turn payloads.
    ///
    /// Numeric strings are accepted as scores; anything else becomes a
    /// missing score.
    pub fn from_payloads(payloads: &[Value]) -> Vec<ReturnedScore> {
        payloads
            .iter()
            .filter_map(|p| p.get("scores").and_then(Value::as_array))
            .flatten()
            .map(|item| {
                let words = item
                    .get("words")
                    .and_then(Value::as_array)
                    .map(|ws| ws.iter().filter_map(Value::as_str).map(String::from).collect())
                    .unwrap_or_default();
                let score = match item.get("score") {
                    Some(Value::Number(n)) => n.as_f64(),
                    Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
                    _ => None,
                };
                ReturnedScore { words, score }
            })
            .collect()
    }

    /// The pair and score, when both are usable
    fn usable(&self) -> Option<(WordPair, f64)> {
        let score = self.score.filter(|s| s.is_finite())?;
        match self.words.as_slice() {
            [a, b] if !a.trim().is_empty() && !b.trim().is_empty() => Some((WordPair::new(a, b), score)),
            _ => None,
        }
    }
}

/// Thresholds for the evaluator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentSettings {
    /// Scale gold values are mapped onto before comparison
    pub target: Range,
    /// Below this many matched pairs (and below half of the asked pairs)
    /// no correlation is computed
    pub min_matched_pairs: usize,
}

impl Default for AlignmentSettings {
    fn default() -> Self {
        Self {
            target: Range::new(1.0, 5.0),
            min_matched_pairs: 10,
        }
    }
}

/// Matches returned scores to the gold partition and grades the agreement
#[derive(Debug, Clone, Default)]
pub struct ScoreAlignmentEvaluator {
    settings: AlignmentSettings,
}

impl ScoreAlignmentEvaluator {
    pub fn new(settings: AlignmentSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AlignmentSettings {
        &self.settings
    }

    /// Evaluate the scores returned for `asked` against `partition`
    pub fn evaluate(
        &self,
        partition: &DatasetPartition,
        asked: &[WordPair],
        returned: &[ReturnedScore],
    ) -> EvaluationResult {
        let got = average_scores(returned);
        if got.is_empty() {
            return EvaluationResult::NonUsableData { got: Vec::new() };
        }
        let got_scores: Vec<PairScore> = got.values().cloned().collect();

        let gold = self.gold_table(partition);

        let mut seen = std::collections::HashSet::new();
        let asked: Vec<&WordPair> = asked.iter().filter(|p| seen.insert(p.key())).collect();

        let mut got_aligned = Vec::new();
        let mut expected_aligned = Vec::new();
        for pair in &asked {
            let key = pair.key();
            if let (Some(g), Some(&e)) = (got.get(&key), gold.get(&key)) {
                got_aligned.push(g.clone());
                expected_aligned.push(PairScore::new((*pair).clone(), e));
            }
        }

        let matched = got_aligned.len();
        if matched == 0 {
            return EvaluationResult::MismatchedData {
                got: got_scores,
                asked: asked.into_iter().cloned().collect(),
            };
        }

        if matched < self.settings.min_matched_pairs && (matched as f64) < asked.len() as f64 / 2.0 {
            return EvaluationResult::InsufficientData {
                got: got_aligned,
                expected: expected_aligned,
                matched,
                asked: asked.len(),
            };
        }

        let x: Vec<f64> = got_aligned.iter().map(|s| s.score).collect();
        let y: Vec<f64> = expected_aligned.iter().map(|s| s.score).collect();

        match pearson(&x, &y) {
            None => EvaluationResult::NonUsableData { got: got_aligned },
            Some(correlation) if (1.0 - correlation.r).abs() < PERFECT_CORRELATION_EPSILON => {
                EvaluationResult::DataCorrect {
                    got: got_aligned,
                    expected: expected_aligned,
                    correlation,
                }
            }
            Some(correlation) => EvaluationResult::DataPartiallyIncorrect {
                got: got_aligned,
                expected: expected_aligned,
                score: correlation.r,
                correlation,
            },
        }
    }

    /// Gold values keyed by order-insensitive pair, mapped onto the target scale
    fn gold_table(&self, partition: &DatasetPartition) -> HashMap<(String, String), f64> {
        partition
            .data
            .iter()
            .filter_map(|entry| {
                let (value, range) = entry.resolved_value(&partition.scale)?;
                let pair = WordPair::new(&entry.term1, &entry.term2);
                Some((pair.key(), normalize(value, range, self.settings.target)))
            })
            .collect()
    }
}

/// Average duplicate reports per pair, in first-reported order
fn average_scores(returned: &[ReturnedScore]) -> IndexMap<(String, String), PairScore> {
    let mut sums: IndexMap<(String, String), (WordPair, f64, usize)> = IndexMap::new();
    for (pair, score) in returned.iter().filter_map(ReturnedScore::usable) {
        let entry = sums.entry(pair.key()).or_insert((pair, 0.0, 0));
        entry.1 += score;
        entry.2 += 1;
    }
    sums.into_iter()
        .map(|(key, (pair, sum, count))| (key, PairScore::new(pair, sum / count as f64)))
        .collect()
}
