//! Aggregation of evaluation results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::evaluation::EvaluationResult;

/// Average credit and outcome counts over a set of evaluations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CombinedScore {
    pub avg: f64,
    pub result_type_counts: BTreeMap<String, usize>,
}

/// Combine evaluations into their mean partial credit and per-variant counts
pub fn combine<'a, I>(evaluations: I) -> CombinedScore
where
    I: IntoIterator<Item = &'a EvaluationResult>,
{
    let mut total = 0.0;
    let mut count = 0usize;
    let mut result_type_counts = BTreeMap::new();

    for evaluation in evaluations {
        total += evaluation.partial_score();
        count += 1;
        *result_type_counts.entry(evaluation.tag().to_string()).or_insert(0) += 1;
    }

    CombinedScore {
        avg: if count == 0 { 0.0 } else { total / count as f64 },
        result_type_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::stats::pearson;

    #[test]
    fn test_combine_mixed_results() {
        let correlation = pearson(&[1.0, 2.0, 3.0], &[1.0, 3.0, 2.0]).unwrap();
        let results = vec![
            EvaluationResult::DataIncomplete { percentage: 0.5 },
            EvaluationResult::DataPartiallyIncorrect {
                got: vec![],
                expected: vec![],
                correlation,
                score: 0.25,
            },
            EvaluationResult::DataIncorrect,
            EvaluationResult::DataCorrect {
                got: vec![],
                expected: vec![],
                correlation,
            },
        ];

        let combined = combine(&results);
        assert_eq!(combined.avg, 0.4375);
        assert_eq!(combined.result_type_counts.len(), 4);
        for tag in ["data-incomplete", "data-partially-incorrect", "data-incorrect", "data-correct"] {
            assert_eq!(combined.result_type_counts[tag], 1);
        }
    }

    #[test]
    fn test_combine_empty() {
        let combined = combine(&Vec::<EvaluationResult>::new());
        assert_eq!(combined.avg, 0.0);
        assert!(combined.result_type_counts.is_empty());
    }

    #[test]
    fn test_failures_count_as_zero() {
        let results = vec![EvaluationResult::NoData, EvaluationResult::exception("timeout")];
        let combined = combine(&results);
        assert_eq!(combined.avg, 0.0);
        assert_eq!(combined.result_type_counts["no-data"], 1);
        assert_eq!(combined.result_type_counts["exception-thrown"], 1);
    }
}
