//! Pairwise comparison tables across variable combinations
//!
//! For every unordered pair of variables, experiments are grouped by the
//! values of all other variables. Each group is a table indexed by the values
//! of the two compared variables.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::experiment::variables::ExpVars;

/// An experiment's variables with its aggregate score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredExperiment {
    pub variables: ExpVars,
    pub score: f64,
}

/// Scores for two variables while every other variable is held fixed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonGroup {
    pub var1: String,
    pub var2: String,
    /// Values of the other variables; `None` where an experiment lacks one
    pub fixed: IndexMap<String, Option<String>>,
    /// Observed values of `var1`, in first-seen order
    pub values1: Vec<String>,
    /// Observed values of `var2`, in first-seen order
    pub values2: Vec<String>,
    /// `cells[value1][value2]` is the rounded score
    pub cells: IndexMap<String, IndexMap<String, f64>>,
}

impl ComparisonGroup {
    pub fn score(&self, value1: &str, value2: &str) -> Option<f64> {
        self.cells.get(value1)?.get(value2).copied()
    }
}

type FixedKey = Vec<(String, Option<String>)>;

struct GroupBuilder {
    fixed: FixedKey,
    cells: IndexMap<String, IndexMap<String, (f64, usize)>>,
    values2: Vec<String>,
}

/// Builds comparison groups from scored experiments
pub struct ComparisonGrouper {
    precision: i32,
}

impl ComparisonGrouper {
    /// Create a grouper rounding scores to two decimals
    pub fn new() -> Self {
        Self { precision: 2 }
    }

    /// Round scores to `decimals` places
    pub fn with_precision(decimals: u32) -> Self {
        Self {
            precision: decimals as i32,
        }
    }

    /// Compare every unordered pair of `var_names`.
    ///
    /// Groups where either axis has fewer than two distinct values are
    /// dropped. Several experiments landing in one cell are averaged.
    pub fn compare(&self, var_names: &[String], experiments: &[ScoredExperiment]) -> Vec<ComparisonGroup> {
        let mut groups = Vec::new();

        for (i, var1) in var_names.iter().enumerate() {
            for var2 in &var_names[i + 1..] {
                groups.extend(self.compare_pair(var_names, var1, var2, experiments));
            }
        }

        groups
    }

    fn compare_pair(
        &self,
        var_names: &[String],
        var1: &str,
        var2: &str,
        experiments: &[ScoredExperiment],
    ) -> Vec<ComparisonGroup> {
        let mut builders: Vec<GroupBuilder> = Vec::new();
        let mut index: HashMap<FixedKey, usize> = HashMap::new();

        for exp in experiments {
            let (Some(v1), Some(v2)) = (exp.variables.get(var1), exp.variables.get(var2)) else {
                continue;
            };

            let fixed: FixedKey = var_names
                .iter()
                .filter(|n| n.as_str() != var1 && n.as_str() != var2)
                .map(|n| (n.clone(), exp.variables.get(n).map(String::from)))
                .collect();

            let slot = *index.entry(fixed.clone()).or_insert_with(|| {
                builders.push(GroupBuilder {
                    fixed,
                    cells: IndexMap::new(),
                    values2: Vec::new(),
                });
                builders.len() - 1
            });
            let builder = &mut builders[slot];

            if !builder.values2.iter().any(|v| v == v2) {
                builder.values2.push(v2.to_string());
            }
            let cell = builder
                .cells
                .entry(v1.to_string())
                .or_default()
                .entry(v2.to_string())
                .or_insert((0.0, 0));
            cell.0 += exp.score;
            cell.1 += 1;
        }

        builders
            .into_iter()
            .filter(|b| b.cells.len() >= 2 && b.values2.len() >= 2)
            .map(|b| ComparisonGroup {
                var1: var1.to_string(),
                var2: var2.to_string(),
                fixed: b.fixed.into_iter().collect(),
                values1: b.cells.keys().cloned().collect(),
                values2: b.values2,
                cells: b
                    .cells
                    .into_iter()
                    .map(|(v1, row)| {
                        let row = row
                            .into_iter()
                            .map(|(v2, (sum, n))| (v2, self.round(sum / n as f64)))
                            .collect();
                        (v1, row)
                    })
                    .collect(),
            })
            .collect()
    }

    fn round(&self, value: f64) -> f64 {
        let factor = 10f64.powi(self.precision);
        (value * factor).round() / factor
    }
}

impl Default for ComparisonGrouper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::variables::{expand, ExpVarMatrix};

    fn names(ns: &[&str]) -> Vec<String> {
        ns.iter().map(|s| s.to_string()).collect()
    }

    fn scored(matrix: &ExpVarMatrix, score: impl Fn(&ExpVars) -> f64) -> Vec<ScoredExperiment> {
        expand(matrix)
            .into_iter()
            .map(|variables| ScoredExperiment {
                score: score(&variables),
                variables,
            })
            .collect()
    }

    #[test]
    fn test_groups_per_fixed_assignment() {
        let matrix = ExpVarMatrix::new()
            .axis("model", ["m1", "m2"])
            .axis("dataset", ["d1", "d2"])
            .axis("prompt", ["p1", "p2"]);
        let experiments = scored(&matrix, |v| if v.get("model") == Some("m1") { 0.5 } else { 0.25 });

        let groups = ComparisonGrouper::new().compare(&names(&["model", "dataset", "prompt"]), &experiments);

        // three variable pairs, two fixed values of the remaining variable each
        assert_eq!(groups.len(), 6);

        let g = &groups[0];
        assert_eq!((g.var1.as_str(), g.var2.as_str()), ("model", "dataset"));
        assert_eq!(g.fixed.get("prompt"), Some(&Some("p1".to_string())));
        assert_eq!(g.values1, names(&["m1", "m2"]));
        assert_eq!(g.values2, names(&["d1", "d2"]));
        assert_eq!(g.score("m1", "d2"), Some(0.5));
        assert_eq!(g.score("m2", "d1"), Some(0.25));
        assert_ne!(groups[0].fixed, groups[1].fixed);
    }

    #[test]
    fn test_single_valued_axis_is_dropped() {
        let matrix = ExpVarMatrix::new()
            .axis("model", ["m1", "m2"])
            .axis("dataset", ["d1"])
            .axis("prompt", ["p1", "p2"]);
        let experiments = scored(&matrix, |_| 1.0);

        let groups = ComparisonGrouper::new().compare(&names(&["model", "dataset", "prompt"]), &experiments);

        assert!(groups
            .iter()
            .all(|g| g.values1.len() >= 2 && g.values2.len() >= 2));
        assert_eq!(groups.len(), 1);
        assert_eq!((groups[0].var1.as_str(), groups[0].var2.as_str()), ("model", "prompt"));
    }

    #[test]
    fn test_duplicate_cells_are_averaged_and_rounded() {
        let vars = |m: &str, p: &str| -> ExpVars { [("model", m), ("prompt", p)].into_iter().collect() };
        let experiments = vec![
            ScoredExperiment { variables: vars("a", "x"), score: 0.1 },
            ScoredExperiment { variables: vars("a", "x"), score: 0.2 },
            ScoredExperiment { variables: vars("a", "y"), score: 1.0 / 3.0 },
            ScoredExperiment { variables: vars("b", "x"), score: 0.0 },
        ];

        let groups = ComparisonGrouper::new().compare(&names(&["model", "prompt"]), &experiments);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].score("a", "x"), Some(0.15));
        assert_eq!(groups[0].score("a", "y"), Some(0.33));
        assert_eq!(groups[0].score("b", "y"), None);
    }
}
