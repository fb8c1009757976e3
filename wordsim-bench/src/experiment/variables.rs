//! Experiment variables and their expansion into concrete combinations

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Variable holding the `provider:model-id` of the model under test
pub const MODEL: &str = "model";
/// Variable holding the path of the dataset partition
pub const DATASET: &str = "dataset";
/// Variable holding the prompt template id
pub const PROMPT: &str = "prompt";
/// Optional filter on the partition language
pub const LANGUAGE: &str = "language";
/// Optional filter on the partition measure type
pub const MEASURE_TYPE: &str = "measure_type";
/// Optional filter on the prompt job type
pub const JOB_TYPE: &str = "job_type";

/// One variable and its candidate values, in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableAxis {
    pub name: String,
    pub values: Vec<String>,
    /// Optional axes with no candidates are left out of every combination
    /// instead of emptying the product.
    #[serde(default)]
    pub optional: bool,
}

/// Ordered list of variables with their candidate values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpVarMatrix {
    axes: Vec<VariableAxis>,
}

impl ExpVarMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_axes(axes: Vec<VariableAxis>) -> Self {
        Self { axes }
    }

    /// Append a required variable
    pub fn axis<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes.push(VariableAxis {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
            optional: false,
        });
        self
    }

    /// Append an optional variable
    pub fn optional_axis<I, S>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.axes.push(VariableAxis {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
            optional: true,
        });
        self
    }

    pub fn axes(&self) -> &[VariableAxis] {
        &self.axes
    }

    /// Names of the variables that take part in combinations
    pub fn active_names(&self) -> Vec<String> {
        self.active_axes().map(|a| a.name.clone()).collect()
    }

    fn active_axes(&self) -> impl Iterator<Item = &VariableAxis> {
        self.axes.iter().filter(|a| !(a.optional && a.values.is_empty()))
    }

    /// Number of combinations [`expand`] will produce
    pub fn combination_count(&self) -> usize {
        if self.active_axes().next().is_none() {
            return 0;
        }
        self.active_axes().map(|a| a.values.len()).product()
    }
}

/// One concrete assignment of a value to every active variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpVars {
    values: IndexMap<String, String>,
}

impl ExpVars {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy of these variables with `name` removed
    pub fn without(&self, name: &str) -> ExpVars {
        let mut values = self.values.clone();
        values.shift_remove(name);
        ExpVars { values }
    }

    /// Short `name=value` label, used in logs and file names
    pub fn label(&self) -> String {
        self.values
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ExpVars {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

/// Expand a matrix into its full cartesian product.
///
/// The last declared variable varies fastest and the first declared variable
/// slowest. A required variable with no candidates yields no combinations.
pub fn expand(matrix: &ExpVarMatrix) -> Vec<ExpVars> {
    let axes: Vec<&VariableAxis> = matrix.active_axes().collect();
    let total = matrix.combination_count();
    if total == 0 {
        return Vec::new();
    }

    let mut indices = vec![0usize; axes.len()];
    let mut combinations = Vec::with_capacity(total);

    for _ in 0..total {
        combinations.push(
            axes.iter()
                .zip(&indices)
                .map(|(axis, &i)| (axis.name.clone(), axis.values[i].clone()))
                .collect(),
        );

        // odometer step, rightmost axis first
        for pos in (0..axes.len()).rev() {
            indices[pos] += 1;
            if indices[pos] < axes[pos].values.len() {
                break;
            }
            indices[pos] = 0;
        }
    }

    combinations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn matrix() -> ExpVarMatrix {
        ExpVarMatrix::new()
            .axis(MODEL, ["m1", "m2"])
            .axis(DATASET, ["d1", "d2", "d3"])
            .axis(PROMPT, ["p1", "p2"])
    }

    #[test]
    fn test_expand_is_full_product() {
        let combos = expand(&matrix());
        assert_eq!(combos.len(), 12);

        let unique: HashSet<_> = combos.iter().map(|c| c.label()).collect();
        assert_eq!(unique.len(), 12);
    }

    #[test]
    fn test_expand_order_follows_declaration() {
        let combos = expand(&matrix());
        let labels: Vec<_> = combos.iter().take(4).map(|c| c.label()).collect();
        assert_eq!(
            labels,
            vec![
                "model=m1 dataset=d1 prompt=p1",
                "model=m1 dataset=d1 prompt=p2",
                "model=m1 dataset=d2 prompt=p1",
                "model=m1 dataset=d2 prompt=p2",
            ]
        );
        assert_eq!(combos[6].get(MODEL), Some("m2"));
        assert_eq!(combos, expand(&matrix()));
    }

    #[test]
    fn test_empty_required_axis_yields_nothing() {
        let m = matrix().axis(LANGUAGE, Vec::<String>::new());
        assert!(expand(&m).is_empty());
        assert_eq!(m.combination_count(), 0);
    }

    #[test]
    fn test_empty_optional_axis_is_skipped() {
        let m = matrix().optional_axis(JOB_TYPE, Vec::<String>::new());
        let combos = expand(&m);
        assert_eq!(combos.len(), 12);
        assert!(combos.iter().all(|c| c.get(JOB_TYPE).is_none()));
        assert_eq!(m.active_names(), vec![MODEL, DATASET, PROMPT]);
    }

    #[test]
    fn test_without_drops_variable() {
        let vars: ExpVars = [(MODEL, "m"), (PROMPT, "p")].into_iter().collect();
        let rest = vars.without(PROMPT);
        assert_eq!(rest.len(), 1);
        assert_eq!(rest.get(MODEL), Some("m"));
        assert_eq!(vars.len(), 2);
    }
}
