//! Experiment definition files
//!
//! An experiment is a TOML file naming its variables in order, the prompt
//! templates it may use and how many trials to run per combination:
//!
//! ```toml
//! name = "simlex-vs-wordsim"
//! trials = 3
//!
//! [[variables]]
//! name = "model"
//! values = ["anthropic:claude-sonnet-4-5-20250929", "openai:gpt-4o"]
//!
//! [[variables]]
//! name = "dataset"
//! values = ["data/simlex-en.json"]
//!
//! [[variables]]
//! name = "prompt"
//! values = ["batched"]
//! ```

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::variables::{ExpVarMatrix, VariableAxis, DATASET, JOB_TYPE, MEASURE_TYPE, MODEL, PROMPT};
use crate::dataset::MeasureType;
use crate::prompts::{JobType, PromptTemplate};

/// Error type for experiment definitions
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Experiment {name} defines no values for required variable {variable}")]
    MissingVariable { name: String, variable: &'static str },

    #[error("Experiment {name} expands to zero variable combinations")]
    NoCombinations { name: String },

    #[error("Experiment {name} refers to unknown prompt template {prompt}")]
    UnknownPrompt { name: String, prompt: String },

    #[error("Experiment {name}: {reason}")]
    Invalid { name: String, reason: String },
}

pub type DefinitionResult<T> = Result<T, DefinitionError>;

/// Parsed experiment definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDefinition {
    pub name: String,
    /// Trials per variable combination
    #[serde(default = "default_trials")]
    pub trials: u32,
    /// Reject turns whose answer leaves out an asked pair
    #[serde(default)]
    pub require_complete: bool,
    /// Seed for pair sampling; random when unset
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub variables: Vec<VariableAxis>,
    /// Prompt templates; the built-in ones when empty
    #[serde(default)]
    pub prompts: Vec<PromptTemplate>,
}

fn default_trials() -> u32 {
    1
}

impl ExperimentDefinition {
    /// Load and validate a definition file
    pub fn from_file(path: impl AsRef<Path>) -> DefinitionResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse and validate a definition
    pub fn from_toml(content: &str) -> DefinitionResult<Self> {
        let mut definition: ExperimentDefinition = toml::from_str(content)?;
        if definition.prompts.is_empty() {
            definition.prompts = PromptTemplate::defaults();
        }
        definition.validate()?;
        Ok(definition)
    }

    /// Variable matrix, with a `prompt` axis over every template when the
    /// definition does not declare one
    pub fn matrix(&self) -> ExpVarMatrix {
        let mut axes = self.variables.clone();
        if !axes.iter().any(|a| a.name == PROMPT) {
            axes.push(VariableAxis {
                name: PROMPT.to_string(),
                values: self.prompts.iter().map(|p| p.id.clone()).collect(),
                optional: false,
            });
        }
        ExpVarMatrix::from_axes(axes)
    }

    pub fn template(&self, id: &str) -> Option<&PromptTemplate> {
        self.prompts.iter().find(|p| p.id == id)
    }

    fn axis(&self, name: &str) -> Option<&VariableAxis> {
        self.variables.iter().find(|a| a.name == name)
    }

    fn validate(&self) -> DefinitionResult<()> {
        let invalid = |reason: String| DefinitionError::Invalid {
            name: self.name.clone(),
            reason,
        };

        if self.trials == 0 {
            return Err(invalid("trials must be at least 1".to_string()));
        }

        for (i, axis) in self.variables.iter().enumerate() {
            if self.variables[..i].iter().any(|a| a.name == axis.name) {
                return Err(invalid(format!("variable {} is declared twice", axis.name)));
            }
            for (j, value) in axis.values.iter().enumerate() {
                if axis.values[..j].contains(value) {
                    return Err(invalid(format!("variable {} lists value {} twice", axis.name, value)));
                }
            }
        }

        for (i, template) in self.prompts.iter().enumerate() {
            if self.prompts[..i].iter().any(|p| p.id == template.id) {
                return Err(invalid(format!("prompt template {} is declared twice", template.id)));
            }
        }

        for required in [MODEL, DATASET] {
            if self.axis(required).map_or(true, |a| a.values.is_empty() && !a.optional) {
                return Err(DefinitionError::MissingVariable {
                    name: self.name.clone(),
                    variable: required,
                });
            }
        }

        if let Some(axis) = self.axis(PROMPT) {
            if let Some(unknown) = axis.values.iter().find(|v| self.template(v).is_none()) {
                return Err(DefinitionError::UnknownPrompt {
                    name: self.name.clone(),
                    prompt: unknown.clone(),
                });
            }
        }

        if let Some(axis) = self.axis(JOB_TYPE) {
            for value in &axis.values {
                JobType::from_str(value).map_err(invalid)?;
            }
        }
        if let Some(axis) = self.axis(MEASURE_TYPE) {
            for value in &axis.values {
                MeasureType::from_str(value).map_err(invalid)?;
            }
        }

        if self.matrix().combination_count() == 0 {
            return Err(DefinitionError::NoCombinations {
                name: self.name.clone(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::variables::expand;

    const DEFINITION: &str = r#"
name = "demo"
trials = 2
seed = 7

[[variables]]
name = "model"
values = ["openai:gpt-4o", "anthropic:claude-haiku"]

[[variables]]
name = "dataset"
values = ["data/a.json"]

[[variables]]
name = "prompt"
values = ["short"]

[[variables]]
name = "job_type"
values = []
optional = true

[[prompts]]
id = "short"
job_type = "batched"
text = "Rate {pairs}"
batch_size = 5
"#;

    #[test]
    fn test_parse_definition() {
        let def = ExperimentDefinition::from_toml(DEFINITION).unwrap();
        assert_eq!(def.trials, 2);
        assert_eq!(def.seed, Some(7));
        assert!(!def.require_complete);
        assert_eq!(def.template("short").unwrap().batch_size, 5);

        let matrix = def.matrix();
        assert_eq!(matrix.active_names(), vec![MODEL, DATASET, PROMPT]);
        assert_eq!(expand(&matrix).len(), 2);
    }

    #[test]
    fn test_default_prompts_fill_missing_axis() {
        let toml = r#"
name = "defaults"

[[variables]]
name = "model"
values = ["openai:gpt-4o"]

[[variables]]
name = "dataset"
values = ["a.json", "b.json"]
"#;
        let def = ExperimentDefinition::from_toml(toml).unwrap();
        assert_eq!(def.prompts.len(), 3);
        assert_eq!(def.matrix().combination_count(), 6);
    }

    #[test]
    fn test_empty_required_axis_is_rejected() {
        let toml = DEFINITION.replace(r#"values = ["data/a.json"]"#, "values = []");
        assert!(matches!(
            ExperimentDefinition::from_toml(&toml),
            Err(DefinitionError::MissingVariable { variable: DATASET, .. })
        ));
    }

    #[test]
    fn test_zero_combinations_is_rejected() {
        let toml = format!("{}\n[[variables]]\nname = \"language\"\nvalues = []\n", DEFINITION);
        assert!(matches!(
            ExperimentDefinition::from_toml(&toml),
            Err(DefinitionError::NoCombinations { .. })
        ));
    }

    #[test]
    fn test_unknown_prompt_is_rejected() {
        let toml = DEFINITION.replace(r#"values = ["short"]"#, r#"values = ["long"]"#);
        assert!(matches!(
            ExperimentDefinition::from_toml(&toml),
            Err(DefinitionError::UnknownPrompt { .. })
        ));
    }

    #[test]
    fn test_repeated_value_is_rejected() {
        let toml = DEFINITION.replace(r#"values = ["data/a.json"]"#, r#"values = ["data/a.json", "data/a.json"]"#);
        match ExperimentDefinition::from_toml(&toml) {
            Err(DefinitionError::Invalid { reason, .. }) => assert!(reason.contains("data/a.json")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bundled_sample_parses() {
        let def = ExperimentDefinition::from_toml(include_str!("../../experiments/sample.toml")).unwrap();
        assert_eq!(def.prompts.len(), 2);
        assert_eq!(def.matrix().combination_count(), 4);
    }

    #[test]
    fn test_bad_filter_value_is_rejected() {
        let toml = DEFINITION.replace("values = []\noptional = true", "values = [\"pairs\"]");
        assert!(matches!(
            ExperimentDefinition::from_toml(&toml),
            Err(DefinitionError::Invalid { .. })
        ));
    }
}
