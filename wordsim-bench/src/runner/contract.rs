//! Response contracts: the tool a model answers through and the checks its
//! answer must pass before a turn counts as done

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::prompts::{TurnPrompt, WordPair};
use crate::providers::ResponseTool;

/// Errors raised while building a contract
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error("invalid response schema for tool {tool}: {message}")]
    Schema { tool: String, message: String },
}

/// What a turn's answer must look like
pub trait ResponseContract: Send + Sync {
    /// Tool the model is forced to answer through
    fn tool(&self) -> &ResponseTool;

    /// Check `data` against the tool schema, returning every violation
    fn validate(&self, data: &Value) -> Result<(), Vec<String>>;

    /// Fix up common shape mistakes before validation
    fn repair(&self, data: Value) -> Value {
        data
    }

    /// Final acceptance check on schema-valid data
    fn accept(&self, _data: &Value, _turn: &TurnPrompt) -> Result<(), String> {
        Ok(())
    }
}

/// Tool plus a compiled JSON Schema validator
pub struct SchemaTool {
    tool: ResponseTool,
    validator: jsonschema::Validator,
}

impl SchemaTool {
    pub fn new(tool: ResponseTool) -> Result<Self, ContractError> {
        let validator = jsonschema::validator_for(&tool.schema).map_err(|e| ContractError::Schema {
            tool: tool.name.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { tool, validator })
    }

    pub fn tool(&self) -> &ResponseTool {
        &self.tool
    }

    pub fn validate(&self, data: &Value) -> Result<(), Vec<String>> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(data)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{}: {}", path, e)
                }
            })
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Contract of the word-pair scoring experiment
pub struct ScoresContract {
    schema: SchemaTool,
    require_complete: bool,
}

impl ScoresContract {
    pub const TOOL_NAME: &'static str = "scores";

    pub fn new() -> Result<Self, ContractError> {
        let tool = ResponseTool {
            name: Self::TOOL_NAME.to_string(),
            description: "Report one score for every word pair you were asked about".to_string(),
            schema: scores_schema(),
        };
        Ok(Self {
            schema: SchemaTool::new(tool)?,
            require_complete: false,
        })
    }

    /// Reject turns whose answer leaves out an asked pair
    pub fn with_require_complete(mut self, require_complete: bool) -> Self {
        self.require_complete = require_complete;
        self
    }
}

fn scores_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "scores": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "words": {
                            "type": "array",
                            "items": { "type": "string" },
                            "minItems": 2,
                            "maxItems": 2
                        },
                        "score": { "type": ["number", "string", "null"] }
                    },
                    "required": ["words", "score"]
                }
            }
        },
        "required": ["scores"]
    })
}

impl ResponseContract for ScoresContract {
    fn tool(&self) -> &ResponseTool {
        self.schema.tool()
    }

    fn validate(&self, data: &Value) -> Result<(), Vec<String>> {
        self.schema.validate(data)
    }

    /// Models sometimes return the bare list instead of `{"scores": [...]}`
    fn repair(&self, data: Value) -> Value {
        match data {
            Value::Array(items) => json!({ "scores": items }),
            other => other,
        }
    }

    fn accept(&self, data: &Value, turn: &TurnPrompt) -> Result<(), String> {
        if !self.require_complete {
            return Ok(());
        }

        let answered: HashSet<(String, String)> = data["scores"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|item| match item["words"].as_array()?.as_slice() {
                [a, b] => Some(WordPair::new(a.as_str()?, b.as_str()?).key()),
                _ => None,
            })
            .collect();

        let missing: Vec<String> = turn
            .pairs
            .iter()
            .filter(|p| !answered.contains(&p.key()))
            .map(|p| p.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "missing {} of {} asked pairs: {}",
                missing.len(),
                turn.pairs.len(),
                missing.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn() -> TurnPrompt {
        TurnPrompt {
            text: "rate".into(),
            pairs: vec![WordPair::new("car", "automobile"), WordPair::new("cup", "mug")],
        }
    }

    #[test]
    fn test_valid_scores_pass() {
        let contract = ScoresContract::new().unwrap();
        let data = json!({ "scores": [
            { "words": ["car", "automobile"], "score": 4.5 },
            { "words": ["cup", "mug"], "score": "3" },
            { "words": ["sun", "moon"], "score": null }
        ]});
        assert!(contract.validate(&data).is_ok());
    }

    #[test]
    fn test_schema_errors_are_reported() {
        let contract = ScoresContract::new().unwrap();
        let data = json!({ "scores": [{ "words": ["car"], "score": true }] });
        let errors = contract.validate(&data).unwrap_err();
        assert!(errors.len() >= 2);

        assert!(contract.validate(&json!({ "answer": 3 })).is_err());
    }

    #[test]
    fn test_repair_wraps_bare_array() {
        let contract = ScoresContract::new().unwrap();
        let repaired = contract.repair(json!([{ "words": ["a", "b"], "score": 1 }]));
        assert!(contract.validate(&repaired).is_ok());
        assert_eq!(repaired["scores"][0]["score"], 1);

        let untouched = json!({ "scores": [] });
        assert_eq!(contract.repair(untouched.clone()), untouched);
    }

    #[test]
    fn test_incomplete_answer_accepted_by_default() {
        let contract = ScoresContract::new().unwrap();
        let data = json!({ "scores": [{ "words": ["car", "automobile"], "score": 4 }] });
        assert!(contract.accept(&data, &turn()).is_ok());
    }

    #[test]
    fn test_require_complete_rejects_missing_pair() {
        let contract = ScoresContract::new().unwrap().with_require_complete(true);

        let partial = json!({ "scores": [{ "words": ["Automobile", "car"], "score": 4 }] });
        let reason = contract.accept(&partial, &turn()).unwrap_err();
        assert!(reason.contains("missing 1 of 2"));

        let full = json!({ "scores": [
            { "words": ["automobile", "car"], "score": 4 },
            { "words": ["cup", "mug"], "score": 3 }
        ]});
        assert!(contract.accept(&full, &turn()).is_ok());
    }
}
