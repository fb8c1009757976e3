//! Prompt definitions and generation

pub mod generator;

pub use generator::{PromptContext, PromptGenerator, PromptTemplate};

use serde::{Deserialize, Serialize};

/// Shape of the conversation a prompt drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    /// One pair per turn
    Single,
    /// A fixed number of pairs per turn
    Batched,
    /// Every pair in a single turn
    AllPairs,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Single => "single",
            JobType::Batched => "batched",
            JobType::AllPairs => "all-pairs",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(JobType::Single),
            "batched" => Ok(JobType::Batched),
            "all-pairs" | "allpairs" | "all_pairs" => Ok(JobType::AllPairs),
            _ => Err(format!("Unknown job type: {}", s)),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Two words, lower-cased on construction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WordPair(String, String);

impl WordPair {
    pub fn new(first: &str, second: &str) -> Self {
        Self(first.trim().to_lowercase(), second.trim().to_lowercase())
    }

    pub fn first(&self) -> &str {
        &self.0
    }

    pub fn second(&self) -> &str {
        &self.1
    }

    /// Order-insensitive identity: `(a, b)` and `(b, a)` share a key
    pub fn key(&self) -> (String, String) {
        if self.0 <= self.1 {
            (self.0.clone(), self.1.clone())
        } else {
            (self.1.clone(), self.0.clone())
        }
    }
}

impl std::fmt::Display for WordPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.0, self.1)
    }
}

/// One turn of a conversation and the pairs it asks about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnPrompt {
    pub text: String,
    pub pairs: Vec<WordPair>,
}

/// A complete prompt: an ordered list of turns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub id: String,
    pub job_type: JobType,
    pub turns: Vec<TurnPrompt>,
}

impl Prompt {
    /// Every pair asked across all turns, in prompt order, without repeats
    pub fn asked_pairs(&self) -> Vec<WordPair> {
        let mut seen = std::collections::HashSet::new();
        self.turns
            .iter()
            .flat_map(|t| t.pairs.iter())
            .filter(|p| seen.insert(p.key()))
            .cloned()
            .collect()
    }
}
