//! Gold-standard word-pair datasets

pub mod loader;

pub use loader::{load_partition, load_partition_from_str, LoadError};

use serde::{Deserialize, Serialize};

/// Whether a partition measures similarity or relatedness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasureType {
    Similarity,
    Relatedness,
}

impl MeasureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeasureType::Similarity => "similarity",
            MeasureType::Relatedness => "relatedness",
        }
    }
}

impl std::str::FromStr for MeasureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "similarity" => Ok(MeasureType::Similarity),
            "relatedness" => Ok(MeasureType::Relatedness),
            _ => Err(format!("Unknown measure type: {}", s)),
        }
    }
}

impl std::fmt::Display for MeasureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Closed numeric range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }
}

/// Scales of the gold values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    /// Range of the aggregate `value` field
    pub value: Range,
    /// Range of the individual annotator `values`, when they differ
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Range>,
}

/// One annotated word pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoldEntry {
    pub term1: String,
    pub term2: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<f64>>,
}

impl GoldEntry {
    /// Gold value together with the range it is expressed in.
    ///
    /// Prefers the aggregate `value`; falls back to the mean of the
    /// individual `values` on their own scale.
    pub fn resolved_value(&self, scale: &Scale) -> Option<(f64, Range)> {
        if let Some(v) = self.value {
            return Some((v, scale.value));
        }
        let values = self.values.as_ref().filter(|v| !v.is_empty())?;
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some((mean, scale.values.unwrap_or(scale.value)))
    }
}

/// A validated gold partition, e.g. one language of one dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetPartition {
    pub id: String,
    pub language: String,
    pub measure_type: MeasureType,
    pub scale: Scale,
    pub data: Vec<GoldEntry>,
}

impl DatasetPartition {
    /// Check the partition against optional language and measure filters
    pub fn matches(&self, language: Option<&str>, measure_type: Option<&str>) -> bool {
        let language_ok = language.map_or(true, |l| l.eq_ignore_ascii_case(&self.language));
        let measure_ok = measure_type.map_or(true, |m| m.eq_ignore_ascii_case(self.measure_type.as_str()));
        language_ok && measure_ok
    }
}
