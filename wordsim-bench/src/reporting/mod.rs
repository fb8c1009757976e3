//! Results reporting
//!
//! Experiment records are handed to a [`ResultSink`] as soon as each variable
//! combination finishes, so an interrupted run keeps everything completed so
//! far. The run summary is written last.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::{ComparisonGroup, ComparisonGrouper, ScoredExperiment};
use crate::experiment::session::ExperimentRecord;
use crate::experiment::variables::ExpVars;
use crate::usage::UsageTotals;

/// Error type for writing and reading reports
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for experiment records and the run summary
pub trait ResultSink: Send {
    fn write_experiment(&mut self, record: &ExperimentRecord) -> Result<(), ReportError>;

    fn write_summary(&mut self, summary: &RunSummary) -> Result<(), ReportError>;
}

/// Score line of one variable combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub index: usize,
    pub variables: ExpVars,
    pub score: f64,
    pub result_type_counts: BTreeMap<String, usize>,
    pub trials: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// The per-combination record could not be saved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_error: Option<String>,
}

impl ExperimentSummary {
    pub fn scored(&self) -> ScoredExperiment {
        ScoredExperiment {
            variables: self.variables.clone(),
            score: self.score,
        }
    }
}

impl From<&ExperimentRecord> for ExperimentSummary {
    fn from(record: &ExperimentRecord) -> Self {
        Self {
            index: record.meta.index,
            variables: record.variables.clone(),
            score: record.summary.avg,
            result_type_counts: record.summary.result_type_counts.clone(),
            trials: record.results.len(),
            error: record.meta.error.clone(),
            write_error: record.meta.write_error.clone(),
        }
    }
}

/// Final summary of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub experiment: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// The run was stopped before every combination finished
    pub interrupted: bool,
    /// Variables taking part in the combinations, in declaration order
    pub variables: Vec<String>,
    pub experiments: Vec<ExperimentSummary>,
    /// Combinations left out by a language, measure or job type filter
    #[serde(default)]
    pub skipped: usize,
    pub usage: UsageTotals,
    pub comparisons: Vec<ComparisonGroup>,
}

impl RunSummary {
    /// Recompute the comparison tables, e.g. with another precision
    pub fn regroup(&self, grouper: &ComparisonGrouper) -> Vec<ComparisonGroup> {
        let scored: Vec<ScoredExperiment> = self.experiments.iter().map(ExperimentSummary::scored).collect();
        grouper.compare(&self.variables, &scored)
    }

    /// Load a summary written by [`JsonResultSink`]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReportError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Writes `<output>/<run id>/experiments/NNNN.json` and `<output>/<run id>/summary.json`
pub struct JsonResultSink {
    run_dir: PathBuf,
}

impl JsonResultSink {
    pub fn create(output_dir: impl AsRef<Path>, run_id: &str) -> Result<Self, ReportError> {
        let run_dir = output_dir.as_ref().join(run_id);
        fs::create_dir_all(run_dir.join("experiments"))?;
        Ok(Self { run_dir })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn summary_path(&self) -> PathBuf {
        self.run_dir.join("summary.json")
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

impl ResultSink for JsonResultSink {
    fn write_experiment(&mut self, record: &ExperimentRecord) -> Result<(), ReportError> {
        let path = self
            .run_dir
            .join("experiments")
            .join(format!("{:04}.json", record.meta.index));
        write_json(&path, record)?;
        tracing::debug!("Wrote {}", path.display());
        Ok(())
    }

    fn write_summary(&mut self, summary: &RunSummary) -> Result<(), ReportError> {
        let path = self.summary_path();
        write_json(&path, summary)?;
        tracing::info!("Summary written to {}", path.display());
        Ok(())
    }
}

/// Generate a console report
pub fn print_console_report(summary: &RunSummary) {
    println!("\n=== Word Similarity Benchmark: {} ===\n", summary.experiment);
    println!("Run: {}", summary.run_id);
    if summary.interrupted {
        println!("Status: interrupted");
    }
    println!(
        "Combinations: {} run, {} skipped\n",
        summary.experiments.len(),
        summary.skipped
    );

    println!("Scores:");
    println!("{:-<50}", "");

    let mut ranked: Vec<_> = summary.experiments.iter().collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    for (i, exp) in ranked.iter().enumerate() {
        let counts = exp
            .result_type_counts
            .iter()
            .map(|(tag, n)| format!("{} x{}", tag, n))
            .collect::<Vec<_>>()
            .join(", ");
        println!("  {}. {:.3}  {}", i + 1, exp.score, exp.variables.label());
        if let Some(error) = &exp.error {
            println!("       error: {}", error);
        } else {
            println!("       {}", counts);
        }
        if let Some(error) = &exp.write_error {
            println!("       not saved: {}", error);
        }
    }

    if !summary.usage.is_empty() {
        println!("\nUsage:");
        println!("{:-<50}", "");
        for usage in summary.usage.iter() {
            let cost = usage
                .cost
                .as_ref()
                .map(|c| format!(", {:.4} {}", c.total, c.currency))
                .unwrap_or_default();
            println!(
                "  {}: {} in / {} out tokens{}",
                usage.model, usage.input_tokens, usage.output_tokens, cost
            );
        }
    }

    print_comparisons(&summary.comparisons);

    println!("\n{:=<50}", "");
}

/// Print one table per comparison group
pub fn print_comparisons(groups: &[ComparisonGroup]) {
    if groups.is_empty() {
        return;
    }

    println!("\nComparisons:");
    println!("{:-<50}", "");

    for group in groups {
        let fixed = group
            .fixed
            .iter()
            .map(|(name, value)| format!("{}={}", name, value.as_deref().unwrap_or("-")))
            .collect::<Vec<_>>()
            .join(" ");
        println!("\n  {} x {}  [{}]", group.var1, group.var2, fixed);
        print!("{}", render_table(group));
    }
}

/// Render a group as a text table with `var1` values as rows
pub fn render_table(group: &ComparisonGroup) -> String {
    let label_width = group
        .values1
        .iter()
        .map(|v| v.len())
        .chain(std::iter::once(group.var1.len()))
        .max()
        .unwrap_or(0);
    let col_width = group.values2.iter().map(|v| v.len()).max().unwrap_or(0).max(6);

    let mut out = format!("    {:<label_width$}", group.var1);
    for v2 in &group.values2 {
        out.push_str(&format!("  {:>col_width$}", v2));
    }
    out.push('\n');

    for v1 in &group.values1 {
        out.push_str(&format!("    {:<label_width$}", v1));
        for v2 in &group.values2 {
            let cell = group
                .score(v1, v2)
                .map(|s| format!("{}", s))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!("  {:>col_width$}", cell));
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn group() -> ComparisonGroup {
        let mut cells = IndexMap::new();
        cells.insert("m1".to_string(), IndexMap::from([("p1".to_string(), 0.5), ("p2".to_string(), 0.75)]));
        cells.insert("m2".to_string(), IndexMap::from([("p1".to_string(), 0.25)]));
        ComparisonGroup {
            var1: "model".into(),
            var2: "prompt".into(),
            fixed: IndexMap::from([("dataset".to_string(), Some("d1".to_string()))]),
            values1: vec!["m1".into(), "m2".into()],
            values2: vec!["p1".into(), "p2".into()],
            cells,
        }
    }

    #[test]
    fn test_render_table() {
        let table = render_table(&group());
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].trim_start().starts_with("model"));
        assert!(lines[1].contains("0.5") && lines[1].contains("0.75"));
        assert!(lines[2].trim_end().ends_with('-'));
    }

    #[test]
    fn test_summary_roundtrip_and_regroup() {
        let vars = |m: &str, p: &str| -> ExpVars { [("model", m), ("prompt", p)].into_iter().collect() };
        let summary = RunSummary {
            run_id: "r1".into(),
            experiment: "demo".into(),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            interrupted: true,
            variables: vec!["model".into(), "prompt".into()],
            experiments: [("a", "x", 1.0), ("a", "y", 0.5), ("b", "x", 0.0), ("b", "y", 0.25)]
                .iter()
                .enumerate()
                .map(|(index, (m, p, score))| ExperimentSummary {
                    index,
                    variables: vars(m, p),
                    score: *score,
                    result_type_counts: BTreeMap::new(),
                    trials: 1,
                    error: None,
                    write_error: None,
                })
                .collect(),
            skipped: 0,
            usage: UsageTotals::new(),
            comparisons: vec![],
        };

        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonResultSink::create(dir.path(), &summary.run_id).unwrap();
        sink.write_summary(&summary).unwrap();

        let loaded = RunSummary::from_file(sink.summary_path()).unwrap();
        assert_eq!(loaded, summary);

        let groups = loaded.regroup(&ComparisonGrouper::new());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].score("b", "y"), Some(0.25));
    }
}
