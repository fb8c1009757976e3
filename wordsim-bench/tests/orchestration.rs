//! End-to-end runs of an experiment session against scripted models

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use wordsim_bench::config::Config;
use wordsim_bench::experiment::{ExperimentDefinition, ExperimentRecord, ExperimentSession, RunContext};
use wordsim_bench::providers::{ModelCapability, ModelRegistry, ModelResponse, ProviderResult, ResponseTool};
use wordsim_bench::reporting::{JsonResultSink, RunSummary};
use wordsim_bench::usage::Usage;

#[derive(Clone, Copy)]
enum Behaviour {
    /// Gold value plus one for every listed pair
    Exact,
    /// Like `Exact`, but every other call answers with broken JSON
    Flaky,
    /// The same score for every pair
    Flat,
    /// Never answers
    Hang,
    /// Broken JSON on the first call, then never answers
    BrokenThenHang,
}

struct ScriptedModel {
    id: String,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl ScriptedModel {
    fn new(id: &str, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }
}

/// Pairs listed as `- wN, vN` lines; gold for pair N is N % 5 on a 0..4 scale
fn answer(prompt: &str, flat: bool) -> String {
    let scores: Vec<_> = prompt
        .lines()
        .filter_map(|l| l.strip_prefix("- "))
        .filter_map(|l| l.split_once(", "))
        .map(|(a, b)| {
            let n: f64 = a.trim_start_matches('w').parse().unwrap_or(0.0);
            let score = if flat { 3.0 } else { (n % 5.0) + 1.0 };
            json!({ "words": [a, b], "score": score })
        })
        .collect();
    json!({ "scores": scores }).to_string()
}

#[async_trait]
impl ModelCapability for ScriptedModel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn make_request(&self, prompt: &str, _tool: &ResponseTool) -> ProviderResult<ModelResponse> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let usage = Some(Usage::from_tokens(self.id.as_str(), 50, 10, None));

        let text = match self.behaviour {
            Behaviour::Exact => answer(prompt, false),
            Behaviour::Flaky if call % 2 == 0 => "{\"scores\": [".to_string(),
            Behaviour::Flaky => answer(prompt, false),
            Behaviour::Flat => answer(prompt, true),
            Behaviour::Hang => std::future::pending().await,
            Behaviour::BrokenThenHang if call == 0 => "not json".to_string(),
            Behaviour::BrokenThenHang => std::future::pending().await,
        };
        Ok(ModelResponse::new(text, usage))
    }
}

fn write_dataset(dir: &Path) {
    let data: Vec<_> = (0..12)
        .map(|i| json!({ "term1": format!("w{}", i), "term2": format!("v{}", i), "value": (i % 5) as f64 }))
        .collect();
    let partition = json!({
        "language": "en",
        "measure_type": "similarity",
        "scale": { "value": { "min": 0, "max": 4 } },
        "data": data
    });
    std::fs::write(dir.join("pairs.json"), partition.to_string()).unwrap();
}

fn session(
    definition: &str,
    models: Vec<Arc<ScriptedModel>>,
    data_dir: &Path,
    sink: JsonResultSink,
) -> ExperimentSession {
    let config = Config::default();
    let mut registry = ModelRegistry::new(&config);
    for model in models {
        let id = model.id.clone();
        registry.register(id, model);
    }

    let definition = ExperimentDefinition::from_toml(definition).unwrap();
    ExperimentSession::new(definition, registry, Box::new(sink))
        .unwrap()
        .with_config(&config)
        .with_dataset_root(data_dir)
}

fn record<'a>(ctx: &'a RunContext, model: &str, prompt: &str) -> &'a ExperimentRecord {
    ctx.experiments
        .iter()
        .find(|e| e.variables.get("model") == Some(model) && e.variables.get("prompt") == Some(prompt))
        .unwrap()
}

const COMPARISON: &str = r#"
name = "comparison"
seed = 42

[[variables]]
name = "model"
values = ["test:exact", "test:flaky", "test:flat"]

[[variables]]
name = "dataset"
values = ["pairs.json"]

[[variables]]
name = "prompt"
values = ["batched", "all-pairs"]
"#;

#[tokio::test(start_paused = true)]
async fn test_full_run_persists_records_and_summary() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_dataset(data.path());

    let mut ctx = RunContext::new();
    let sink = JsonResultSink::create(out.path(), &ctx.run_id).unwrap();
    let run_dir = sink.run_dir().to_path_buf();

    let models = vec![
        ScriptedModel::new("test:exact", Behaviour::Exact),
        ScriptedModel::new("test:flaky", Behaviour::Flaky),
        ScriptedModel::new("test:flat", Behaviour::Flat),
    ];
    let mut session = session(COMPARISON, models, data.path(), sink);

    session.run(&mut ctx).await;
    let summary = session.finish(&ctx, false).unwrap();

    assert_eq!(ctx.experiments.len(), 6);
    for index in 0..6 {
        assert!(run_dir.join("experiments").join(format!("{:04}.json", index)).exists());
    }

    // each turn of the flaky model needs a second call
    let flaky = record(&ctx, "test:flaky", "batched");
    let trial = &flaky.results[0].trial;
    assert!(trial.success);
    assert_eq!(trial.attempts, 1);
    assert_eq!(trial.total_tries, 4);
    assert_eq!(flaky.results[0].evaluation.tag(), "data-correct");

    let flat = record(&ctx, "test:flat", "all-pairs");
    assert_eq!(flat.results[0].evaluation.tag(), "non-usable-data");
    assert_eq!(flat.summary.avg, 0.0);

    // failed calls are billed too
    let usage = ctx.usage.get("test:flaky").unwrap();
    assert_eq!(usage.input_tokens, 50 * 6);
    assert_eq!(usage.output_tokens, 10 * 6);

    let loaded = RunSummary::from_file(run_dir.join("summary.json")).unwrap();
    assert_eq!(loaded, summary);
    assert!(!loaded.interrupted);

    let group = loaded
        .comparisons
        .iter()
        .find(|g| g.var1 == "model" && g.var2 == "prompt")
        .unwrap();
    assert_eq!(group.score("test:exact", "all-pairs"), Some(1.0));
    assert_eq!(group.score("test:flaky", "batched"), Some(1.0));
    assert_eq!(group.score("test:flat", "batched"), Some(0.0));
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_run_keeps_finished_combinations() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_dataset(data.path());

    let definition = r#"
name = "interrupted"

[[variables]]
name = "model"
values = ["test:exact", "test:hang"]

[[variables]]
name = "dataset"
values = ["pairs.json"]

[[variables]]
name = "prompt"
values = ["all-pairs"]
"#;

    let mut ctx = RunContext::new();
    let sink = JsonResultSink::create(out.path(), &ctx.run_id).unwrap();
    let run_dir = sink.run_dir().to_path_buf();

    let models = vec![
        ScriptedModel::new("test:exact", Behaviour::Exact),
        ScriptedModel::new("test:hang", Behaviour::Hang),
    ];
    let mut session = session(definition, models, data.path(), sink);

    let finished = tokio::select! {
        _ = session.run(&mut ctx) => true,
        _ = tokio::time::sleep(Duration::from_secs(5)) => false,
    };
    assert!(!finished);

    let summary = session.finish(&ctx, true).unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.experiments.len(), 1);
    assert_eq!(summary.experiments[0].variables.get("model"), Some("test:exact"));
    assert!(summary.comparisons.is_empty());

    assert!(run_dir.join("experiments").join("0000.json").exists());
    assert!(!run_dir.join("experiments").join("0001.json").exists());
    assert!(run_dir.join("summary.json").exists());
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_trial_keeps_billed_usage() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_dataset(data.path());

    let definition = r#"
name = "billed"

[[variables]]
name = "model"
values = ["test:broken"]

[[variables]]
name = "dataset"
values = ["pairs.json"]

[[variables]]
name = "prompt"
values = ["all-pairs"]
"#;

    let mut ctx = RunContext::new();
    let sink = JsonResultSink::create(out.path(), &ctx.run_id).unwrap();
    let model = ScriptedModel::new("test:broken", Behaviour::BrokenThenHang);
    let mut session = session(definition, vec![model.clone()], data.path(), sink);

    tokio::select! {
        _ = session.run(&mut ctx) => panic!("run finished against a hanging model"),
        _ = tokio::time::sleep(Duration::from_secs(30)) => {}
    }

    let summary = session.finish(&ctx, true).unwrap();
    assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    assert!(summary.experiments.is_empty());

    let usage = summary.usage.get("test:broken").unwrap();
    assert_eq!(usage.total_tokens, 60);
}
