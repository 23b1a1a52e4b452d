use recap_core::config::load_batch_config;
use recap_core::engine::batch::read_recon_videos;
use recap_core::engine::{BatchOptions, BatchRunner};
use recap_core::errors::TrackingError;
use recap_core::model::{CaptionedClip, ClipData, VideoStatus};
use recap_core::providers::embedder::fake::FakeEmbedder;
use recap_core::providers::llm::fake::FakeClient;
use recap_core::tracking::{build_hierarchy, RunStatus, Tracker, EVENTS_FILE};
use std::fs;
use std::path::Path;
use std::sync::Arc;

const TOY: &str = r#"[
  {"video_id": "v1", "clips": [
    {"timestamp": 2.0, "description": "a man walks into a kitchen"},
    {"timestamp": 4.0, "description": "he opens the fridge"},
    {"timestamp": 6.0, "description": "he takes out a bottle of milk"},
    {"timestamp": 8.0, "description": "he pours the milk into a glass"}
  ]},
  {"video_id": "v2", "clips": [
    {"timestamp": 1.0, "description": "a dog runs across a field"},
    {"timestamp": 2.0, "description": "the dog catches a ball"},
    {"timestamp": 3.0, "description": "the dog brings the ball back"},
    {"timestamp": 4.0, "description": "a woman pets the dog"}
  ]},
  {"video_id": "v3", "clips": [
    {"timestamp": 5.0, "description": "a child builds a sandcastle"},
    {"timestamp": 10.0, "description": "a wave washes over it"},
    {"timestamp": 15.0, "description": "the child laughs"},
    {"timestamp": 20.0, "description": "the child starts again"}
  ]}
]"#;

const BATCH: &str = r#"
batch_name: toy_batch
base_params:
  experiment_name: caption_recon
  master_seed: 42
  parallel: 2
data_config:
  name: toy_data
  path: data/toy.json
llm:
  model_name: fake-model
  temperature: 0.0
recon_strategy:
  - name: baseline
    type: baseline_repeat_last
  - name: llm_v1
    type: llm
    prompt_template: prompts/v1.txt
masking_configs:
  - scheme: partition
    num_partitions: 3
    num_parts_to_mask: [1]
  - scheme: contiguous
    width: [1]
    seed: [7, 8]
"#;

fn write_fixture(dir: &Path) {
    fs::create_dir_all(dir.join("data")).unwrap();
    fs::create_dir_all(dir.join("prompts")).unwrap();
    fs::write(dir.join("data/toy.json"), TOY).unwrap();
    fs::write(
        dir.join("prompts/v1.txt"),
        "Replace each {DATA_MISSING} with a plausible caption. Answer with the JSON array only.",
    )
    .unwrap();
    fs::write(dir.join("batch.yaml"), BATCH).unwrap();
}

/// Answers with the prompt's clip array, every gap filled with the same caption.
fn echo_client() -> FakeClient {
    FakeClient::new("fake-model".into()).with_responder(|prompt| {
        let data = prompt.rsplit("\n\n---\n\n").next().unwrap_or_default();
        let mut clips: Vec<CaptionedClip> = serde_json::from_str(data).unwrap();
        for clip in &mut clips {
            if clip.data.is_missing() {
                clip.data = ClipData::caption("the dog runs into the kitchen");
            }
        }
        serde_json::to_string(&clips).unwrap()
    })
}

#[tokio::test]
async fn batch_creates_parent_and_children_with_metrics() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let tracking_dir = dir.path().join(".recap");

    let loaded = load_batch_config(&dir.path().join("batch.yaml")).unwrap();
    let tracker = Tracker::open(&tracking_dir).unwrap();
    let client = echo_client();
    let runner = BatchRunner::new(loaded.clone(), tracker.clone(), &tracking_dir)
        .with_llm_client(Arc::new(client.clone()))
        .with_options(BatchOptions::default());

    let summary = runner.run().await.unwrap();
    assert_eq!(summary.status, RunStatus::Finished);
    assert_eq!(summary.runs.len(), 6);
    assert_eq!(summary.repro.git_commit, "unknown");
    let names: Vec<_> = summary.runs.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "baseline_partition_p3_k1",
            "baseline_contiguous_w1_s7",
            "baseline_contiguous_w1_s8",
            "llm_v1_partition_p3_k1",
            "llm_v1_contiguous_w1_s7",
            "llm_v1_contiguous_w1_s8",
        ]
    );

    let store = tracker.store();
    let tree = build_hierarchy(store, Some("caption_recon")).unwrap();
    assert_eq!(tree.parents.len(), 1);
    assert_eq!(tree.parents[0].children.len(), 6);
    assert!(tree.standalone.is_empty());
    assert_eq!(tree.parents[0].run.status, "finished");

    for run in &summary.runs {
        assert_eq!(run.status, RunStatus::Finished, "{}", run.name);
        assert_eq!(run.num_scored, 3, "{}", run.name);
        let metrics = store.latest_metrics(&run.run_id).unwrap();
        assert_eq!(metrics["num_of_instances"], 3.0);
        assert!(metrics["mean_f1_score"] >= 0.0 && metrics["mean_f1_score"] <= 1.0);

        let params = store.get_params(&run.run_id).unwrap();
        assert_eq!(params["master_seed"], "42");
        assert_eq!(params["git_commit_hash"], "unknown");
        assert_eq!(params["strategy.name"], run.strategy);

        let records = read_recon_videos(&tracker, &run.run_id).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.status == VideoStatus::Scored));
        let events: Vec<serde_json::Value> = tracker.read_jsonl(&run.run_id, EVENTS_FILE).unwrap();
        assert_eq!(events.len(), 3);
    }

    let parent_params = store.get_params(&summary.parent_run_id).unwrap();
    assert_eq!(parent_params["batch_name"], "toy_batch");
    assert_eq!(parent_params["base_params.master_seed"], "42");
    assert!(tracker
        .artifact_dir(&summary.parent_run_id)
        .join("batch_summary.json")
        .exists());

    // Second run: every completion comes from the response cache.
    let calls = client.calls();
    assert!(calls > 0 && calls <= 9, "calls = {calls}");
    let again = BatchRunner::new(loaded, tracker.clone(), &tracking_dir)
        .with_llm_client(Arc::new(client.clone()))
        .run()
        .await
        .unwrap();
    assert_eq!(client.calls(), calls);
    assert_eq!(
        again.runs[3].metrics.unwrap().mean_f1_score,
        summary.runs[3].metrics.unwrap().mean_f1_score
    );
}

#[tokio::test]
async fn unparseable_model_output_skips_videos_without_failing_the_run() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let tracking_dir = dir.path().join(".recap");

    let loaded = load_batch_config(&dir.path().join("batch.yaml")).unwrap();
    let tracker = Tracker::open(&tracking_dir).unwrap();
    let client = FakeClient::new("fake-model".into()).with_response("I cannot help with that".into());

    let summary = BatchRunner::new(loaded, tracker, &tracking_dir)
        .with_llm_client(Arc::new(client))
        .run()
        .await
        .unwrap();

    let llm_runs: Vec<_> = summary.runs.iter().filter(|r| r.strategy == "llm_v1").collect();
    assert_eq!(llm_runs.len(), 3);
    for r in llm_runs {
        assert_eq!(r.status, RunStatus::Finished);
        assert_eq!(r.num_skipped, 3);
        assert!(r.metrics.is_none());
    }
    assert!(summary.is_success());
}

const BASELINE_ONLY: &str = r#"
batch_name: emb_batch
base_params:
  experiment_name: caption_recon
  master_seed: 3
  require_clean_git: true
data_config:
  name: toy_data
  path: data/toy.json
llm:
  model_name: unused
  temperature: 0.0
recon_strategy:
  - name: baseline
    type: baseline_repeat_last
masking_configs:
  - scheme: contiguous
    width: [2]
    seed: [1]
scoring:
  scorer: embedding
  embedding_model: fake-emb
"#;

#[tokio::test]
async fn embedding_scorer_and_clean_tree_gate() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    fs::write(dir.path().join("emb.yaml"), BASELINE_ONLY).unwrap();
    let tracking_dir = dir.path().join(".recap");
    let loaded = load_batch_config(&dir.path().join("emb.yaml")).unwrap();
    let tracker = Tracker::open(&tracking_dir).unwrap();

    // Every text maps to the same direction, so every clip scores 1.0.
    let embedder = FakeEmbedder::new("fake-emb", vec![1.0, 0.0]);
    let repo = tempfile::tempdir().unwrap();
    let runner = BatchRunner::new(loaded, tracker.clone(), &tracking_dir)
        .with_embedder(Arc::new(embedder.clone()))
        .with_repo_dir(repo.path().to_path_buf());

    let git_init = std::process::Command::new("git")
        .arg("-C")
        .arg(repo.path())
        .args(["init", "-q"])
        .status()
        .map(|s| s.success())
        .unwrap_or(false);
    if git_init {
        fs::write(repo.path().join("wip.txt"), "uncommitted").unwrap();
        let err = runner.run().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackingError>(),
            Some(TrackingError::DirtyWorkingTree { .. })
        ));
        assert!(build_hierarchy(tracker.store(), None).unwrap().parents.is_empty());
    }

    let summary = runner
        .with_options(BatchOptions {
            allow_dirty: true,
            ..BatchOptions::default()
        })
        .run()
        .await
        .unwrap();
    assert_eq!(summary.runs.len(), 1);
    let child = &summary.runs[0];
    assert_eq!(child.name, "baseline_contiguous_w2_s1");
    assert_eq!(child.num_scored, 3);
    assert_eq!(child.metrics.unwrap().mean_f1_score, 1.0);
    assert!(embedder.calls() > 0);

    let params = tracker.store().get_params(&child.run_id).unwrap();
    assert_eq!(params["scoring.scorer"], "embedding");
    let metrics = tracker.store().latest_metrics(&child.run_id).unwrap();
    assert!((metrics["mean_precision"] - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn parent_run_is_closed_as_failed_when_the_batch_aborts() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture(dir.path());
    let tracking_dir = dir.path().join(".recap");

    let loaded = load_batch_config(&dir.path().join("batch.yaml")).unwrap();
    let tracker = Tracker::open(&tracking_dir).unwrap();
    // A plain file where the artifact root belongs makes the first artifact write fail.
    let _ = fs::remove_dir_all(tracking_dir.join("artifacts"));
    fs::write(tracking_dir.join("artifacts"), "").unwrap();

    let err = BatchRunner::new(loaded, tracker.clone(), &tracking_dir)
        .with_llm_client(Arc::new(echo_client()))
        .run()
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("artifact"), "{err:#}");

    let runs = tracker.store().list_runs(Some("caption_recon")).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, "failed");
    assert!(runs[0].finished_at.is_some());
}
