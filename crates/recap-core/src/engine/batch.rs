use crate::config::{LoadedConfig, ScorerKind};
use crate::engine::runner::{ExperimentRunner, RunOutcome};
use crate::lock::QueueLock;
use crate::masking::{expand_masking_configs, MaskingPlan};
use crate::model::{CaptionedVideo, VideoRecord};
use crate::providers::embedder::openai::OpenAIEmbedder;
use crate::providers::embedder::Embedder;
use crate::providers::llm::cached::CachedLlmClient;
use crate::providers::llm::openai::OpenAIClient;
use crate::providers::llm::LlmClient;
use crate::report::{BatchSummary, ChildRunSummary};
use crate::scoring::{build_scorer, Scorer};
use crate::strategy::{build_strategies, needs_llm, ReconstructionStrategy};
use crate::tracking::{
    flatten_params, merge_params, repro, RunHandle, RunStatus, Tracker, EVENTS_FILE,
    RECON_VIDEOS_FILE,
};
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub const BATCH_CONFIG_FILE: &str = "batch_config.yaml";
pub const BATCH_SUMMARY_FILE: &str = "batch_summary.json";

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Run even when `require_clean_git` is set and the tree is dirty.
    pub allow_dirty: bool,
    /// Ignore cached completions and embeddings (results are still written).
    pub refresh_cache: bool,
    pub show_progress: bool,
}

/// Runs every strategy × masking plan of a batch config as nested runs.
pub struct BatchRunner {
    loaded: LoadedConfig,
    tracker: Tracker,
    lock_path: PathBuf,
    repo_dir: PathBuf,
    options: BatchOptions,
    llm_client: Option<Arc<dyn LlmClient>>,
    embedder: Option<Arc<dyn Embedder>>,
}

/// One line of `events.jsonl`.
#[derive(Debug, serde::Serialize)]
struct VideoEvent<'a> {
    video_id: &'a str,
    status: crate::model::VideoStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    skip_reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    duration_ms: u64,
}

impl<'a> From<&'a VideoRecord> for VideoEvent<'a> {
    fn from(r: &'a VideoRecord) -> Self {
        Self {
            video_id: &r.video_id,
            status: r.status,
            skip_reason: r
                .reconstruction
                .as_ref()
                .and_then(|x| x.skip_reason.as_deref()),
            error: r.error.as_deref(),
            duration_ms: r.duration_ms,
        }
    }
}

struct Shared {
    experiment: String,
    videos: Vec<CaptionedVideo>,
    scorer: Arc<dyn Scorer>,
    base_params: BTreeMap<String, String>,
}

/// Inputs prepared before the parent run is opened.
struct BatchWork {
    started: Instant,
    repro: repro::ReproInfo,
    videos: Vec<CaptionedVideo>,
    plans: Vec<MaskingPlan>,
    strategies: Vec<Arc<dyn ReconstructionStrategy>>,
    scorer: Arc<dyn Scorer>,
}

impl BatchRunner {
    pub fn new(loaded: LoadedConfig, tracker: Tracker, tracking_dir: &Path) -> Self {
        let lock_path = match &loaded.config.tracking.lock_file {
            Some(p) => loaded.resolve(p),
            None => tracking_dir.join("experiment.lock"),
        };
        let repo_dir = loaded.base_dir.clone();
        Self {
            loaded,
            tracker,
            lock_path,
            repo_dir,
            options: BatchOptions::default(),
            llm_client: None,
            embedder: None,
        }
    }

    pub fn with_options(mut self, options: BatchOptions) -> Self {
        self.options = options;
        self
    }

    /// Use this client for `llm` strategies instead of the OpenAI client.
    pub fn with_llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.llm_client = Some(client);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Directory whose git state is recorded (default: the config's directory).
    pub fn with_repo_dir(mut self, dir: PathBuf) -> Self {
        self.repo_dir = dir;
        self
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn plans(&self) -> Vec<MaskingPlan> {
        let cfg = &self.loaded.config;
        expand_masking_configs(&cfg.masking_configs, cfg.base_params.master_seed)
    }

    fn llm_client(&self) -> anyhow::Result<Option<Arc<dyn LlmClient>>> {
        let cfg = &self.loaded.config;
        if !needs_llm(&cfg.recon_strategy) {
            return Ok(None);
        }
        let inner: Arc<dyn LlmClient> = match &self.llm_client {
            Some(c) => c.clone(),
            None => Arc::new(OpenAIClient::from_config(&cfg.llm)?),
        };
        let cached = CachedLlmClient::new(inner, self.tracker.store().clone())
            .refresh(self.options.refresh_cache);
        Ok(Some(Arc::new(cached)))
    }

    fn embedder(&self) -> anyhow::Result<Option<Arc<dyn Embedder>>> {
        let cfg = &self.loaded.config;
        if cfg.scoring.scorer != ScorerKind::Embedding {
            return Ok(None);
        }
        match &self.embedder {
            Some(e) => Ok(Some(e.clone())),
            None => Ok(Some(Arc::new(OpenAIEmbedder::from_config(
                cfg.scoring.embedding_model.clone(),
                &cfg.llm,
            )?))),
        }
    }

    pub async fn run(&self) -> anyhow::Result<BatchSummary> {
        let started = Instant::now();
        let cfg = &self.loaded.config;

        let lock_path = self.lock_path.clone();
        let _guard = tokio::task::spawn_blocking(move || QueueLock::acquire(&lock_path))
            .await
            .context("queue lock task failed")??;

        let require_clean = cfg.base_params.require_clean_git && !self.options.allow_dirty;
        let repro = repro::capture(&self.repo_dir, require_clean)?;

        let videos = crate::data::load_videos(&cfg.data_config, &self.loaded.base_dir)?;
        let plans = self.plans();
        let strategies =
            build_strategies(&cfg.recon_strategy, &self.loaded.base_dir, self.llm_client()?)?;
        let scorer = build_scorer(
            &cfg.scoring,
            self.tracker.store(),
            self.embedder()?,
            self.options.refresh_cache,
        )?;

        let parent = self
            .tracker
            .start_run(&cfg.base_params.experiment_name, &cfg.batch_name, None)?;
        let work = BatchWork {
            started,
            repro,
            videos,
            plans,
            strategies,
            scorer,
        };
        match self.run_under(&parent, work).await {
            Ok(summary) => Ok(summary),
            Err(e) => {
                tracing::error!(run = %parent.name, error = %format!("{e:#}"), "batch aborted");
                if let Err(fe) = self.tracker.finish_run(&parent, RunStatus::Failed) {
                    tracing::warn!(run = %parent.name, error = %fe, "could not record run status");
                }
                Err(e)
            }
        }
    }

    /// Everything after the parent run exists. An error here leaves the
    /// parent for the caller to close as failed.
    async fn run_under(&self, parent: &RunHandle, work: BatchWork) -> anyhow::Result<BatchSummary> {
        let cfg = &self.loaded.config;
        let BatchWork {
            started,
            repro,
            videos,
            plans,
            strategies,
            scorer,
        } = work;

        let config_params = flatten_params(&serde_json::to_value(cfg)?);
        self.tracker
            .log_params(parent, &merge_params([config_params, repro.params()])?)?;
        self.tracker
            .log_text(parent, BATCH_CONFIG_FILE, &serde_yaml::to_string(cfg)?)?;

        tracing::info!(
            batch = %cfg.batch_name,
            strategies = strategies.len(),
            plans = plans.len(),
            videos = videos.len(),
            "starting batch"
        );

        let shared = Shared {
            experiment: cfg.base_params.experiment_name.clone(),
            videos,
            scorer,
            base_params: BTreeMap::from([
                ("git_commit_hash".to_string(), repro.git_commit.clone()),
                ("master_seed".to_string(), cfg.base_params.master_seed.to_string()),
                ("data.name".to_string(), cfg.data_config.name.clone()),
                ("scoring.scorer".to_string(), scorer_name(cfg.scoring.scorer)),
            ]),
        };

        let mut runs = Vec::new();
        for strategy in &strategies {
            for plan in &plans {
                runs.push(self.run_child(parent, &shared, strategy, plan).await);
            }
        }

        let status = if runs.iter().any(|r| r.status == RunStatus::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Finished
        };
        let summary = BatchSummary {
            batch_name: cfg.batch_name.clone(),
            experiment: shared.experiment.clone(),
            parent_run_id: parent.id.clone(),
            status,
            repro,
            runs,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        crate::report::json::write_summary(
            &summary,
            &self.tracker.artifact_dir(&parent.id).join(BATCH_SUMMARY_FILE),
        )?;
        self.tracker.finish_run(parent, status)?;
        Ok(summary)
    }

    async fn run_child(
        &self,
        parent: &RunHandle,
        shared: &Shared,
        strategy: &Arc<dyn ReconstructionStrategy>,
        plan: &MaskingPlan,
    ) -> ChildRunSummary {
        let started = Instant::now();
        let name = format!("{}_{}", strategy.name(), plan.name);
        let mut summary = ChildRunSummary {
            run_id: String::new(),
            name: name.clone(),
            strategy: strategy.name().to_string(),
            masking: plan.name.clone(),
            status: RunStatus::Failed,
            num_videos: shared.videos.len(),
            num_scored: 0,
            num_skipped: 0,
            num_unmasked: 0,
            num_failed: 0,
            metrics: None,
            error: None,
            duration_ms: 0,
        };

        let child = match self.tracker.start_run(&shared.experiment, &name, Some(parent)) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(run = %name, error = %e, "could not start child run");
                summary.error = Some(format!("{e:#}"));
                return summary;
            }
        };
        summary.run_id = child.id.clone();

        let result = self.execute_child(&child, shared, strategy, plan).await;
        let status = match result {
            Ok(outcome) => {
                summary.num_scored = outcome.num_scored;
                summary.num_skipped = outcome.num_skipped;
                summary.num_unmasked = outcome.num_unmasked;
                summary.num_failed = outcome.num_failed;
                summary.metrics = outcome.metrics;
                if outcome.num_failed > 0 && outcome.num_failed == outcome.records.len() {
                    summary.error = Some(format!("all {} videos failed", outcome.num_failed));
                    RunStatus::Failed
                } else {
                    RunStatus::Finished
                }
            }
            Err(e) => {
                tracing::error!(run = %name, error = %format!("{e:#}"), "child run failed");
                summary.error = Some(format!("{e:#}"));
                RunStatus::Failed
            }
        };

        if let Err(e) = self.tracker.finish_run(&child, status) {
            tracing::warn!(run = %name, error = %e, "could not record run status");
        }
        summary.status = status;
        summary.duration_ms = started.elapsed().as_millis() as u64;
        summary
    }

    async fn execute_child(
        &self,
        child: &RunHandle,
        shared: &Shared,
        strategy: &Arc<dyn ReconstructionStrategy>,
        plan: &MaskingPlan,
    ) -> anyhow::Result<RunOutcome> {
        let params = merge_params([
            strategy.params(),
            plan.params(),
            shared.base_params.clone(),
        ])?;
        self.tracker.log_params(child, &params)?;

        let runner = ExperimentRunner::new(
            strategy.clone(),
            plan.clone(),
            shared.scorer.clone(),
            self.loaded.config.base_params.parallel,
        );
        let progress = if self.options.show_progress {
            crate::report::console::default_progress_sink(&child.name, shared.videos.len())
        } else {
            None
        };
        let outcome = runner.run(&shared.videos, progress).await?;

        for record in &outcome.records {
            self.tracker.append_jsonl(child, RECON_VIDEOS_FILE, record)?;
            self.tracker
                .append_jsonl(child, EVENTS_FILE, &VideoEvent::from(record))?;
        }
        if let Some(m) = &outcome.metrics {
            self.tracker.log_metrics(child, &m.to_map())?;
        } else {
            tracing::warn!(run = %child.name, "no video produced scores");
        }
        self.tracker.log_metrics(child, &outcome.count_metrics())?;
        Ok(outcome)
    }
}

fn scorer_name(kind: ScorerKind) -> String {
    match kind {
        ScorerKind::Lexical => "lexical".to_string(),
        ScorerKind::Embedding => "embedding".to_string(),
    }
}

/// Reconstructions recorded for a child run, in input order.
pub fn read_recon_videos(tracker: &Tracker, run_id: &str) -> anyhow::Result<Vec<VideoRecord>> {
    tracker.read_jsonl(run_id, RECON_VIDEOS_FILE)
}
