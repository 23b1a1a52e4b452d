use crate::scoring::RunMetrics;
use crate::tracking::{ReproInfo, RunStatus};
use serde::{Deserialize, Serialize};

/// Outcome of one strategy × masking child run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildRunSummary {
    pub run_id: String,
    pub name: String,
    pub strategy: String,
    pub masking: String,
    pub status: RunStatus,
    pub num_videos: usize,
    pub num_scored: usize,
    pub num_skipped: usize,
    pub num_unmasked: usize,
    pub num_failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<RunMetrics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_name: String,
    pub experiment: String,
    pub parent_run_id: String,
    pub status: RunStatus,
    pub repro: ReproInfo,
    pub runs: Vec<ChildRunSummary>,
    pub duration_ms: u64,
}

impl BatchSummary {
    pub fn failed_runs(&self) -> usize {
        self.runs
            .iter()
            .filter(|r| r.status == RunStatus::Failed)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Finished
    }
}
