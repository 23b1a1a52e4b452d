//! Experiment tracking: runs, nested runs, params, metrics and artifacts.
//!
//! Run metadata lives in the [`Store`]; artifacts are plain files under
//! `<artifact_root>/<run_id>/`.

pub mod hierarchy;
pub mod params;
pub mod repro;

use crate::errors::TrackingError;
use crate::storage::store::{now_rfc3339, Store};
use crate::storage::RunRow;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

pub use hierarchy::{build_hierarchy, RunTree};
pub use params::{flatten_params, merge_params};
pub use repro::ReproInfo;

pub const DB_FILE: &str = "recap.db";
pub const ARTIFACTS_DIR: &str = "artifacts";
pub const RECON_VIDEOS_FILE: &str = "all_recon_videos.jsonl";
pub const EVENTS_FILE: &str = "events.jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Finished => "finished",
            RunStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunHandle {
    pub id: String,
    pub name: String,
    pub experiment: String,
    pub parent_id: Option<String>,
}

#[derive(Clone)]
pub struct Tracker {
    store: Store,
    artifact_root: PathBuf,
}

impl Tracker {
    pub fn new(store: Store, artifact_root: PathBuf) -> Self {
        Self {
            store,
            artifact_root,
        }
    }

    /// Open (or create) a tracking directory: `<dir>/recap.db` plus
    /// `<dir>/artifacts/`.
    pub fn open(dir: &Path) -> anyhow::Result<Self> {
        let store = Store::open(&dir.join(DB_FILE))?;
        store.init_schema()?;
        Ok(Self::new(store, dir.join(ARTIFACTS_DIR)))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn start_run(
        &self,
        experiment: &str,
        name: &str,
        parent: Option<&RunHandle>,
    ) -> anyhow::Result<RunHandle> {
        let handle = RunHandle {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            experiment: experiment.to_string(),
            parent_id: parent.map(|p| p.id.clone()),
        };
        self.store.insert_run(&RunRow {
            id: handle.id.clone(),
            parent_id: handle.parent_id.clone(),
            experiment: handle.experiment.clone(),
            name: handle.name.clone(),
            status: RunStatus::Running.as_str().to_string(),
            started_at: now_rfc3339(),
            finished_at: None,
        })?;
        tracing::info!(run_id = %handle.id, run = %handle.name, parent = ?handle.parent_id, "run started");
        Ok(handle)
    }

    pub fn finish_run(&self, run: &RunHandle, status: RunStatus) -> anyhow::Result<()> {
        self.store.finish_run(&run.id, status.as_str())?;
        tracing::info!(run_id = %run.id, run = %run.name, status = status.as_str(), "run finished");
        Ok(())
    }

    pub fn log_param(&self, run: &RunHandle, key: &str, value: &str) -> anyhow::Result<()> {
        self.store.put_params(
            &run.id,
            &BTreeMap::from([(key.to_string(), value.to_string())]),
        )
    }

    pub fn log_params(&self, run: &RunHandle, params: &BTreeMap<String, String>) -> anyhow::Result<()> {
        self.store.put_params(&run.id, params)
    }

    pub fn log_metric(&self, run: &RunHandle, key: &str, value: f64) -> anyhow::Result<()> {
        self.store.put_metric(&run.id, key, value, 0)
    }

    pub fn log_metrics(&self, run: &RunHandle, metrics: &BTreeMap<String, f64>) -> anyhow::Result<()> {
        for (k, v) in metrics {
            self.log_metric(run, k, *v)?;
        }
        Ok(())
    }

    pub fn artifact_dir(&self, run_id: &str) -> PathBuf {
        self.artifact_root.join(run_id)
    }

    fn ensure_artifact_dir(&self, run_id: &str) -> anyhow::Result<PathBuf> {
        let dir = self.artifact_dir(run_id);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create artifact dir {}", dir.display()))?;
        Ok(dir)
    }

    pub fn log_text(&self, run: &RunHandle, file_name: &str, text: &str) -> anyhow::Result<PathBuf> {
        let path = self.ensure_artifact_dir(&run.id)?.join(file_name);
        std::fs::write(&path, text)
            .with_context(|| format!("failed to write artifact {}", path.display()))?;
        Ok(path)
    }

    /// Append one JSON line to an artifact file.
    pub fn append_jsonl<T: Serialize>(
        &self,
        run: &RunHandle,
        file_name: &str,
        value: &T,
    ) -> anyhow::Result<()> {
        let path = self.ensure_artifact_dir(&run.id)?.join(file_name);
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open artifact {}", path.display()))?;
        let line = serde_json::to_string(value)?;
        writeln!(f, "{line}")?;
        Ok(())
    }

    pub fn read_jsonl<T: DeserializeOwned>(&self, run_id: &str, file_name: &str) -> anyhow::Result<Vec<T>> {
        let path = self.artifact_dir(run_id).join(file_name);
        let f = std::fs::File::open(&path)
            .with_context(|| format!("failed to open artifact {}", path.display()))?;
        let mut out = Vec::new();
        for (i, line) in std::io::BufReader::new(f).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(
                serde_json::from_str(&line)
                    .with_context(|| format!("{}:{}: invalid JSON line", path.display(), i + 1))?,
            );
        }
        Ok(out)
    }

    /// Look up a run by full id or by a unique id prefix, such as the short
    /// ids `recap runs` prints.
    pub fn find_run(&self, id_or_prefix: &str) -> anyhow::Result<RunRow> {
        if let Some(run) = self.store.get_run(id_or_prefix)? {
            return Ok(run);
        }
        let mut matches: Vec<RunRow> = if id_or_prefix.is_empty() {
            Vec::new()
        } else {
            self.store
                .list_runs(None)?
                .into_iter()
                .filter(|r| r.id.starts_with(id_or_prefix))
                .collect()
        };
        match matches.len() {
            0 => Err(TrackingError::RunNotFound(id_or_prefix.to_string()).into()),
            1 => Ok(matches.remove(0)),
            count => Err(TrackingError::AmbiguousRunId {
                prefix: id_or_prefix.to_string(),
                count,
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_run_lifecycle_and_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = Tracker::open(dir.path()).unwrap();

        let parent = tracker.start_run("exp", "batch", None).unwrap();
        let child = tracker.start_run("exp", "base_partition_p5_k1", Some(&parent)).unwrap();
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));

        tracker.log_param(&child, "master_seed", "42").unwrap();
        tracker
            .log_metrics(&child, &BTreeMap::from([("mean_f1_score".to_string(), 0.5)]))
            .unwrap();
        tracker.finish_run(&child, RunStatus::Finished).unwrap();
        tracker.finish_run(&parent, RunStatus::Failed).unwrap();

        let store = tracker.store();
        assert_eq!(store.get_params(&child.id).unwrap()["master_seed"], "42");
        assert_eq!(store.latest_metrics(&child.id).unwrap()["mean_f1_score"], 0.5);
        assert_eq!(store.get_run(&parent.id).unwrap().unwrap().status, "failed");
        assert!(dir.path().join(DB_FILE).exists());

        tracker
            .append_jsonl(&child, EVENTS_FILE, &serde_json::json!({"video_id": "a"}))
            .unwrap();
        tracker
            .append_jsonl(&child, EVENTS_FILE, &serde_json::json!({"video_id": "b"}))
            .unwrap();
        let events: Vec<serde_json::Value> = tracker.read_jsonl(&child.id, EVENTS_FILE).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1]["video_id"], "b");

        let p = tracker.log_text(&parent, "config.yaml", "batch_name: x\n").unwrap();
        assert!(p.starts_with(dir.path().join(ARTIFACTS_DIR)));
    }

    #[test]
    fn find_run_accepts_unique_prefixes() {
        let tracker = Tracker::new(Store::memory().unwrap(), PathBuf::from("artifacts"));
        tracker.store().init_schema().unwrap();
        for id in ["abc12345-0001", "abc12345-0002", "def67890-0001"] {
            tracker
                .store()
                .insert_run(&RunRow {
                    id: id.into(),
                    parent_id: None,
                    experiment: "exp".into(),
                    name: format!("run_{id}"),
                    status: "running".into(),
                    started_at: now_rfc3339(),
                    finished_at: None,
                })
                .unwrap();
        }

        assert_eq!(tracker.find_run("def67890").unwrap().id, "def67890-0001");
        assert_eq!(tracker.find_run("abc12345-0002").unwrap().id, "abc12345-0002");

        let err = tracker.find_run("abc12345").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrackingError>(),
            Some(TrackingError::AmbiguousRunId { count: 2, .. })
        ));
        for missing in ["zzz", ""] {
            let err = tracker.find_run(missing).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<TrackingError>(),
                Some(TrackingError::RunNotFound(_))
            ));
        }
    }
}
