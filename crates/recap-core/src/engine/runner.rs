use crate::masking::MaskingPlan;
use crate::model::{AlignedPair, CaptionedVideo, Reconstructed, VideoRecord, VideoStatus};
use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::scoring::{aggregate, RunMetrics, Scorer};
use crate::strategy::ReconstructionStrategy;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Per-video records (input order) plus counts and aggregate metrics.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub records: Vec<VideoRecord>,
    pub num_scored: usize,
    pub num_skipped: usize,
    pub num_unmasked: usize,
    pub num_failed: usize,
    pub metrics: Option<RunMetrics>,
}

impl RunOutcome {
    fn from_records(records: Vec<VideoRecord>) -> Self {
        let count = |s: VideoStatus| records.iter().filter(|r| r.status == s).count();
        let metrics = aggregate(
            records
                .iter()
                .filter_map(|r| r.reconstruction.as_ref())
                .filter(|r| !r.is_skipped())
                .filter_map(|r| r.metrics.as_ref()),
        );
        Self {
            num_scored: count(VideoStatus::Scored),
            num_skipped: count(VideoStatus::Skipped),
            num_unmasked: count(VideoStatus::Unmasked),
            num_failed: count(VideoStatus::Failed),
            metrics,
            records,
        }
    }

    /// Counts logged next to the score metrics.
    pub fn count_metrics(&self) -> std::collections::BTreeMap<String, f64> {
        std::collections::BTreeMap::from([
            ("num_scored".to_string(), self.num_scored as f64),
            ("num_skipped".to_string(), self.num_skipped as f64),
            ("num_unmasked".to_string(), self.num_unmasked as f64),
            ("num_failed".to_string(), self.num_failed as f64),
        ])
    }
}

/// One strategy under one masking plan over a list of videos.
#[derive(Clone)]
pub struct ExperimentRunner {
    pub strategy: Arc<dyn ReconstructionStrategy>,
    pub plan: MaskingPlan,
    pub scorer: Arc<dyn Scorer>,
    pub parallel: usize,
}

impl ExperimentRunner {
    pub fn new(
        strategy: Arc<dyn ReconstructionStrategy>,
        plan: MaskingPlan,
        scorer: Arc<dyn Scorer>,
        parallel: usize,
    ) -> Self {
        Self {
            strategy,
            plan,
            scorer,
            parallel: parallel.max(1),
        }
    }

    /// Process every video with at most `parallel` in flight. Records are
    /// collected in completion order and returned in input order.
    pub async fn run(
        &self,
        videos: &[CaptionedVideo],
        progress: Option<ProgressSink>,
    ) -> anyhow::Result<RunOutcome> {
        let sem = Arc::new(Semaphore::new(self.parallel));
        let mut join_set = JoinSet::new();
        let total = videos.len();

        for (position, video) in videos.iter().enumerate() {
            let permit = sem.clone().acquire_owned().await?;
            let this = self.clone();
            let video = video.clone();
            join_set.spawn(async move {
                let _permit = permit;
                this.process_video(position, &video).await
            });
        }

        let mut records = Vec::with_capacity(total);
        while let Some(res) = join_set.join_next().await {
            let record = match res {
                Ok(record) => record,
                Err(e) => VideoRecord {
                    position: total + records.len(),
                    video_id: "unknown".into(),
                    status: VideoStatus::Failed,
                    masked_indices: Vec::new(),
                    pairs: Vec::new(),
                    reconstruction: None,
                    error: Some(format!("join error: {}", e)),
                    duration_ms: 0,
                },
            };
            records.push(record);
            if let Some(ref sink) = progress {
                sink(ProgressEvent {
                    done: records.len(),
                    total,
                });
            }
        }

        records.sort_by_key(|r| r.position);
        Ok(RunOutcome::from_records(records))
    }

    async fn process_video(&self, position: usize, video: &CaptionedVideo) -> VideoRecord {
        let started = Instant::now();
        let mut record = VideoRecord {
            position,
            video_id: video.video_id.clone(),
            status: VideoStatus::Failed,
            masked_indices: Vec::new(),
            pairs: Vec::new(),
            reconstruction: None,
            error: None,
            duration_ms: 0,
        };

        let Some(masked) = self.plan.mask_video(video) else {
            tracing::warn!(
                video_id = %video.video_id,
                clips = video.clips.len(),
                plan = %self.plan.name,
                "video too short for masking plan; skipping"
            );
            record.status = VideoStatus::Unmasked;
            record.duration_ms = started.elapsed().as_millis() as u64;
            return record;
        };
        record.masked_indices = masked.masked_indices.clone();

        match self.reconstruct_and_score(video, &masked).await {
            Ok((recon, pairs)) => {
                record.status = if recon.is_skipped() {
                    VideoStatus::Skipped
                } else {
                    VideoStatus::Scored
                };
                record.pairs = pairs;
                record.reconstruction = Some(recon);
            }
            Err(e) => {
                tracing::warn!(
                    video_id = %video.video_id,
                    strategy = %self.strategy.name(),
                    error = %format!("{e:#}"),
                    "video failed"
                );
                record.error = Some(format!("{e:#}"));
            }
        }
        record.duration_ms = started.elapsed().as_millis() as u64;
        record
    }

    async fn reconstruct_and_score(
        &self,
        video: &CaptionedVideo,
        masked: &crate::model::MaskedVideo,
    ) -> anyhow::Result<(Reconstructed, Vec<AlignedPair>)> {
        let recon = self.strategy.reconstruct(masked).await?;
        if recon.is_skipped() {
            return Ok((recon, Vec::new()));
        }

        let (candidates, references) = recon.align(&video.clips);
        if candidates.is_empty() {
            return Ok((recon.skip("nothing_to_score"), Vec::new()));
        }

        let scores = self.scorer.score(&candidates, &references).await?;
        let indices = recon.reconstructed_clips.iter().filter_map(|(idx, clip)| {
            clip.data.description()?;
            video.clips.get(*idx)?.data.description()?;
            Some(*idx)
        });
        let pairs = indices
            .zip(candidates.into_iter().zip(references))
            .zip(&scores.f1)
            .map(|((index, (candidate, reference)), f1)| AlignedPair {
                index,
                reference,
                candidate,
                f1: *f1,
            })
            .collect();

        tracing::debug!(
            video_id = %video.video_id,
            pairs = scores.len(),
            f1 = scores.mean_f1(),
            "scored video"
        );
        Ok((recon.with_metrics(scores), pairs))
    }
}
