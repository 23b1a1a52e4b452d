use super::{checked, truncate, DataLoader};
use crate::model::{CaptionedClip, CaptionedVideo};
use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;

/// VATEX ships several independent English captions per video; the first
/// five are treated as a sequence with synthetic one-second timestamps.
const CAPTIONS_PER_VIDEO: usize = 5;

pub struct VatexLoader {
    path: PathBuf,
}

#[derive(Deserialize)]
struct RawVideo {
    #[serde(rename = "videoID")]
    video_id: String,
    #[serde(rename = "enCap")]
    en_cap: Vec<String>,
}

impl VatexLoader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DataLoader for VatexLoader {
    fn name(&self) -> &'static str {
        "vatex"
    }

    fn load(&self, limit: Option<usize>) -> anyhow::Result<Vec<CaptionedVideo>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read VATEX file {}", self.path.display()))?;
        let videos: Vec<RawVideo> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse VATEX file {}", self.path.display()))?;

        let videos = truncate(videos, limit)
            .into_iter()
            .map(|v| CaptionedVideo {
                video_id: v.video_id,
                clips: v
                    .en_cap
                    .into_iter()
                    .take(CAPTIONS_PER_VIDEO)
                    .enumerate()
                    .map(|(i, cap)| CaptionedClip::new((i + 1) as f64, cap))
                    .collect(),
            })
            .collect();
        checked(videos)
    }
}
