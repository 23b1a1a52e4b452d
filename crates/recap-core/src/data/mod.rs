//! Dataset loaders. Each loader turns an on-disk dataset into
//! [`CaptionedVideo`]s; `data_config.name` picks the loader.

pub mod stats;
pub mod storytelling;
pub mod toy;
pub mod vatex;

use crate::config::DataConfig;
use crate::errors::{ConfigError, ParseError};
use crate::model::CaptionedVideo;
use std::path::{Path, PathBuf};

pub const KNOWN_DATASETS: &[&str] = &["toy_data", "vatex", "video_storytelling"];

pub trait DataLoader: Send + Sync {
    fn name(&self) -> &'static str;
    fn load(&self, limit: Option<usize>) -> anyhow::Result<Vec<CaptionedVideo>>;

    /// Every caption in the dataset, in load order.
    fn load_all_sentences(&self) -> anyhow::Result<Vec<String>> {
        Ok(self
            .load(None)?
            .iter()
            .flat_map(|v| v.descriptions().map(str::to_string).collect::<Vec<_>>())
            .collect())
    }
}

/// Build the loader for `cfg.name`. `path` is the already-resolved data path.
pub fn build_loader(name: &str, path: PathBuf) -> Result<Box<dyn DataLoader>, ConfigError> {
    match name {
        "toy_data" => Ok(Box::new(toy::ToyDataLoader::new(path))),
        "vatex" => Ok(Box::new(vatex::VatexLoader::new(path))),
        "video_storytelling" => Ok(Box::new(storytelling::VideoStorytellingLoader::new(path))),
        other => Err(ConfigError::UnknownDataset(other.to_string())),
    }
}

/// Load the videos a batch runs over, honouring `limit`.
pub fn load_videos(cfg: &DataConfig, base_dir: &Path) -> anyhow::Result<Vec<CaptionedVideo>> {
    let path = crate::config::resolve_path(base_dir, &cfg.path);
    let loader = build_loader(&cfg.name, path.clone())?;
    let videos = loader.load(cfg.limit)?;
    tracing::info!(
        dataset = loader.name(),
        path = %path.display(),
        limit = ?cfg.limit,
        videos = videos.len(),
        "loaded dataset"
    );
    Ok(videos)
}

pub fn find_video<'a>(videos: &'a [CaptionedVideo], video_id: &str) -> Option<&'a CaptionedVideo> {
    videos.iter().find(|v| v.video_id == video_id)
}

/// Rejects clips whose end timestamp is not a positive, finite number.
pub fn check_timestamps(video: &CaptionedVideo) -> Result<(), ParseError> {
    for (index, clip) in video.clips.iter().enumerate() {
        if !(clip.timestamp.is_finite() && clip.timestamp > 0.0) {
            return Err(ParseError::InvalidTimestamp {
                video_id: video.video_id.clone(),
                index,
                timestamp: clip.timestamp,
            });
        }
    }
    Ok(())
}

pub(crate) fn checked(videos: Vec<CaptionedVideo>) -> anyhow::Result<Vec<CaptionedVideo>> {
    for video in &videos {
        check_timestamps(video)?;
    }
    Ok(videos)
}

/// A `limit` of 0 means no limit.
pub(crate) fn truncate<T>(mut items: Vec<T>, limit: Option<usize>) -> Vec<T> {
    if let Some(limit) = limit.filter(|&n| n > 0) {
        items.truncate(limit);
    }
    items
}
