use super::{checked, truncate, DataLoader};
use crate::model::{CaptionedClip, CaptionedVideo};
use anyhow::Context;
use serde::Deserialize;
use std::path::PathBuf;

/// `[{video_id, clips: [{timestamp, description}]}]`, used to debug the pipeline.
pub struct ToyDataLoader {
    path: PathBuf,
}

#[derive(Deserialize)]
struct RawVideo {
    video_id: String,
    clips: Vec<RawClip>,
}

#[derive(Deserialize)]
struct RawClip {
    timestamp: f64,
    description: String,
}

impl ToyDataLoader {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl DataLoader for ToyDataLoader {
    fn name(&self) -> &'static str {
        "toy_data"
    }

    fn load(&self, limit: Option<usize>) -> anyhow::Result<Vec<CaptionedVideo>> {
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read toy data {}", self.path.display()))?;
        let videos: Vec<RawVideo> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse toy data {}", self.path.display()))?;

        let videos = truncate(videos, limit)
            .into_iter()
            .map(|v| CaptionedVideo {
                video_id: v.video_id,
                clips: v
                    .clips
                    .into_iter()
                    .map(|c| CaptionedClip::new(c.timestamp, c.description))
                    .collect(),
            })
            .collect();
        checked(videos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ParseError;
    use tempfile::tempdir;

    #[test]
    fn loads_and_limits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toy.json");
        std::fs::write(
            &path,
            r#"[
              {"video_id": "a", "clips": [{"timestamp": 1.5, "description": "x"}]},
              {"video_id": "b", "clips": []}
            ]"#,
        )
        .unwrap();

        let loader = ToyDataLoader::new(path);
        let all = loader.load(None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].clips[0], CaptionedClip::new(1.5, "x"));
        assert_eq!(loader.load(Some(1)).unwrap().len(), 1);
        assert_eq!(loader.load_all_sentences().unwrap(), vec!["x".to_string()]);
    }

    #[test]
    fn non_positive_timestamps_are_rejected() {
        let dir = tempdir().unwrap();
        let cases = [
            (r#"[{"video_id": "a", "clips": [{"timestamp": 0.0, "description": "x"}]}]"#, 0),
            (
                r#"[{"video_id": "a", "clips": [
                    {"timestamp": 1.0, "description": "x"},
                    {"timestamp": -3.0, "description": "y"}
                ]}]"#,
                1,
            ),
        ];
        for (body, bad_index) in cases {
            let path = dir.path().join("toy.json");
            std::fs::write(&path, body).unwrap();

            let err = ToyDataLoader::new(path).load(None).unwrap_err();
            match err.downcast_ref::<ParseError>() {
                Some(ParseError::InvalidTimestamp { video_id, index, .. }) => {
                    assert_eq!(video_id, "a");
                    assert_eq!(*index, bad_index);
                }
                other => panic!("expected InvalidTimestamp, got {other:?}"),
            }
        }
    }
}
