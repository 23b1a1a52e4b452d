use super::ReconstructionStrategy;
use crate::model::{CaptionedClip, ClipData, MaskedVideo, Reconstructed};
use async_trait::async_trait;

/// Copies the last known caption forward into each masked clip. Masked clips
/// at the start of the video take the first known caption after them.
pub struct BaselineRepeatLast {
    name: String,
}

impl BaselineRepeatLast {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

pub(crate) fn repeat_last(masked: &MaskedVideo) -> Option<Vec<CaptionedClip>> {
    let clips = &masked.video.clips;
    let first_known = clips.iter().find_map(|c| match &c.data {
        ClipData::Caption(p) => Some(p.clone()),
        ClipData::Missing => None,
    })?;

    let mut last = first_known;
    let filled = clips
        .iter()
        .map(|clip| match &clip.data {
            ClipData::Caption(p) => {
                last = p.clone();
                clip.clone()
            }
            ClipData::Missing => CaptionedClip {
                timestamp: clip.timestamp,
                data: ClipData::Caption(last.clone()),
            },
        })
        .collect();
    Some(filled)
}

#[async_trait]
impl ReconstructionStrategy for BaselineRepeatLast {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "baseline_repeat_last"
    }

    async fn reconstruct(&self, masked: &MaskedVideo) -> anyhow::Result<Reconstructed> {
        match repeat_last(masked) {
            Some(clips) => Ok(Reconstructed::from_full(masked, clips)),
            None => {
                tracing::warn!(video_id = %masked.video_id(), "no known caption to repeat");
                Ok(Reconstructed::new(masked.video_id()).skip("no_known_caption"))
            }
        }
    }
}
