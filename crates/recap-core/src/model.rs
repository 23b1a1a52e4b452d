use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;

/// Marker that stands in for the data of a masked clip, both in memory
/// (serialized form of [`ClipData::Missing`]) and inside prompts.
pub const DATA_MISSING: &str = "<DATA_MISSING>";

/// Caption text, optionally with the structured annotations some datasets
/// carry. Empty annotation lists are left out of the serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionPayload {
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verbs: Vec<String>,
}

/// Clip data: a caption, or the [`DATA_MISSING`] marker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipData {
    Caption(CaptionPayload),
    Missing,
}

impl ClipData {
    pub fn caption(text: impl Into<String>) -> Self {
        ClipData::Caption(CaptionPayload {
            description: text.into(),
            objects: Vec::new(),
            verbs: Vec::new(),
        })
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ClipData::Caption(p) => Some(p.description.as_str()),
            ClipData::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, ClipData::Missing)
    }
}

impl Serialize for ClipData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ClipData::Caption(p) => p.serialize(serializer),
            ClipData::Missing => serializer.serialize_str(DATA_MISSING),
        }
    }
}

impl<'de> Deserialize<'de> for ClipData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Payload(CaptionPayload),
            Marker(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Payload(p) => Ok(ClipData::Caption(p)),
            Repr::Marker(s) if s == DATA_MISSING => Ok(ClipData::Missing),
            Repr::Marker(s) => Err(serde::de::Error::custom(format!(
                "unexpected clip data string {s:?} (expected an object or {DATA_MISSING:?})"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionedClip {
    /// End of the clip, in seconds.
    pub timestamp: f64,
    pub data: ClipData,
}

impl CaptionedClip {
    pub fn new(timestamp: f64, description: impl Into<String>) -> Self {
        Self {
            timestamp,
            data: ClipData::caption(description),
        }
    }

    pub fn masked(&self) -> Self {
        Self {
            timestamp: self.timestamp,
            data: ClipData::Missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionedVideo {
    pub video_id: String,
    pub clips: Vec<CaptionedClip>,
}

impl CaptionedVideo {
    pub fn descriptions(&self) -> impl Iterator<Item = &str> {
        self.clips.iter().filter_map(|c| c.data.description())
    }
}

/// A masked copy of a video plus the (sorted) indices that were masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskedVideo {
    pub video: CaptionedVideo,
    pub masked_indices: Vec<usize>,
}

impl MaskedVideo {
    pub fn video_id(&self) -> &str {
        &self.video.video_id
    }

    pub fn is_masked(&self, index: usize) -> bool {
        self.masked_indices.binary_search(&index).is_ok()
    }
}

/// Per-pair similarity scores, one entry per aligned (candidate, reference).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipScores {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub f1: Vec<f64>,
}

impl ClipScores {
    pub fn push(&mut self, precision: f64, recall: f64, f1: f64) {
        self.precision.push(precision);
        self.recall.push(recall);
        self.f1.push(f1);
    }

    pub fn len(&self) -> usize {
        self.f1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.f1.is_empty()
    }

    pub fn mean_precision(&self) -> f64 {
        mean(&self.precision)
    }

    pub fn mean_recall(&self) -> f64 {
        mean(&self.recall)
    }

    pub fn mean_f1(&self) -> f64 {
        mean(&self.f1)
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Output of a reconstruction strategy for one video. Only the clips that were
/// masked (and filled) are kept, keyed by their index in the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconstructed {
    pub video_id: String,
    pub reconstructed_clips: BTreeMap<usize, CaptionedClip>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ClipScores>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<serde_json::Value>,
}

impl Reconstructed {
    pub fn new(video_id: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            reconstructed_clips: BTreeMap::new(),
            skip_reason: None,
            metrics: None,
            debug: None,
        }
    }

    /// Keeps the clips at `masked.masked_indices` from a full-length output.
    pub fn from_full(masked: &MaskedVideo, clips: Vec<CaptionedClip>) -> Self {
        let mut out = Self::new(masked.video_id());
        for (idx, clip) in clips.into_iter().enumerate() {
            if masked.is_masked(idx) {
                out.reconstructed_clips.insert(idx, clip);
            }
        }
        out
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip_reason = Some(reason.into());
        self
    }

    pub fn with_metrics(mut self, metrics: ClipScores) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_debug(mut self, debug: serde_json::Value) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }

    /// Pairs every filled clip with the original caption at the same index.
    /// Returns `(candidates, references)` in index order; indices that are out
    /// of range or still missing on either side are dropped.
    pub fn align(&self, original: &[CaptionedClip]) -> (Vec<String>, Vec<String>) {
        let mut candidates = Vec::new();
        let mut references = Vec::new();
        for (idx, clip) in &self.reconstructed_clips {
            let Some(candidate) = clip.data.description() else {
                continue;
            };
            let Some(reference) = original.get(*idx).and_then(|c| c.data.description()) else {
                continue;
            };
            candidates.push(candidate.to_string());
            references.push(reference.to_string());
        }
        (candidates, references)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoStatus {
    Scored,
    Skipped,
    /// The masking plan produced no mask for this video (too short).
    Unmasked,
    Failed,
}

/// One line of `all_recon_videos.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub position: usize,
    pub video_id: String,
    pub status: VideoStatus,
    #[serde(default)]
    pub masked_indices: Vec<usize>,
    #[serde(default)]
    pub pairs: Vec<AlignedPair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconstruction: Option<Reconstructed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignedPair {
    pub index: usize,
    pub reference: String,
    pub candidate: String,
    pub f1: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(n: usize) -> CaptionedVideo {
        CaptionedVideo {
            video_id: "v1".into(),
            clips: (0..n)
                .map(|i| CaptionedClip::new((i + 1) as f64, format!("caption {i}")))
                .collect(),
        }
    }

    #[test]
    fn missing_serializes_as_sentinel() {
        let clip = CaptionedClip::new(1.0, "a dog runs").masked();
        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["data"], serde_json::json!(DATA_MISSING));

        let back: CaptionedClip = serde_json::from_value(json).unwrap();
        assert!(back.data.is_missing());
    }

    #[test]
    fn payload_ignores_extra_keys() {
        let clip: CaptionedClip = serde_json::from_str(
            r#"{"timestamp": 2.0, "data": {"description": "x", "mood": "calm"}}"#,
        )
        .unwrap();
        assert_eq!(clip.data, ClipData::caption("x"));
    }

    #[test]
    fn structured_annotations_pass_through() {
        let raw = r#"{"timestamp": 2.0, "data": {"description": "x", "objects": ["dog"], "verbs": ["runs"]}}"#;
        let clip: CaptionedClip = serde_json::from_str(raw).unwrap();
        match &clip.data {
            ClipData::Caption(p) => {
                assert_eq!(p.objects, vec!["dog".to_string()]);
                assert_eq!(p.verbs, vec!["runs".to_string()]);
            }
            ClipData::Missing => panic!("expected a caption"),
        }
        let json = serde_json::to_value(&clip).unwrap();
        assert_eq!(json["data"]["objects"], serde_json::json!(["dog"]));

        let plain = serde_json::to_value(CaptionedClip::new(1.0, "y")).unwrap();
        assert!(plain["data"].get("objects").is_none());
    }

    #[test]
    fn arbitrary_string_is_not_missing() {
        let err = serde_json::from_str::<CaptionedClip>(r#"{"timestamp": 2.0, "data": "nope"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("unexpected clip data string"));
    }

    #[test]
    fn align_uses_index_order_and_drops_gaps() {
        let original = video(4);
        let masked = MaskedVideo {
            video: original.clone(),
            masked_indices: vec![1, 3],
        };
        let mut clips = original.clips.clone();
        clips[1] = CaptionedClip::new(2.0, "guess one");
        clips[3] = CaptionedClip::new(4.0, "guess three").masked();

        let recon = Reconstructed::from_full(&masked, clips);
        assert_eq!(recon.reconstructed_clips.len(), 2);

        let (cands, refs) = recon.align(&original.clips);
        assert_eq!(cands, vec!["guess one".to_string()]);
        assert_eq!(refs, vec!["caption 1".to_string()]);
    }

    #[test]
    fn skip_and_metrics_chain() {
        let mut scores = ClipScores::default();
        scores.push(1.0, 0.5, 0.6);
        let r = Reconstructed::new("v")
            .with_metrics(scores)
            .skip("parse_failed");
        assert!(r.is_skipped());
        assert_eq!(r.metrics.as_ref().map(|m| m.len()), Some(1));
    }

    #[test]
    fn reconstructed_roundtrips_with_integer_keys() {
        let mut r = Reconstructed::new("v");
        r.reconstructed_clips
            .insert(7, CaptionedClip::new(8.0, "late caption"));
        let s = serde_json::to_string(&r).unwrap();
        let back: Reconstructed = serde_json::from_str(&s).unwrap();
        assert_eq!(back, r);
    }
}
