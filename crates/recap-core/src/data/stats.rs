//! Dataset statistics: caption counts, caption length and video duration.

use crate::model::CaptionedVideo;
use serde::Serialize;
use std::fmt;

/// `describe()`-style summary of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub median: f64,
    pub max: f64,
}

impl Describe {
    pub fn of(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);
        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        // sample std, NaN-free for a single value
        let std = if count > 1 {
            (sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64).sqrt()
        } else {
            0.0
        };
        let median = if count % 2 == 1 {
            sorted[count / 2]
        } else {
            (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
        };
        Some(Self {
            count,
            mean,
            std,
            min: sorted[0],
            median,
            max: sorted[count - 1],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub videos: usize,
    pub captions: usize,
    pub captions_per_video: Option<Describe>,
    pub words_per_caption: Option<Describe>,
    /// Based on the last timestamp of each video.
    pub duration_secs: Option<Describe>,
}

pub fn dataset_stats(videos: &[CaptionedVideo]) -> DatasetStats {
    let per_video: Vec<f64> = videos.iter().map(|v| v.clips.len() as f64).collect();
    let words: Vec<f64> = videos
        .iter()
        .flat_map(|v| v.descriptions())
        .map(|d| d.split_whitespace().count() as f64)
        .collect();
    let durations: Vec<f64> = videos
        .iter()
        .filter_map(|v| v.clips.iter().map(|c| c.timestamp).reduce(f64::max))
        .collect();

    DatasetStats {
        videos: videos.len(),
        captions: words.len(),
        captions_per_video: Describe::of(&per_video),
        words_per_caption: Describe::of(&words),
        duration_secs: Describe::of(&durations),
    }
}

pub fn seconds_to_mmss(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn num(x: f64) -> String {
    if x.fract() == 0.0 {
        format!("{}", x as i64)
    } else {
        format!("{:.1}", x)
    }
}

fn write_describe(f: &mut fmt::Formatter<'_>, title: &str, d: Option<&Describe>) -> fmt::Result {
    writeln!(f, "\n--- {} ---", title)?;
    match d {
        Some(d) => writeln!(
            f,
            "count {}  mean {}  std {}  min {}  median {}  max {}",
            d.count,
            num(d.mean),
            num(d.std),
            num(d.min),
            num(d.median),
            num(d.max)
        ),
        None => writeln!(f, "N/A"),
    }
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total videos: {}", self.videos)?;
        writeln!(f, "Total captions: {}", self.captions)?;
        write_describe(f, "Captions per video", self.captions_per_video.as_ref())?;
        write_describe(f, "Caption length (words)", self.words_per_caption.as_ref())?;
        write_describe(f, "Video duration (seconds)", self.duration_secs.as_ref())?;
        if let Some(d) = &self.duration_secs {
            writeln!(
                f,
                "min {}  median {}  max {} (MM:SS)",
                seconds_to_mmss(d.min),
                seconds_to_mmss(d.median),
                seconds_to_mmss(d.max)
            )?;
        }
        Ok(())
    }
}
