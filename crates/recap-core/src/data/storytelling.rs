use super::{checked, truncate, DataLoader};
use crate::model::{CaptionedClip, CaptionedVideo};
use anyhow::Context;
use std::path::PathBuf;

/// Video Storytelling: one `<video_id>.txt` per video. The first line repeats
/// the video id; every other line is `MM:SS MM:SS caption words...`.
pub struct VideoStorytellingLoader {
    dir: PathBuf,
}

impl VideoStorytellingLoader {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

fn parse_mm_ss(s: &str) -> anyhow::Result<f64> {
    let (m, sec) = s
        .split_once(':')
        .with_context(|| format!("timestamp '{s}' is not MM:SS"))?;
    let m: u64 = m.parse().with_context(|| format!("bad minutes in '{s}'"))?;
    let sec: u64 = sec.parse().with_context(|| format!("bad seconds in '{s}'"))?;
    Ok((m * 60 + sec) as f64)
}

fn parse_file(body: &str) -> anyhow::Result<Vec<CaptionedClip>> {
    let mut clips = Vec::new();
    for line in body.lines().skip(1) {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 3 {
            continue;
        }
        let end = parse_mm_ss(parts[1])?;
        clips.push(CaptionedClip::new(end, parts[2..].join(" ")));
    }
    Ok(clips)
}

impl DataLoader for VideoStorytellingLoader {
    fn name(&self) -> &'static str {
        "video_storytelling"
    }

    fn load(&self, limit: Option<usize>) -> anyhow::Result<Vec<CaptionedVideo>> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
            .collect();
        files.sort();

        let mut videos = Vec::new();
        for path in truncate(files, limit) {
            let body = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let clips =
                parse_file(&body).with_context(|| format!("in {}", path.display()))?;
            let video_id = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            videos.push(CaptionedVideo { video_id, clips });
        }
        checked(videos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_end_times_and_skips_short_lines() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("b_video.txt"),
            "b_video\n00:00 00:05 A man walks in.\n00:05\n01:02 01:10 He sits   down.\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("a_video.txt"), "a_video\n00:00 00:02 Hi.\n").unwrap();
        std::fs::write(dir.path().join("notes.md"), "ignored").unwrap();

        let loader = VideoStorytellingLoader::new(dir.path().to_path_buf());
        let videos = loader.load(None).unwrap();
        assert_eq!(videos.len(), 2);
        assert_eq!(videos[0].video_id, "a_video");
        assert_eq!(
            videos[1].clips,
            vec![
                CaptionedClip::new(5.0, "A man walks in."),
                CaptionedClip::new(70.0, "He sits down."),
            ]
        );

        let limited = loader.load(Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].video_id, "a_video");
    }

    #[test]
    fn bad_timestamp_is_an_error() {
        assert!(parse_file("id\n00:00 xx caption here\n").is_err());
    }
}
