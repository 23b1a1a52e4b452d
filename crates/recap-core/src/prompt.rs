use crate::model::{MaskedVideo, DATA_MISSING};
use anyhow::Context;
use std::path::{Path, PathBuf};

/// Placeholder for the missing marker inside a template.
pub const MISSING_PLACEHOLDER: &str = "{DATA_MISSING}";
/// Optional placeholder for where the clip array goes. Without it the array
/// is appended after a `---` separator.
pub const DATA_PLACEHOLDER: &str = "{DATA}";
const SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    text: String,
    source: Option<PathBuf>,
}

impl PromptTemplate {
    pub fn from_string(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            source: None,
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read prompt template {}", path.display()))?;
        Ok(Self {
            text: text.trim().to_string(),
            source: Some(path.to_path_buf()),
        })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Instruction text with the missing marker substituted.
    pub fn instruction(&self) -> String {
        self.text.replace(MISSING_PLACEHOLDER, DATA_MISSING)
    }

    pub fn render(&self, masked: &MaskedVideo) -> anyhow::Result<String> {
        let data = serde_json::to_string_pretty(&masked.video.clips)
            .context("failed to serialize masked clips")?;
        let instruction = self.instruction();
        if instruction.contains(DATA_PLACEHOLDER) {
            Ok(instruction.replace(DATA_PLACEHOLDER, &data))
        } else {
            Ok(format!("{instruction}{SEPARATOR}{data}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masking::apply_mask;
    use crate::model::{CaptionedClip, CaptionedVideo};

    fn masked() -> MaskedVideo {
        let video = CaptionedVideo {
            video_id: "v".into(),
            clips: vec![
                CaptionedClip::new(1.0, "a man opens a door"),
                CaptionedClip::new(2.0, "he walks inside"),
                CaptionedClip::new(3.0, "he sits down"),
            ],
        };
        apply_mask(&video, vec![1])
    }

    #[test]
    fn appends_clip_array_after_separator() {
        let t = PromptTemplate::from_string("Replace every {DATA_MISSING} entry.\n");
        let prompt = t.render(&masked()).unwrap();
        let (head, json) = prompt.split_once("\n\n---\n\n").unwrap();
        assert_eq!(head, format!("Replace every {DATA_MISSING} entry."));

        let clips: Vec<CaptionedClip> = serde_json::from_str(json).unwrap();
        assert_eq!(clips.len(), 3);
        assert!(clips[1].data.is_missing());
        assert_eq!(json.matches(DATA_MISSING).count(), 1);
    }

    #[test]
    fn data_placeholder_places_array_inline() {
        let t = PromptTemplate::from_string("Captions:\n{DATA}\nReturn JSON only.");
        let prompt = t.render(&masked()).unwrap();
        assert!(prompt.starts_with("Captions:\n["));
        assert!(prompt.ends_with("]\nReturn JSON only."));
        assert!(!prompt.contains("---"));
    }

    #[test]
    fn reads_template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.txt");
        std::fs::write(&path, "  fill {DATA_MISSING}  \n").unwrap();
        let t = PromptTemplate::from_file(&path).unwrap();
        assert_eq!(t.instruction(), format!("fill {DATA_MISSING}"));
        assert_eq!(t.source(), Some(path.as_path()));
        assert!(PromptTemplate::from_file(&dir.path().join("nope.txt")).is_err());
    }
}
