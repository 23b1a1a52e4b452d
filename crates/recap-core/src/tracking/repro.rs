//! Reproducibility info recorded on every batch.
//!
//! Capture never fails because a tool is missing: fields fall back to
//! `"unknown"` (or `None` for the dirty flag) when git is unavailable or the
//! directory is not a repository.

use crate::errors::TrackingError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;

pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproInfo {
    pub git_commit: String,
    pub git_dirty: Option<bool>,
    pub recap_version: String,
    pub os: String,
    pub arch: String,
}

impl ReproInfo {
    pub fn params(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("git_commit_hash".to_string(), self.git_commit.clone()),
            (
                "git_dirty".to_string(),
                self.git_dirty
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| UNKNOWN.to_string()),
            ),
            ("recap_version".to_string(), self.recap_version.clone()),
            ("os".to_string(), self.os.clone()),
            ("arch".to_string(), self.arch.clone()),
        ])
    }
}

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let out = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    String::from_utf8(out.stdout).ok().map(|s| s.trim().to_string())
}

/// Capture git state for `dir`. With `require_clean`, a tree with uncommitted
/// or untracked changes is an error.
pub fn capture(dir: &Path, require_clean: bool) -> Result<ReproInfo, TrackingError> {
    let git_commit = git(dir, &["rev-parse", "HEAD"])
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string());
    let git_dirty = git(dir, &["status", "--porcelain"]).map(|s| !s.is_empty());

    if require_clean && git_dirty == Some(true) {
        return Err(TrackingError::DirtyWorkingTree {
            path: dir.to_path_buf(),
        });
    }

    let info = ReproInfo {
        git_commit,
        git_dirty,
        recap_version: env!("CARGO_PKG_VERSION").to_string(),
        os: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
    };
    tracing::debug!(commit = %info.git_commit, dirty = ?info.git_dirty, "captured repro info");
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    #[test]
    fn outside_a_repository_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let info = capture(dir.path(), true).unwrap();
        assert_eq!(info.git_commit, UNKNOWN);
        assert_eq!(info.git_dirty, None);
        assert_eq!(info.params()["git_dirty"], UNKNOWN);
        assert!(!info.recap_version.is_empty());
    }

    #[test]
    fn dirty_tree_is_rejected_when_clean_required() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let ok = Command::new("git")
            .arg("-C")
            .arg(dir.path())
            .args(["init", "-q"])
            .status()
            .map(|s| s.success())
            .unwrap_or(false);
        if !ok {
            return;
        }
        std::fs::write(dir.path().join("notes.txt"), "wip").unwrap();

        let info = capture(dir.path(), false).unwrap();
        assert_eq!(info.git_dirty, Some(true));

        let err = capture(dir.path(), true).unwrap_err();
        assert!(matches!(err, TrackingError::DirtyWorkingTree { .. }));
    }
}
