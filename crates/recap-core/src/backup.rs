//! Copy tracking artifacts to a backup location (e.g. a mounted drive).

use anyhow::Context;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::path::{Path, PathBuf};

pub struct Backuper {
    dest: PathBuf,
}

impl Backuper {
    pub fn new(dest: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dest)
            .with_context(|| format!("failed to create backup dir {}", dest.display()))?;
        tracing::info!(dest = %dest.display(), "backup destination ready");
        Ok(Self {
            dest: dest.to_path_buf(),
        })
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Copy `src` into the destination under its own file name.
    pub fn backup_file(&self, src: &Path) -> anyhow::Result<PathBuf> {
        if !src.is_file() {
            anyhow::bail!("backup source file not found: {}", src.display());
        }
        let name = src
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("backup source has no file name: {}", src.display()))?;
        let out = self.dest.join(name);
        std::fs::copy(src, &out)
            .with_context(|| format!("failed to copy {} to {}", src.display(), out.display()))?;
        tracing::info!(src = %src.display(), dest = %out.display(), "file backed up");
        Ok(out)
    }

    /// Archive `src` as `{prefix}_{YYYYmmdd_HHMMSS}.tar.gz` in the destination.
    /// Entry names are relative to `src`.
    pub fn backup_dir_as_archive(&self, src: &Path, prefix: &str) -> anyhow::Result<PathBuf> {
        if !src.is_dir() {
            anyhow::bail!("backup source directory not found: {}", src.display());
        }
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let out = self.dest.join(format!("{prefix}_{stamp}.tar.gz"));

        let tmp = tempfile::NamedTempFile::new_in(&self.dest)?;
        let enc = GzEncoder::new(tmp.as_file(), Compression::default());
        let mut builder = tar::Builder::new(enc);
        let mut files = Vec::new();
        collect_files(src, &mut files)?;
        files.sort();
        for path in &files {
            let rel = path.strip_prefix(src)?;
            builder
                .append_path_with_name(path, rel)
                .with_context(|| format!("failed to archive {}", path.display()))?;
        }
        builder.into_inner()?.finish()?;
        tmp.persist(&out)
            .with_context(|| format!("failed to write archive {}", out.display()))?;

        tracing::info!(src = %src.display(), archive = %out.display(), files = files.len(), "directory backed up");
        Ok(out)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
