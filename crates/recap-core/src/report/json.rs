use crate::report::BatchSummary;
use anyhow::Context;
use std::io::Write;
use std::path::Path;

/// Write the batch summary as pretty JSON. The file is replaced atomically so
/// a reader never sees a half-written summary.
pub fn write_summary(summary: &BatchSummary, out: &Path) -> anyhow::Result<()> {
    let dir = match out.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let json = serde_json::to_string_pretty(summary)?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(json.as_bytes())?;
    tmp.write_all(b"\n")?;
    tmp.persist(out)
        .with_context(|| format!("failed to write summary {}", out.display()))?;
    Ok(())
}

pub fn read_summary(path: &Path) -> anyhow::Result<BatchSummary> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read summary {}", path.display()))?;
    Ok(serde_json::from_str(&raw)?)
}
