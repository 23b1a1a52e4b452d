use crate::report::progress::{ProgressEvent, ProgressSink};
use crate::report::{BatchSummary, ChildRunSummary};
use crate::tracking::RunStatus;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// --- progress (throttled, completion order) ---

#[must_use]
pub fn format_progress_line(run: &str, done: usize, total: usize) -> String {
    format!("{}: video {}/{}", run, done, total)
}

pub fn emit_progress_line(line: &str) {
    eprintln!("{}", line);
}

const PROGRESS_MIN_INTERVAL_MS: u64 = 200;

/// For large runs, emit at most every this many videos.
pub(crate) fn progress_step(total: usize) -> usize {
    if total <= 10 {
        1
    } else {
        std::cmp::max(1, total / 10)
    }
}

struct ThrottleState {
    last_emit: Option<Instant>,
}

/// Throttled sink printing to stderr. `None` for runs of zero or one video.
/// The final `total/total` line is always printed.
pub fn default_progress_sink(run: &str, total: usize) -> Option<ProgressSink> {
    if total <= 1 {
        return None;
    }
    let run = run.to_string();
    let step = progress_step(total);
    let state = Arc::new(Mutex::new(ThrottleState { last_emit: None }));
    Some(Arc::new(move |ev: ProgressEvent| {
        if ev.total == 0 {
            return;
        }
        let now = Instant::now();
        let should_emit = {
            let mut g = state.lock().expect("progress throttle lock");
            let emit_final = ev.done == ev.total;
            let emit_step = ev.done.is_multiple_of(step) || ev.done == 1;
            let interval_ok = g
                .last_emit
                .map(|t| {
                    now.saturating_duration_since(t)
                        >= Duration::from_millis(PROGRESS_MIN_INTERVAL_MS)
                })
                .unwrap_or(true);
            let ok = emit_final || (emit_step && interval_ok);
            if ok {
                g.last_emit = Some(now);
            }
            ok
        };
        if should_emit {
            emit_progress_line(&format_progress_line(&run, ev.done, ev.total));
        }
    }))
}

// --- run table ---

fn metric(v: Option<f64>) -> String {
    v.map(|x| format!("{:.4}", x)).unwrap_or_else(|| "—".into())
}

pub fn format_run_line(r: &ChildRunSummary) -> String {
    let icon = match r.status {
        RunStatus::Finished => "✅",
        RunStatus::Failed => "❌",
        RunStatus::Running => "⏳",
    };
    format!(
        "{} {:<36} n={:<4} f1={} p={} r={} skipped={} failed={} ({:.1}s)",
        icon,
        r.name,
        r.metrics.map(|m| m.num_of_instances).unwrap_or(0),
        metric(r.metrics.map(|m| m.mean_f1_score)),
        metric(r.metrics.map(|m| m.mean_precision)),
        metric(r.metrics.map(|m| m.mean_recall)),
        r.num_skipped,
        r.num_failed,
        r.duration_ms as f64 / 1000.0
    )
}

pub fn print_batch_summary(summary: &BatchSummary) {
    eprintln!();
    for r in &summary.runs {
        eprintln!("{}", format_run_line(r));
        if let Some(err) = &r.error {
            eprintln!("    → {}", err);
        }
    }
    print_batch_footer(summary);
}

pub fn print_batch_footer(summary: &BatchSummary) {
    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!(
        "Batch {} ({}): {} runs, {} failed, parent run {} [{:.1}s]",
        summary.batch_name,
        summary.experiment,
        summary.runs.len(),
        summary.failed_runs(),
        summary.parent_run_id,
        summary.duration_ms as f64 / 1000.0
    );
    let dirty = summary
        .repro
        .git_dirty
        .map(|d| if d { " (dirty)" } else { "" })
        .unwrap_or("");
    eprintln!(
        "Commit: {}{}  recap {}",
        summary.repro.git_commit, dirty, summary.repro.recap_version
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::RunMetrics;

    #[test]
    fn progress_line_has_counts() {
        let s = format_progress_line("base_partition_p5_k1", 3, 10);
        assert!(s.contains("3/10"), "{s}");
        assert!(s.starts_with("base_partition_p5_k1"));
    }

    #[test]
    fn no_sink_for_tiny_runs() {
        assert!(default_progress_sink("x", 0).is_none());
        assert!(default_progress_sink("x", 1).is_none());
        assert!(default_progress_sink("x", 2).is_some());
    }

    #[test]
    fn progress_step_logic() {
        assert_eq!(progress_step(5), 1);
        assert_eq!(progress_step(25), 2);
        assert_eq!(progress_step(100), 10);
    }

    #[test]
    fn run_line_shows_metrics_or_dash() {
        let mut r = ChildRunSummary {
            run_id: "id".into(),
            name: "llm_v1_contiguous_w2_s7".into(),
            strategy: "llm_v1".into(),
            masking: "contiguous_w2_s7".into(),
            status: RunStatus::Finished,
            num_videos: 3,
            num_scored: 3,
            num_skipped: 0,
            num_unmasked: 0,
            num_failed: 0,
            metrics: Some(RunMetrics {
                num_of_instances: 3,
                mean_f1_score: 0.5,
                mean_precision: 0.25,
                mean_recall: 1.0,
            }),
            error: None,
            duration_ms: 1500,
        };
        let line = format_run_line(&r);
        assert!(line.contains("f1=0.5000"), "{line}");
        assert!(line.contains("n=3"));

        r.metrics = None;
        r.status = RunStatus::Failed;
        let line = format_run_line(&r);
        assert!(line.contains("f1=—"), "{line}");
        assert!(line.starts_with("❌"));
    }
}
