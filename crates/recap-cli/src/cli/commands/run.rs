use anyhow::Context;
use recap_core::config::load_batch_config_with_system;
use recap_core::engine::{BatchOptions, BatchRunner};
use recap_core::errors::{ConfigError, LlmError, TrackingError};
use recap_core::report::{console, json};
use recap_core::tracking::Tracker;

use crate::cli::args::RunArgs;
use crate::cli::commands::{exit_codes, tracking_dir};

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    let loaded = match load_batch_config_with_system(args.system_config.as_deref(), &args.config) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{}", e.to_diagnostic().format_terminal());
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    for warning in &loaded.diagnostics {
        eprintln!("{}", warning.format_terminal());
    }

    let dir = tracking_dir(&args.tracking, Some(&loaded));
    tracing::info!(tracking_dir = %dir.display(), config = %args.config.display(), "starting run");
    let tracker = Tracker::open(&dir)
        .with_context(|| format!("failed to open tracking store in {}", dir.display()))?;

    let runner = BatchRunner::new(loaded, tracker, &dir).with_options(BatchOptions {
        allow_dirty: args.allow_dirty,
        refresh_cache: args.refresh_cache,
        show_progress: !args.quiet,
    });

    let summary = match runner.run().await {
        Ok(s) => s,
        Err(e) => {
            if let Some(msg) = user_facing(&e) {
                eprintln!("error: {}", msg);
                return Ok(exit_codes::CONFIG_ERROR);
            }
            return Err(e);
        }
    };

    console::print_batch_summary(&summary);
    if let Some(path) = &args.summary {
        json::write_summary(&summary, path)?;
        eprintln!("Summary written to {}", path.display());
    }

    Ok(if summary.is_success() {
        exit_codes::SUCCESS
    } else {
        exit_codes::RUN_FAILED
    })
}

/// One-line message for failures the user fixes outside the tool (dirty tree,
/// missing key, bad data path). Anything else keeps its full error chain.
fn user_facing(err: &anyhow::Error) -> Option<String> {
    if let Some(e) = err.downcast_ref::<TrackingError>() {
        return Some(e.to_string());
    }
    if let Some(e) = err.downcast_ref::<LlmError>() {
        if matches!(e, LlmError::MissingApiKey { .. }) {
            return Some(e.to_string());
        }
    }
    if let Some(e) = err.downcast_ref::<ConfigError>() {
        return Some(e.to_diagnostic().format_terminal());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_tree_is_user_facing() {
        let err = anyhow::Error::new(TrackingError::DirtyWorkingTree {
            path: "/repo".into(),
        });
        let msg = user_facing(&err).unwrap();
        assert!(msg.contains("--allow-dirty"));
    }

    #[test]
    fn network_errors_keep_their_chain() {
        let err = anyhow::Error::new(LlmError::Network {
            message: "connection reset".into(),
        });
        assert!(user_facing(&err).is_none());
    }
}
