use recap_core::engine::batch::read_recon_videos;
use recap_core::errors::TrackingError;
use recap_core::model::VideoRecord;

use crate::cli::args::InspectArgs;
use crate::cli::commands::{exit_codes, open_existing_tracker, tracking_dir};

pub fn run(args: InspectArgs) -> anyhow::Result<i32> {
    let dir = tracking_dir(&args.tracking, None);
    let Some(tracker) = open_existing_tracker(&dir)? else {
        eprintln!("error: no tracking store in {}", dir.display());
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let run = match tracker.find_run(&args.run) {
        Ok(run) => run,
        Err(e) => match e.downcast_ref::<TrackingError>() {
            Some(lookup) => {
                eprintln!("error: {}", lookup);
                return Ok(exit_codes::CONFIG_ERROR);
            }
            None => return Err(e),
        },
    };

    let records = read_recon_videos(&tracker, &run.id)?;
    let selected: Vec<&VideoRecord> = match (&args.video, args.index) {
        (Some(id), _) => records.iter().filter(|r| &r.video_id == id).collect(),
        (None, Some(i)) => records.iter().filter(|r| r.position == i).collect(),
        (None, None) => records.iter().collect(),
    };
    if selected.is_empty() {
        eprintln!("error: no matching video in run {}", run.name);
        return Ok(exit_codes::CONFIG_ERROR);
    }

    println!("Run {} ({}) [{}]", run.name, run.id, run.status);
    for record in selected {
        print!("{}", format_record(record));
    }
    Ok(exit_codes::SUCCESS)
}

fn format_record(r: &VideoRecord) -> String {
    let mut out = format!(
        "\n#{} {} [{}] masked={:?}\n",
        r.position,
        r.video_id,
        serde_json::to_value(r.status)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default(),
        r.masked_indices
    );
    if let Some(reason) = r.reconstruction.as_ref().and_then(|x| x.skip_reason.as_deref()) {
        out.push_str(&format!("  skipped: {}\n", reason));
    }
    if let Some(err) = &r.error {
        out.push_str(&format!("  error: {}\n", err));
    }
    for p in &r.pairs {
        out.push_str(&format!(
            "  [{}] f1={:.4}\n    ref: {}\n    rec: {}\n",
            p.index, p.f1, p.reference, p.candidate
        ));
    }
    out
}
