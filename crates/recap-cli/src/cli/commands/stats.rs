use recap_core::config::load_unchecked;
use recap_core::data::{load_videos, stats::dataset_stats};

use crate::cli::args::{OutputFormat, StatsArgs};
use crate::cli::commands::exit_codes;

pub fn run(args: StatsArgs) -> anyhow::Result<i32> {
    // Only the data section matters here, so strategy or masking mistakes
    // should not block a look at the dataset.
    let loaded = match load_unchecked(&args.config, args.system_config.as_deref()) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{}", e.to_diagnostic().format_terminal());
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let videos = load_videos(&loaded.config.data_config, &loaded.base_dir)?;
    let stats = dataset_stats(&videos);

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => {
            println!("Dataset: {}", loaded.config.data_config.name);
            print!("{}", stats);
        }
    }
    Ok(exit_codes::SUCCESS)
}
