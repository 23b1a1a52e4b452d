use recap_core::config::load_batch_config_with_system;
use recap_core::masking::expand_masking_configs;
use serde_json::json;

use crate::cli::args::{OutputFormat, PlanArgs};
use crate::cli::commands::exit_codes;

/// Print the child runs `recap run` would create, without touching data or
/// the tracking store.
pub fn run(args: PlanArgs) -> anyhow::Result<i32> {
    let loaded = match load_batch_config_with_system(args.system_config.as_deref(), &args.config) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("{}", e.to_diagnostic().format_terminal());
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    let cfg = &loaded.config;
    let plans = expand_masking_configs(&cfg.masking_configs, cfg.base_params.master_seed);

    let mut children = Vec::new();
    for strategy in &cfg.recon_strategy {
        for plan in &plans {
            children.push(json!({
                "name": format!("{}_{}", strategy.name, plan.name),
                "strategy": strategy.name,
                "strategy_type": strategy.kind.type_tag(),
                "masking": plan.params(),
            }));
        }
    }

    match args.format {
        OutputFormat::Json => {
            let out = json!({
                "batch_name": cfg.batch_name,
                "experiment": cfg.base_params.experiment_name,
                "runs": children,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        OutputFormat::Text => {
            println!(
                "{} ({}): {} runs",
                cfg.batch_name,
                cfg.base_params.experiment_name,
                children.len()
            );
            for child in &children {
                println!("  {}", child["name"].as_str().unwrap_or_default());
            }
        }
    }
    Ok(exit_codes::SUCCESS)
}
