use super::{resolve_path, BatchConfig, MaskingConfig, StrategyKind};
use crate::data::KNOWN_DATASETS;
use crate::errors::diagnostic::{codes, Diagnostic};
use serde_json::json;
use std::collections::HashSet;
use std::path::Path;

/// Schema checks that serde cannot express. Paths are resolved against
/// `base_dir` (the config file's directory).
/// Upper bound for either backoff setting, one day.
pub const MAX_BACKOFF_SECS: f64 = 86_400.0;

pub fn validate(cfg: &BatchConfig, base_dir: &Path) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    require_non_empty(&mut out, "batch_name", &cfg.batch_name);
    require_non_empty(
        &mut out,
        "base_params.experiment_name",
        &cfg.base_params.experiment_name,
    );
    require_non_empty(&mut out, "data_config.name", &cfg.data_config.name);
    require_non_empty(&mut out, "llm.model_name", &cfg.llm.model_name);

    if cfg.data_config.path.as_os_str().is_empty() {
        out.push(schema_error("data_config.path must not be empty"));
    }

    if !cfg.data_config.name.is_empty() && !KNOWN_DATASETS.contains(&cfg.data_config.name.as_str())
    {
        out.push(
            Diagnostic::new(
                codes::E_DATASET_UNKNOWN,
                format!("unknown dataset '{}'", cfg.data_config.name),
            )
            .with_context(json!({ "known": KNOWN_DATASETS }))
            .with_fix_step(format!("set data_config.name to one of {:?}", KNOWN_DATASETS)),
        );
    }

    if !(0.0..=2.0).contains(&cfg.llm.temperature) {
        out.push(schema_error(format!(
            "llm.temperature must be within [0, 2], got {}",
            cfg.llm.temperature
        )));
    }
    if cfg.llm.max_attempts == 0 {
        out.push(schema_error("llm.max_attempts must be at least 1"));
    }
    let (min, max) = (cfg.llm.backoff_min_secs, cfg.llm.backoff_max_secs);
    if !(0.0..=MAX_BACKOFF_SECS).contains(&min)
        || !(0.0..=MAX_BACKOFF_SECS).contains(&max)
        || max < min
    {
        out.push(schema_error(format!(
            "llm.backoff_min_secs and llm.backoff_max_secs must satisfy 0 <= min <= max <= {MAX_BACKOFF_SECS}, got {min} and {max}"
        )));
    }
    if cfg.base_params.parallel == 0 {
        out.push(schema_error("base_params.parallel must be at least 1"));
    }

    validate_strategies(cfg, base_dir, &mut out);
    validate_masking(cfg, &mut out);
    out
}

fn validate_strategies(cfg: &BatchConfig, base_dir: &Path, out: &mut Vec<Diagnostic>) {
    if cfg.recon_strategy.is_empty() {
        out.push(schema_error("recon_strategy must list at least one strategy"));
    }

    let mut seen = HashSet::new();
    for (i, s) in cfg.recon_strategy.iter().enumerate() {
        if s.name.trim().is_empty() {
            out.push(schema_error(format!("recon_strategy[{i}].name must not be empty")));
        } else if !seen.insert(s.name.as_str()) {
            out.push(schema_error(format!(
                "duplicate strategy name '{}' in recon_strategy",
                s.name
            )));
        }

        if let StrategyKind::Llm { prompt_template } = &s.kind {
            let resolved = resolve_path(base_dir, prompt_template);
            if !resolved.is_file() {
                out.push(
                    Diagnostic::new(
                        codes::E_PATH_NOT_FOUND,
                        format!(
                            "prompt template for strategy '{}' not found: {}",
                            s.name,
                            resolved.display()
                        ),
                    )
                    .with_context(json!({
                        "strategy": s.name,
                        "prompt_template": prompt_template,
                        "resolved": resolved,
                    }))
                    .with_fix_step("paths are resolved relative to the config file's directory"),
                );
            }
        }
    }
}

fn validate_masking(cfg: &BatchConfig, out: &mut Vec<Diagnostic>) {
    if cfg.masking_configs.is_empty() {
        out.push(schema_error("masking_configs must list at least one scheme"));
    }

    for (i, m) in cfg.masking_configs.iter().enumerate() {
        match m {
            MaskingConfig::Partition {
                num_partitions,
                num_parts_to_mask,
            } => {
                if *num_partitions < 2 {
                    out.push(schema_error(format!(
                        "masking_configs[{i}]: num_partitions must be at least 2, got {num_partitions}"
                    )));
                }
                if num_parts_to_mask.is_empty() {
                    out.push(schema_error(format!(
                        "masking_configs[{i}]: num_parts_to_mask must not be empty"
                    )));
                }
                let bad: Vec<usize> = num_parts_to_mask
                    .iter()
                    .copied()
                    .filter(|k| *k == 0 || *k >= *num_partitions)
                    .collect();
                if !bad.is_empty() {
                    out.push(
                        Diagnostic::new(
                            codes::E_MASK_RANGE,
                            format!(
                                "masking_configs[{i}]: num_parts_to_mask values {:?} must be between 1 and {}",
                                bad,
                                num_partitions.saturating_sub(1)
                            ),
                        )
                        .with_context(json!({
                            "num_partitions": num_partitions,
                            "num_parts_to_mask": num_parts_to_mask,
                        }))
                        .with_fix_step("masking every partition leaves nothing to reconstruct from"),
                    );
                }
            }
            MaskingConfig::Contiguous { width, seed } => {
                if width.is_empty() {
                    out.push(schema_error(format!(
                        "masking_configs[{i}]: width must not be empty"
                    )));
                }
                if seed.is_empty() {
                    out.push(schema_error(format!(
                        "masking_configs[{i}]: seed must not be empty"
                    )));
                }
                if width.contains(&0) {
                    out.push(
                        Diagnostic::new(
                            codes::E_MASK_RANGE,
                            format!("masking_configs[{i}]: width values must be at least 1"),
                        )
                        .with_context(json!({ "width": width })),
                    );
                }
            }
        }
    }
}

fn require_non_empty(out: &mut Vec<Diagnostic>, field: &str, value: &str) {
    if value.trim().is_empty() {
        out.push(schema_error(format!("{field} must not be empty")));
    }
}

fn schema_error(message: impl Into<String>) -> Diagnostic {
    Diagnostic::new(codes::E_CFG_SCHEMA, message)
}
