//! Batch config: YAML schema, loading and system-config merge.

pub mod validate;

use crate::errors::diagnostic::{codes, Diagnostic};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use validate::validate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    pub batch_name: String,
    pub base_params: BaseParams,
    pub data_config: DataConfig,
    pub llm: LlmConfig,
    pub recon_strategy: Vec<StrategyConfig>,
    pub masking_configs: Vec<MaskingConfig>,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseParams {
    pub experiment_name: String,
    pub master_seed: u64,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default)]
    pub require_clean_git: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model_name: String,
    pub temperature: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_true")]
    pub json_mode: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_min_secs")]
    pub backoff_min_secs: f64,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: StrategyKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StrategyKind {
    BaselineRepeatLast,
    Llm { prompt_template: PathBuf },
}

impl StrategyKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            StrategyKind::BaselineRepeatLast => "baseline_repeat_last",
            StrategyKind::Llm { .. } => "llm",
        }
    }
}

/// One `masking_configs` entry. Each entry expands into several concrete
/// masking plans (see [`crate::masking::expand_masking_configs`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "scheme", rename_all = "snake_case")]
pub enum MaskingConfig {
    Partition {
        num_partitions: usize,
        num_parts_to_mask: Vec<usize>,
    },
    Contiguous {
        width: Vec<usize>,
        seed: Vec<u64>,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    #[default]
    Lexical,
    Embedding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub scorer: ScorerKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            scorer: ScorerKind::default(),
            embedding_model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_tracking_dir")]
    pub dir: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_file: Option<PathBuf>,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            dir: default_tracking_dir(),
            lock_file: None,
        }
    }
}

fn default_parallel() -> usize {
    4
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    6
}

fn default_backoff_min_secs() -> f64 {
    5.0
}

fn default_backoff_max_secs() -> f64 {
    120.0
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_tracking_dir() -> PathBuf {
    PathBuf::from(".recap")
}

/// A parsed config plus what the loader noticed along the way.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: BatchConfig,
    /// Directory relative paths in the config are resolved against.
    pub base_dir: PathBuf,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadedConfig {
    pub fn resolve(&self, path: &Path) -> PathBuf {
        resolve_path(&self.base_dir, path)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Resolve `path` against `base_dir` unless it is already absolute.
pub fn resolve_path(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn base_dir_of(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn read_yaml(path: &Path) -> Result<serde_yaml::Value, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Shallow merge: top-level keys of `overlay` replace those of `base`.
pub fn merge_top_level(base: serde_yaml::Value, overlay: serde_yaml::Value) -> serde_yaml::Value {
    match (base, overlay) {
        (serde_yaml::Value::Mapping(mut b), serde_yaml::Value::Mapping(o)) => {
            for (k, v) in o {
                b.insert(k, v);
            }
            serde_yaml::Value::Mapping(b)
        }
        (_, overlay) => overlay,
    }
}

fn deserialize_value(
    value: serde_yaml::Value,
    path: &Path,
) -> Result<(BatchConfig, Vec<Diagnostic>), ConfigError> {
    // Flattened and internally tagged entries swallow extra keys before
    // serde_ignored sees them, so those lists are checked by hand.
    let mut unknown = nested_unknown_keys(&value);
    let cfg: BatchConfig = serde_ignored::deserialize(value, |p| unknown.push(p.to_string()))
        .map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let diags = unknown
        .into_iter()
        .map(|key| {
            tracing::warn!(key = %key, file = %path.display(), "ignoring unknown config key");
            Diagnostic::warning(codes::W_UNKNOWN_KEY, format!("unknown key `{}`", key))
                .with_context(serde_json::json!({ "file": path, "key": key }))
                .with_fix_step("remove the key or check its spelling")
        })
        .collect();
    Ok((cfg, diags))
}

fn strategy_fields(tag: &str) -> &'static [&'static str] {
    match tag {
        "llm" => &["name", "type", "prompt_template"],
        _ => &["name", "type"],
    }
}

fn masking_fields(tag: &str) -> &'static [&'static str] {
    match tag {
        "partition" => &["scheme", "num_partitions", "num_parts_to_mask"],
        "contiguous" => &["scheme", "width", "seed"],
        _ => &["scheme"],
    }
}

fn nested_unknown_keys(value: &serde_yaml::Value) -> Vec<String> {
    let mut unknown = Vec::new();
    let lists: [(&str, &str, fn(&str) -> &'static [&'static str]); 2] = [
        ("recon_strategy", "type", strategy_fields),
        ("masking_configs", "scheme", masking_fields),
    ];
    for (list, tag_key, fields) in lists {
        let Some(entries) = value.get(list).and_then(|v| v.as_sequence()) else {
            continue;
        };
        for (i, entry) in entries.iter().enumerate() {
            let Some(map) = entry.as_mapping() else {
                continue;
            };
            let tag = entry.get(tag_key).and_then(|t| t.as_str()).unwrap_or_default();
            let known = fields(tag);
            for key in map.keys().filter_map(|k| k.as_str()) {
                if !known.contains(&key) {
                    unknown.push(format!("{list}[{i}].{key}"));
                }
            }
        }
    }
    unknown
}

/// Parse a batch config without failing on validation errors. Parse and read
/// failures are still errors; everything else lands in `diagnostics`.
pub fn load_unchecked(path: &Path, system: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    let mut value = read_yaml(path)?;
    if let Some(system) = system {
        let sys = read_yaml(system)?;
        value = merge_top_level(sys, value);
    }
    let (config, mut diagnostics) = deserialize_value(value, path)?;
    let base_dir = base_dir_of(path);
    diagnostics.extend(validate(&config, &base_dir));
    Ok(LoadedConfig {
        config,
        base_dir,
        diagnostics,
    })
}

/// Load and validate a batch config. Fails on the first error diagnostic.
pub fn load_batch_config(path: &Path) -> Result<LoadedConfig, ConfigError> {
    load_batch_config_with_system(None, path)
}

/// Like [`load_batch_config`], with a system config underneath: top-level keys
/// of the batch config override those of the system config.
pub fn load_batch_config_with_system(
    system: Option<&Path>,
    path: &Path,
) -> Result<LoadedConfig, ConfigError> {
    let loaded = load_unchecked(path, system)?;
    if let Some(first) = loaded.diagnostics.iter().find(|d| d.is_error()) {
        return Err(ConfigError::Invalid(first.clone()));
    }
    Ok(loaded)
}
