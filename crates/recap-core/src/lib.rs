//! Core library for masked caption reconstruction experiments.
//!
//! A batch config describes a dataset, a set of masking schemes and a set of
//! reconstruction strategies. The [`engine::BatchRunner`] expands it into one
//! tracked child run per strategy × masking plan, masks every video, asks the
//! strategy to fill the gaps and scores the result against the ground truth.
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`config`] | YAML batch config, defaults, validation diagnostics |
//! | [`data`] | dataset loaders and dataset statistics |
//! | [`masking`] | partition / contiguous masking plans |
//! | [`strategy`] | baseline and LLM reconstruction |
//! | [`scoring`] | lexical and embedding similarity |
//! | [`tracking`] | runs, params, metrics, artifacts, reproducibility |
//! | [`engine`] | experiment and batch runners |

pub mod backup;
pub mod cache;
pub mod config;
pub mod data;
pub mod engine;
pub mod errors;
pub mod lock;
pub mod masking;
pub mod model;
pub mod parse;
pub mod prompt;
pub mod providers;
pub mod report;
pub mod scoring;
pub mod storage;
pub mod strategy;
pub mod tracking;
