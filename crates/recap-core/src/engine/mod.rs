pub mod batch;
pub mod runner;

pub use batch::{BatchOptions, BatchRunner};
pub use runner::{ExperimentRunner, RunOutcome};
