pub mod console;
pub mod json;
pub mod progress;
pub mod summary;

pub use summary::{BatchSummary, ChildRunSummary};
