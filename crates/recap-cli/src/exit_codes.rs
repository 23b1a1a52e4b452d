//! Exit codes of the `recap` binary. Scripts branch on these.

pub const SUCCESS: i32 = 0;
pub const RUN_FAILED: i32 = 1; // Batch finished but at least one child run failed
pub const CONFIG_ERROR: i32 = 2; // Config, usage or environment error
