use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A config finding, shaped for both terminal output and `--format json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: Severity,
    /// Which input produced it: `config`, `data`, `prompt`.
    pub source: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fix_steps: Vec<String>,
}

impl Diagnostic {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(Severity::Error, code, message)
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(Severity::Warning, code, message)
    }

    fn with_level(severity: Severity, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            severity,
            source: "config".into(),
            message: message.into(),
            context: serde_json::Value::Null,
            fix_steps: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn with_fix_step(mut self, step: impl Into<String>) -> Self {
        self.fix_steps.push(step.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Multi-line rendering for stderr.
    pub fn format_terminal(&self) -> String {
        let tag = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        let mut lines = vec![
            format!("{}: [{}] {}", tag, self.code, self.message),
            format!("  source: {}", self.source),
        ];
        if self.context.as_object().is_some_and(|o| !o.is_empty()) {
            if let Ok(json) = serde_json::to_string_pretty(&self.context) {
                lines.extend(json.lines().map(|l| format!("  {}", l)));
            }
        }
        if !self.fix_steps.is_empty() {
            lines.push("  fix:".to_string());
            lines.extend(
                self.fix_steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| format!("    {}. {}", i + 1, step)),
            );
        }
        let mut out = lines.join("\n");
        out.push('\n');
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for Diagnostic {}

pub mod codes {
    // Errors: `recap validate` exits 2
    pub const E_CFG_PARSE: &str = "E_CFG_PARSE";
    pub const E_CFG_SCHEMA: &str = "E_CFG_SCHEMA";
    pub const E_PATH_NOT_FOUND: &str = "E_PATH_NOT_FOUND";
    pub const E_MASK_RANGE: &str = "E_MASK_RANGE";
    pub const E_DATASET_UNKNOWN: &str = "E_DATASET_UNKNOWN";

    // Warnings
    pub const W_UNKNOWN_KEY: &str = "W_UNKNOWN_KEY";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_format_lists_fix_steps() {
        let d = Diagnostic::new(codes::E_MASK_RANGE, "value 5 out of range")
            .with_context(serde_json::json!({"num_partitions": 5}))
            .with_fix_step("use values between 1 and 4");
        let s = d.format_terminal();
        assert!(s.starts_with("error: [E_MASK_RANGE]"));
        assert!(s.contains("\"num_partitions\": 5"));
        assert!(s.contains("1. use values between 1 and 4"));
    }

    #[test]
    fn warning_is_not_error() {
        let d = Diagnostic::warning(codes::W_UNKNOWN_KEY, "unknown key `foo`");
        assert!(!d.is_error());
        assert!(d.format_terminal().starts_with("warning:"));
    }

    #[test]
    fn json_omits_empty_context_and_fix_steps() {
        let v = serde_json::to_value(Diagnostic::new(codes::E_CFG_SCHEMA, "bad")).unwrap();
        assert_eq!(v["severity"], "error");
        assert!(v.get("context").is_none());
        assert!(v.get("fix_steps").is_none());
    }
}
