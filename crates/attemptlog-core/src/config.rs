//! Feed configuration loaded from TOML.
//!
//! ```toml
//! [[todo.rules]]
//! entry_type = "tool_use"
//! action_type = "todo_management"
//!
//! [process_names]
//! codingagent = "Coding Agent"
//! ```
//!
//! Every section is optional; omitted sections keep their defaults.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("todo rule {index} has an empty entry_type")]
    EmptyTodoRule { index: usize },
}

/// Top-level configuration for one feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub todo: TodoConfig,
    pub process_names: ProcessNaming,
}

impl FeedConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (index, rule) in self.todo.rules.iter().enumerate() {
            if rule.entry_type.trim().is_empty() {
                return Err(ConfigError::EmptyTodoRule { index });
            }
        }
        Ok(())
    }
}

// ─── Todo Rules ───────────────────────────────────────────────────

/// Which normalized entries count as TODO-list snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TodoConfig {
    pub rules: Vec<TodoRule>,
}

impl Default for TodoConfig {
    fn default() -> Self {
        Self {
            rules: vec![TodoRule {
                entry_type: "tool_use".to_owned(),
                action_type: Some("todo_management".to_owned()),
            }],
        }
    }
}

/// Matches `entry_type.type`, and optionally `entry_type.action_type.action`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TodoRule {
    pub entry_type: String,
    #[serde(default)]
    pub action_type: Option<String>,
}

// ─── Process Naming ───────────────────────────────────────────────

/// Display names keyed by a process's `runReason`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct ProcessNaming {
    names: HashMap<String, String>,
}

impl Default for ProcessNaming {
    fn default() -> Self {
        let names = [
            ("codingagent", "Coding Agent"),
            ("setupscript", "Setup Script"),
            ("cleanupscript", "Cleanup Script"),
            ("devserver", "Dev Server"),
        ]
        .into_iter()
        .map(|(reason, name)| (reason.to_owned(), name.to_owned()))
        .collect();
        Self { names }
    }
}

impl ProcessNaming {
    /// Name for a process launched for `run_reason`; unknown reasons are shown as-is.
    pub fn name_for(&self, run_reason: &str) -> String {
        self.names
            .get(run_reason)
            .or_else(|| self.names.get(&run_reason.to_ascii_lowercase()))
            .cloned()
            .unwrap_or_else(|| run_reason.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_uses_defaults() {
        let config = FeedConfig::from_toml_str("").expect("parse");
        assert_eq!(config, FeedConfig::default());
        assert_eq!(config.todo.rules.len(), 1);
        assert_eq!(config.process_names.name_for("codingagent"), "Coding Agent");
    }

    #[test]
    fn custom_rules_and_names() {
        let raw = r#"
            [[todo.rules]]
            entry_type = "todo_list"

            [[todo.rules]]
            entry_type = "tool_use"
            action_type = "plan"

            [process_names]
            codingagent = "Agent"
        "#;
        let config = FeedConfig::from_toml_str(raw).expect("parse");
        assert_eq!(config.todo.rules.len(), 2);
        assert_eq!(config.todo.rules[0].action_type, None);
        assert_eq!(config.todo.rules[1].action_type.as_deref(), Some("plan"));
        assert_eq!(config.process_names.name_for("codingagent"), "Agent");
        // Overriding the table replaces the defaults entirely.
        assert_eq!(config.process_names.name_for("devserver"), "devserver");
    }

    #[test]
    fn run_reason_lookup_is_case_insensitive_fallback() {
        let naming = ProcessNaming::default();
        assert_eq!(naming.name_for("SetupScript"), "Setup Script");
        assert_eq!(naming.name_for("lint"), "lint");
    }

    #[test]
    fn empty_entry_type_rejected() {
        let raw = r#"
            [[todo.rules]]
            entry_type = " "
        "#;
        let err = FeedConfig::from_toml_str(raw).expect_err("should reject");
        assert!(matches!(err, ConfigError::EmptyTodoRule { index: 0 }));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = FeedConfig::from_toml_str("todo = [").expect_err("should fail");
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
