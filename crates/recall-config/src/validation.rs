// SPDX-FileCopyrightText: 2026 Recall Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as value ranges and relationships between fields.

use crate::diagnostic::ConfigError;
use crate::model::RecallConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &RecallConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if config.workspace.path.trim().is_empty() {
        fail("workspace.path must not be empty".to_string());
    }

    if !LOG_LEVELS.contains(&config.workspace.log_level.as_str()) {
        fail(format!(
            "workspace.log_level `{}` must be one of {}",
            config.workspace.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    let memory = &config.memory;
    if !(0.0..=1.0).contains(&memory.consolidation_threshold) {
        fail(format!(
            "memory.consolidation_threshold must be within 0.0..=1.0, got {}",
            memory.consolidation_threshold
        ));
    }

    if memory.consolidation_candidates == 0 {
        fail("memory.consolidation_candidates must be at least 1".to_string());
    }

    if memory.decision_timeout_secs == 0 {
        fail("memory.decision_timeout_secs must be at least 1".to_string());
    }

    if memory.conversation_max_runes == 0 {
        fail("memory.conversation_max_runes must be at least 1".to_string());
    }

    if memory.window_size == 0 {
        fail("memory.window_size must be at least 1".to_string());
    }

    if memory.window_overlap >= memory.window_size {
        fail(format!(
            "memory.window_overlap ({}) must be smaller than memory.window_size ({})",
            memory.window_overlap, memory.window_size
        ));
    }

    if config.worker.workers == 0 {
        fail("worker.workers must be at least 1".to_string());
    }

    if config.worker.queue_capacity == 0 {
        fail("worker.queue_capacity must be at least 1".to_string());
    }

    if config.worker.job_timeout_secs == 0 {
        fail("worker.job_timeout_secs must be at least 1".to_string());
    }

    if config.provider.api_base.trim().is_empty() {
        fail("provider.api_base must not be empty".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = RecallConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_workspace_path_fails_validation() {
        let mut config = RecallConfig::default();
        config.workspace.path = "  ".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "workspace.path"));
    }

    #[test]
    fn threshold_out_of_range_fails_validation() {
        let mut config = RecallConfig::default();
        config.memory.consolidation_threshold = 1.5;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "consolidation_threshold"));
    }

    #[test]
    fn overlap_not_smaller_than_window_fails_validation() {
        let mut config = RecallConfig::default();
        config.memory.window_size = 200;
        config.memory.window_overlap = 200;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "window_overlap"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = RecallConfig::default();
        config.worker.workers = 0;
        config.worker.queue_capacity = 0;
        config.workspace.log_level = "loud".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(has_error(&errors, "worker.workers"));
        assert!(has_error(&errors, "worker.queue_capacity"));
        assert!(has_error(&errors, "log_level"));
    }
}
