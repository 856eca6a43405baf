//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows > 0, thresholds > 0, capacities > 0)
//! - Validate socket addresses and admin credentials
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::{GuardConfig, PolicyConfig, PLACEHOLDER_API_KEY};

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a loaded configuration for values the guard cannot run with.
pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    let policies = &config.policies;
    for (name, policy) in [
        ("chat", &policies.chat),
        ("api", &policies.api),
        ("auth", &policies.auth),
        ("admin", &policies.admin),
    ] {
        validate_policy(name, policy, &mut errors);
    }

    if config.escalation.suspicion_threshold == 0 {
        errors.push(ValidationError::new(
            "escalation.suspicion_threshold",
            "must be greater than 0",
        ));
    }

    let inspector = &config.inspector;
    for (field, value) in [
        ("inspector.max_request_size", inspector.max_request_size),
        ("inspector.velocity_threshold", inspector.velocity_threshold as u64),
        ("inspector.velocity_window_secs", inspector.velocity_window_secs),
        ("inspector.attack_threshold", inspector.attack_threshold as u64),
        ("inspector.attack_horizon_secs", inspector.attack_horizon_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than 0"));
        }
    }

    if config.gc.interval_secs == 0 {
        errors.push(ValidationError::new("gc.interval_secs", "must be greater than 0"));
    }
    if config.audit.queue_capacity == 0 {
        errors.push(ValidationError::new("audit.queue_capacity", "must be greater than 0"));
    }
    if config.audit.memory_capacity == 0 {
        errors.push(ValidationError::new("audit.memory_capacity", "must be greater than 0"));
    }

    if config.admin.enabled
        && (config.admin.api_key.is_empty() || config.admin.api_key == PLACEHOLDER_API_KEY)
    {
        errors.push(ValidationError::new(
            "admin.api_key",
            "must be set to a real secret when admin is enabled",
        ));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_policy(name: &str, policy: &PolicyConfig, errors: &mut Vec<ValidationError>) {
    if policy.window_ms == 0 {
        errors.push(ValidationError::new(
            format!("policies.{name}.window_ms"),
            "must be a positive integer",
        ));
    }
    if policy.max_requests == 0 {
        errors.push(ValidationError::new(
            format!("policies.{name}.max_requests"),
            "must be a positive integer",
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&GuardConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = GuardConfig::default();
        config.policies.chat.window_ms = 0;
        config.policies.auth.max_requests = 0;
        config.gc.interval_secs = 0;
        config.admin.enabled = true;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "policies.chat.window_ms",
                "policies.auth.max_requests",
                "gc.interval_secs",
                "admin.api_key",
            ]
        );
    }

    #[test]
    fn test_bad_bind_address() {
        let mut config = GuardConfig::default();
        config.listener.bind_address = "localhost".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "listener.bind_address");
    }
}
