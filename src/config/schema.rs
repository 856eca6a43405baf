//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the admission guard.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Named admission policies.
    pub policies: PoliciesConfig,

    /// Suspicion escalation for the admission gates.
    pub escalation: EscalationConfig,

    /// Anomaly inspector settings.
    pub inspector: InspectorConfig,

    /// Garbage collector settings.
    pub gc: GcConfig,

    /// Audit queue and sink settings.
    pub audit: AuditConfig,

    /// Administrative control surface.
    pub admin: AdminConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// A single fixed-window admission policy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Requests admitted per identity per window.
    pub max_requests: u32,

    /// Error text returned on a velocity rejection.
    pub message: String,
}

impl PolicyConfig {
    pub fn new(window_ms: u64, max_requests: u32, message: impl Into<String>) -> Self {
        Self {
            window_ms,
            max_requests,
            message: message.into(),
        }
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::new(60_000, 100, "Too many requests. Please try again later.")
    }
}

/// The four named policies, each with independent state.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoliciesConfig {
    pub chat: PolicyConfig,
    pub api: PolicyConfig,
    pub auth: PolicyConfig,
    pub admin: PolicyConfig,
}

impl Default for PoliciesConfig {
    fn default() -> Self {
        Self {
            chat: PolicyConfig::new(
                60_000,
                20,
                "Too many chat messages. Please slow down and try again.",
            ),
            api: PolicyConfig::new(
                60_000,
                100,
                "Too many API requests. Please wait before making more requests.",
            ),
            auth: PolicyConfig::new(
                15 * 60_000,
                5,
                "Too many authentication attempts. Please wait 15 minutes.",
            ),
            admin: PolicyConfig::new(60_000, 50, "Admin rate limit exceeded. Please wait."),
        }
    }
}

/// Suspicion escalation shared by all admission gates.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Violations that flip an identity into the sticky blocked state.
    pub suspicion_threshold: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            suspicion_threshold: 5,
        }
    }
}

/// Anomaly inspector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InspectorConfig {
    /// Admit loopback traffic unconditionally. Development only.
    pub dev_mode: bool,

    /// Enforce the in-memory IP blocklist.
    pub ip_blocking_enabled: bool,

    /// Maximum declared payload size in bytes.
    pub max_request_size: u64,

    /// First-party client signature that bypasses the user-agent filter.
    pub trusted_user_agent: Option<String>,

    /// Requests per address per velocity window before rejection.
    pub velocity_threshold: u32,

    /// Velocity window in seconds.
    pub velocity_window_secs: u64,

    /// Content violations per address before it is auto-blocked.
    pub attack_threshold: u32,

    /// How long content violations are remembered, in seconds.
    pub attack_horizon_secs: u64,

    /// Path fragments whose successful passage is audited.
    pub sensitive_paths: Vec<String>,
}

impl Default for InspectorConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            ip_blocking_enabled: false,
            max_request_size: 10 * 1024 * 1024, // 10MB
            trusted_user_agent: Some("Kiongozi-Frontend/1.0".to_string()),
            velocity_threshold: 50,
            velocity_window_secs: 10,
            attack_threshold: 3,
            attack_horizon_secs: 60 * 60,
            sensitive_paths: vec!["/admin".to_string(), "/api/v1/chat".to_string()],
        }
    }
}

/// Garbage collector configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GcConfig {
    /// Sweep interval in seconds.
    pub interval_secs: u64,

    /// Grace period after a window expires before the record is evicted.
    pub retention_secs: u64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5 * 60,
            retention_secs: 0,
        }
    }
}

/// Audit dispatch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Bounded queue between request path and audit worker.
    pub queue_capacity: usize,

    /// Recent events kept in memory for the admin log view.
    pub memory_capacity: usize,

    /// Optional JSON-lines file for durable audit records.
    pub file_path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            memory_capacity: 1000,
            file_path: None,
        }
    }
}

/// Admin surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the `/admin` routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

/// Placeholder key rejected by validation when admin is enabled.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: PLACEHOLDER_API_KEY.to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults_match_named_limits() {
        let policies = PoliciesConfig::default();
        assert_eq!((policies.chat.max_requests, policies.chat.window_ms), (20, 60_000));
        assert_eq!((policies.api.max_requests, policies.api.window_ms), (100, 60_000));
        assert_eq!((policies.auth.max_requests, policies.auth.window_ms), (5, 900_000));
        assert_eq!((policies.admin.max_requests, policies.admin.window_ms), (50, 60_000));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: GuardConfig = toml::from_str(
            r#"
            [policies.chat]
            window_ms = 1000
            max_requests = 2
            message = "slow down"

            [inspector]
            dev_mode = true
            "#,
        )
        .unwrap();

        assert_eq!(config.policies.chat, PolicyConfig::new(1000, 2, "slow down"));
        assert_eq!(config.policies.auth.max_requests, 5);
        assert!(config.inspector.dev_mode);
        assert_eq!(config.inspector.velocity_threshold, 50);
        assert_eq!(config.escalation.suspicion_threshold, 5);
    }
}
