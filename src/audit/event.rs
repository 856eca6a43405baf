//! Structured audit events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::http::request::RequestSnapshot;
use crate::security::identity::Identity;

/// Event categories written by the guard.
pub mod category {
    pub const RATE_LIMIT: &str = "RATE_LIMIT";
    pub const BLOCKED_CLIENT: &str = "BLOCKED_CLIENT";
    pub const AUTO_BLOCK: &str = "AUTO_BLOCK";
    pub const RATE_LIMIT_CLEARED: &str = "RATE_LIMIT_CLEARED";
    pub const BLOCKED_IP: &str = "BLOCKED_IP";
    pub const SUSPICIOUS_UA: &str = "SUSPICIOUS_UA";
    pub const LARGE_REQUEST: &str = "LARGE_REQUEST";
    pub const SUSPICIOUS_CONTENT: &str = "SUSPICIOUS_CONTENT";
    pub const RAPID_REQUESTS: &str = "RAPID_REQUESTS";
    pub const ACCESS_GRANTED: &str = "ACCESS_GRANTED";
    pub const IP_BLOCKED: &str = "IP_BLOCKED";
    pub const IP_UNBLOCKED: &str = "IP_UNBLOCKED";
    pub const MIDDLEWARE_ERROR: &str = "MIDDLEWARE_ERROR";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warning,
    Error,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "info",
            AuditLevel::Warning => "warning",
            AuditLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for AuditLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(AuditLevel::Info),
            "warning" => Ok(AuditLevel::Warning),
            "error" => Ok(AuditLevel::Error),
            other => Err(format!("unknown audit level '{other}'")),
        }
    }
}

/// One security or rate-limit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub level: AuditLevel,
    pub category: String,
    pub message: String,
    pub identity: Option<String>,
    pub ip: Option<String>,
    pub path: Option<String>,
    pub method: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(level: AuditLevel, category: &str, message: impl Into<String>) -> Self {
        Self {
            level,
            category: category.to_string(),
            message: message.into(),
            identity: None,
            ip: None,
            path: None,
            method: None,
            user_agent: None,
            timestamp: Utc::now(),
            details: Value::Object(Map::new()),
        }
    }

    pub fn info(category: &str, message: impl Into<String>) -> Self {
        Self::new(AuditLevel::Info, category, message)
    }

    pub fn warning(category: &str, message: impl Into<String>) -> Self {
        Self::new(AuditLevel::Warning, category, message)
    }

    pub fn error(category: &str, message: impl Into<String>) -> Self {
        Self::new(AuditLevel::Error, category, message)
    }

    /// Copy identity, address, path, method and user agent from a request.
    pub fn with_request(mut self, request: &RequestSnapshot) -> Self {
        self.identity = Some(request.identity.key());
        self.ip = Some(request.ip.to_string());
        self.path = Some(request.path.clone());
        self.method = Some(request.method.clone());
        self.user_agent = request.user_agent.clone();
        self
    }

    pub fn with_identity(mut self, identity: &Identity) -> Self {
        self.identity = Some(identity.key());
        if let Identity::Ip(ip) = identity {
            self.ip.get_or_insert_with(|| ip.to_string());
        }
        self
    }

    pub fn with_ip(mut self, ip: impl ToString) -> Self {
        self.ip = Some(ip.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut self.details {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// High-severity events are also broadcast to operators.
    pub fn is_high_severity(&self) -> bool {
        self.level == AuditLevel::Error
    }
}
