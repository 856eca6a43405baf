//! Rejection taxonomy and observability errors.

/// Why a request was not admitted.
///
/// Velocity and block rejections carry a retry hint so well-behaved clients
/// can back off. Content and validation rejections deliberately do not.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// A counter exceeded its window budget.
    #[error("{message}")]
    Velocity {
        message: String,
        retry_after_secs: u64,
        limit: u32,
        window_ms: u64,
    },

    /// The identity is in the sticky blocked state.
    #[error("Access temporarily blocked due to suspicious activity")]
    IdentityBlocked { retry_after_secs: u64 },

    /// The network address is on the inspector blocklist.
    #[error("IP address blocked")]
    AddressBlocked,

    /// A content rule matched.
    #[error("Suspicious content detected")]
    Content,

    /// Size or shape of the request is unacceptable.
    #[error("{reason}")]
    Validation { reason: String },
}

impl Rejection {
    pub fn validation(reason: impl Into<String>) -> Self {
        Rejection::Validation {
            reason: reason.into(),
        }
    }

    /// Seconds a client should wait, for rejections that carry one.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Rejection::Velocity {
                retry_after_secs, ..
            }
            | Rejection::IdentityBlocked { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        }
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Rejection::Velocity { .. } => "velocity",
            Rejection::IdentityBlocked { .. } => "blocked",
            Rejection::AddressBlocked => "blocked_ip",
            Rejection::Content => "content",
            Rejection::Validation { .. } => "validation",
        }
    }
}

/// Observability degraded: the audit trail or alert channel could not be
/// written. Logged locally, never returned to the request path.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
    #[error("audit sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("audit event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
