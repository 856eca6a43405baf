//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → handed to lifecycle::startup, which builds one service per policy
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; policies are fixed at construction
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, AuditConfig, EscalationConfig, GcConfig, GuardConfig, InspectorConfig,
    ListenerConfig, LogFormat, ObservabilityConfig, PoliciesConfig, PolicyConfig,
};
pub use validation::{validate_config, ValidationError};
