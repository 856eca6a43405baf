//! Adaptive request admission and anomaly detection.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ http::server ──▶ inspection ──▶ admission ──▶ application
//!                                       (inspector)   (policy gate)
//!                                           │              │
//!                                           ▼              ▼
//!                                    audit dispatcher (bounded queue)
//!                                           │
//!                                           ▼
//!                          audit worker ──▶ sinks, operator alerts
//!
//!     Background: garbage collector sweeps gates and inspector counters.
//! ```

pub mod admin;
pub mod audit;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::GuardConfig;
pub use error::{AuditError, Rejection};
pub use http::GuardServer;
pub use lifecycle::{GuardServices, Shutdown};
