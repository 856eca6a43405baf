//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Build services → Spawn audit worker and GC → Serve
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Stop GC → Drain audit queue → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::wait_for_termination;
pub use startup::{serve_until, BackgroundTasks, GuardServices, StartupError};
