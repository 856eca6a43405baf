//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (snapshot: identity, query, body)
//!     → [security middleware decides]
//!     → response.rs (rejection bodies) or the application route
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod websocket;

pub use request::RequestSnapshot;
pub use server::{AppState, GuardServer};
