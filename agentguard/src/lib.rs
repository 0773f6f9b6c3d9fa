//! # AgentGuard Server
//!
//! The HTTP control plane: token exchange, agent and policy management,
//! the `/enforce` decision endpoint, approval workflows, the audit chain
//! API, and reporting. Domain logic lives in the `policy`, `auth`, and
//! `storage` crates; this crate wires them to routes, maps errors to
//! status codes, and fires webhook notifications.

pub mod auth_resolver;
pub mod enforcement;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod webhook;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
