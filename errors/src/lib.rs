//! # AgentGuard Errors
//!
//! Shared error enums for the control plane. Each subsystem has its own
//! enum; the HTTP layer owns the mapping to status codes.

use thiserror::Error;

/// Authentication and authorization failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingCredentials,

    #[error("Invalid or inactive agent key")]
    InvalidAgentKey,

    #[error("Invalid admin key")]
    InvalidAdminKey,

    #[error("Agent not found or inactive: {agent_id}")]
    AgentInactive { agent_id: String },

    #[error("{expected} token required")]
    WrongTokenType { expected: String },

    #[error("Role '{required}' or higher required (your role: '{actual}')")]
    InsufficientRole { required: String, actual: String },

    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Token issue/verify failures. Every variant maps to 401.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid or expired token")]
    Invalid,

    #[error("Token has been revoked")]
    Revoked,

    #[error("Token is missing a jti claim")]
    MissingJti,

    #[error("Signing key unavailable: {reason}")]
    Keypair { reason: String },
}

/// Storage layer failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Serialization error: {reason}")]
    Serialization { reason: String },

    #[error("Migration failed: {reason}")]
    Migration { reason: String },
}

/// Approval state-machine violations.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval is already {status}")]
    AlreadyDecided { status: String },

    #[error("Only pending approvals can be cancelled (current status: {status})")]
    NotCancellable { status: String },
}

/// Webhook delivery failures. Always swallowed after logging; never
/// propagated to the request that triggered the notification.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("Webhook request failed: {reason}")]
    Delivery { reason: String },

    #[error("Webhook endpoint returned status {status}")]
    BadStatus { status: u16 },
}
