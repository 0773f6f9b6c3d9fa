//! # AgentGuard Core
//!
//! Shared domain types for the AgentGuard control plane: agent and admin
//! identities, policy rules, approval requests, and audit log entries.
//!
//! This crate holds no I/O. Storage lives in `storage`, the decision engine
//! in `policy`, and credential handling in `auth`.

pub mod rules;
pub mod types;

pub use rules::{PolicyRules, Rule, RuleConditions, TimeRange};
pub use types::{
    ActionResult, AdminContext, AdminRole, AdminUser, Agent, AgentKey, ApprovalRequest,
    ApprovalStatus, AuditLogEntry, Environment, Policy, RevokedToken, TeamPolicy,
};
