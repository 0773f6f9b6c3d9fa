//! # Storage Layer
//!
//! PostgreSQL persistence for every AgentGuard entity, plus the audit
//! chain writer/verifier and the reporting aggregation. The database is
//! the single source of truth; all cross-request serialization is
//! delegated to it (transactions, row locks, and one advisory lock for
//! the chain writer).

pub mod admin_users;
pub mod agents;
pub mod approvals;
pub mod audit;
pub mod chain;
pub mod policies;
pub mod postgres;
pub mod reports;
pub mod revoked;

pub use admin_users::{AdminUserStore, NewAdminUser};
pub use agents::{AgentStore, NewAgent};
pub use approvals::{ApprovalFilter, ApprovalListing, ApprovalStore, CancelOutcome, DecideOutcome};
pub use audit::{AuditLogStore, LogFilter, NewAuditLog};
pub use chain::{ChainVerification, chain_timestamp, genesis_hash, link_hash};
pub use policies::PolicyStore;
pub use postgres::{connect, run_migrations};
pub use reports::{ReportStore, SummaryReport};
pub use revoked::RevokedTokenStore;
