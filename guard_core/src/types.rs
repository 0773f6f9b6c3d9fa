use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::rules::Rule;

/// Deployment environment an agent runs in.
///
/// Stored lowercase in the database and in token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// An AI agent identity.
///
/// `is_active = false` blocks every agent-auth path while preserving the
/// agent's history (keys, approvals, logs stay in place until hard delete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub agent_id: String,
    pub name: String,
    pub owner_team: String,
    pub environment: Environment,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Hashed API key for an agent. The raw key is returned exactly once at
/// creation; only the SHA-256 hash and a 12-character prefix persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentKey {
    pub agent_id: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Admin role hierarchy. Strictly totally ordered:
/// `super-admin > admin > auditor > approver`.
///
/// The variant order drives `Ord`, so `role >= min_role` is the whole
/// role check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AdminRole {
    #[serde(rename = "approver")]
    Approver,
    #[serde(rename = "auditor")]
    Auditor,
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "super-admin")]
    SuperAdmin,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::Approver => "approver",
            AdminRole::Auditor => "auditor",
            AdminRole::Admin => "admin",
            AdminRole::SuperAdmin => "super-admin",
        }
    }

    /// Numeric level, higher = more permissions.
    pub fn level(&self) -> u8 {
        match self {
            AdminRole::Approver => 1,
            AdminRole::Auditor => 2,
            AdminRole::Admin => 3,
            AdminRole::SuperAdmin => 4,
        }
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approver" => Ok(AdminRole::Approver),
            "auditor" => Ok(AdminRole::Auditor),
            "admin" => Ok(AdminRole::Admin),
            "super-admin" => Ok(AdminRole::SuperAdmin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A named admin account with a role and optional team scope.
///
/// The bootstrap `AG_ADMIN_API_KEY` is an implicit super-admin with no row
/// in this table; revoking it means removing it from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminUser {
    pub admin_id: String,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub role: AdminRole,
    pub team: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// Resolved admin identity on a request: subject, role, and team scope.
///
/// `team = None` means all-teams visibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminContext {
    pub sub: String,
    pub role: AdminRole,
    pub team: Option<String>,
}

impl AdminContext {
    /// True when this identity meets the minimum role.
    pub fn has_role(&self, min: AdminRole) -> bool {
        self.role >= min
    }

    /// True when this identity may observe resources of `owner_team`.
    pub fn can_see_team(&self, owner_team: &str) -> bool {
        match &self.team {
            Some(team) => team == owner_team,
            None => true,
        }
    }
}

/// Per-agent policy: ordered allow / deny / require-approval rule lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub agent_id: String,
    pub allow: Vec<Rule>,
    pub deny: Vec<Rule>,
    pub require_approval: Vec<Rule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Team-level base policy, merged with each member agent's own policy at
/// decision time. Team deny rules precede agent deny rules; agent allow
/// rules precede team allow rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamPolicy {
    pub team: String,
    pub allow: Vec<Rule>,
    pub deny: Vec<Rule>,
    pub require_approval: Vec<Rule>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Approval request lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Denied,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Denied => "denied",
        }
    }

    /// Status is terminal once it leaves `pending`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalStatus::Pending)
    }

    /// Legal state-machine transitions: `pending -> approved | denied`.
    pub fn can_transition_to(&self, next: ApprovalStatus) -> bool {
        matches!(self, ApprovalStatus::Pending) && next.is_terminal()
    }
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "denied" => Ok(ApprovalStatus::Denied),
            other => Err(format!("unknown approval status: {other}")),
        }
    }
}

/// An agent action awaiting (or past) a human decision.
///
/// Invariant: the three `decision_*` fields are all null while pending and
/// all populated once decided.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub approval_id: Uuid,
    pub agent_id: String,
    pub status: ApprovalStatus,
    pub action: String,
    pub resource: Option<String>,
    pub context: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub decision_at: Option<DateTime<Utc>>,
    pub decision_by: Option<String>,
    pub decision_reason: Option<String>,
}

impl ApprovalRequest {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }

    /// Checks the pending-iff-undecided invariant.
    pub fn decision_fields_consistent(&self) -> bool {
        let decided =
            self.decision_at.is_some() && self.decision_by.is_some() && self.decision_reason.is_some();
        let undecided =
            self.decision_at.is_none() && self.decision_by.is_none() && self.decision_reason.is_none();
        match self.status {
            ApprovalStatus::Pending => undecided,
            ApprovalStatus::Approved | ApprovalStatus::Denied => decided,
        }
    }
}

/// Outcome of the action an audit log entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionResult {
    Success,
    Error,
}

impl ActionResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionResult::Success => "success",
            ActionResult::Error => "error",
        }
    }
}

impl FromStr for ActionResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ActionResult::Success),
            "error" => Ok(ActionResult::Error),
            other => Err(format!("unknown result: {other}")),
        }
    }
}

/// One immutable row of an agent's audit chain.
///
/// `id` is the database insertion id and defines the authoritative chain
/// order; `timestamp` is informational and may repeat under clock skew.
/// `previous_hash` links to the preceding entry for the same agent
/// (genesis digest for the first entry). No field is ever mutated after
/// insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: i64,
    pub log_id: Uuid,
    pub agent_id: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    pub resource: Option<String>,
    pub context: Option<serde_json::Value>,
    pub allowed: bool,
    pub result: ActionResult,
    pub metadata: Option<serde_json::Value>,
    pub request_id: Option<String>,
    pub previous_hash: String,
}

/// A revoked token id. Rows may be purged once `expires_at` has passed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevokedToken {
    pub jti: Uuid,
    pub revoked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_hierarchy_is_totally_ordered() {
        assert!(AdminRole::SuperAdmin > AdminRole::Admin);
        assert!(AdminRole::Admin > AdminRole::Auditor);
        assert!(AdminRole::Auditor > AdminRole::Approver);
        assert_eq!(AdminRole::SuperAdmin.level(), 4);
        assert_eq!(AdminRole::Approver.level(), 1);
    }

    #[test]
    fn require_role_admits_role_or_higher() {
        let ctx = AdminContext {
            sub: "adm_1".to_string(),
            role: AdminRole::Admin,
            team: None,
        };
        assert!(ctx.has_role(AdminRole::Approver));
        assert!(ctx.has_role(AdminRole::Admin));
        assert!(!ctx.has_role(AdminRole::SuperAdmin));
    }

    #[test]
    fn team_scope_null_sees_all() {
        let global = AdminContext {
            sub: "admin".to_string(),
            role: AdminRole::SuperAdmin,
            team: None,
        };
        let scoped = AdminContext {
            sub: "adm_2".to_string(),
            role: AdminRole::Approver,
            team: Some("payments".to_string()),
        };
        assert!(global.can_see_team("payments"));
        assert!(global.can_see_team("ml"));
        assert!(scoped.can_see_team("payments"));
        assert!(!scoped.can_see_team("ml"));
    }

    #[test]
    fn role_serde_uses_kebab_names() {
        let json = serde_json::to_string(&AdminRole::SuperAdmin).unwrap();
        assert_eq!(json, "\"super-admin\"");
        let back: AdminRole = serde_json::from_str("\"auditor\"").unwrap();
        assert_eq!(back, AdminRole::Auditor);
    }

    #[test]
    fn approval_transitions_only_from_pending() {
        assert!(ApprovalStatus::Pending.can_transition_to(ApprovalStatus::Approved));
        assert!(ApprovalStatus::Pending.can_transition_to(ApprovalStatus::Denied));
        assert!(!ApprovalStatus::Approved.can_transition_to(ApprovalStatus::Denied));
        assert!(!ApprovalStatus::Denied.can_transition_to(ApprovalStatus::Approved));
        assert!(!ApprovalStatus::Pending.can_transition_to(ApprovalStatus::Pending));
    }

    #[test]
    fn decision_fields_invariant() {
        let mut approval = ApprovalRequest {
            approval_id: Uuid::new_v4(),
            agent_id: "agt_1".to_string(),
            status: ApprovalStatus::Pending,
            action: "export:csv".to_string(),
            resource: Some("payments/Q4".to_string()),
            context: None,
            created_at: Utc::now(),
            decision_at: None,
            decision_by: None,
            decision_reason: None,
        };
        assert!(approval.decision_fields_consistent());

        approval.status = ApprovalStatus::Approved;
        assert!(!approval.decision_fields_consistent());

        approval.decision_at = Some(Utc::now());
        approval.decision_by = Some("adm_1".to_string());
        approval.decision_reason = Some("ok".to_string());
        assert!(approval.decision_fields_consistent());
    }

    #[test]
    fn environment_round_trips() {
        for env in [
            Environment::Development,
            Environment::Staging,
            Environment::Production,
        ] {
            let parsed: Environment = env.as_str().parse().unwrap();
            assert_eq!(parsed, env);
        }
        assert!("prod".parse::<Environment>().is_err());
    }
}
