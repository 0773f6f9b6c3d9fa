//! Agent and team policy repositories. Rule lists are JSONB columns,
//! parsed leniently on read and written back in full on every replace.

use chrono::{DateTime, Utc};
use errors::StorageError;
use guard_core::{Policy, PolicyRules, Rule, TeamPolicy};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::postgres::{db_err, decode_err};

#[derive(Clone)]
pub struct PolicyStore {
    pool: PgPool,
}

impl PolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create or fully replace an agent's policy.
    pub async fn upsert(&self, agent_id: &str, rules: &PolicyRules) -> Result<Policy, StorageError> {
        let row = sqlx::query(
            "INSERT INTO policies (agent_id, allow_rules, deny_rules, require_approval_rules)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (agent_id) DO UPDATE SET
                 allow_rules = EXCLUDED.allow_rules,
                 deny_rules = EXCLUDED.deny_rules,
                 require_approval_rules = EXCLUDED.require_approval_rules,
                 updated_at = now()
             RETURNING agent_id, allow_rules, deny_rules, require_approval_rules,
                       created_at, updated_at",
        )
        .bind(agent_id)
        .bind(encode_rules(&rules.allow)?)
        .bind(encode_rules(&rules.deny)?)
        .bind(encode_rules(&rules.require_approval)?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        map_policy(&row)
    }

    pub async fn get(&self, agent_id: &str) -> Result<Option<Policy>, StorageError> {
        let row = sqlx::query(
            "SELECT agent_id, allow_rules, deny_rules, require_approval_rules,
                    created_at, updated_at
             FROM policies WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_policy).transpose()
    }

    /// Create or fully replace a team's base policy.
    pub async fn upsert_team(
        &self,
        team: &str,
        rules: &PolicyRules,
    ) -> Result<TeamPolicy, StorageError> {
        let row = sqlx::query(
            "INSERT INTO team_policies (team, allow_rules, deny_rules, require_approval_rules)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (team) DO UPDATE SET
                 allow_rules = EXCLUDED.allow_rules,
                 deny_rules = EXCLUDED.deny_rules,
                 require_approval_rules = EXCLUDED.require_approval_rules,
                 updated_at = now()
             RETURNING team, allow_rules, deny_rules, require_approval_rules,
                       created_at, updated_at",
        )
        .bind(team)
        .bind(encode_rules(&rules.allow)?)
        .bind(encode_rules(&rules.deny)?)
        .bind(encode_rules(&rules.require_approval)?)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        map_team_policy(&row)
    }

    pub async fn get_team(&self, team: &str) -> Result<Option<TeamPolicy>, StorageError> {
        let row = sqlx::query(
            "SELECT team, allow_rules, deny_rules, require_approval_rules,
                    created_at, updated_at
             FROM team_policies WHERE team = $1",
        )
        .bind(team)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_team_policy).transpose()
    }
}

fn encode_rules(rules: &[Rule]) -> Result<serde_json::Value, StorageError> {
    serde_json::to_value(rules).map_err(decode_err)
}

fn decode_rules(row: &PgRow, column: &str) -> Result<Vec<Rule>, StorageError> {
    let value: serde_json::Value = row.try_get(column).map_err(decode_err)?;
    serde_json::from_value(value).map_err(decode_err)
}

fn map_policy(row: &PgRow) -> Result<Policy, StorageError> {
    Ok(Policy {
        agent_id: row.try_get("agent_id").map_err(decode_err)?,
        allow: decode_rules(row, "allow_rules")?,
        deny: decode_rules(row, "deny_rules")?,
        require_approval: decode_rules(row, "require_approval_rules")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode_err)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(decode_err)?,
    })
}

fn map_team_policy(row: &PgRow) -> Result<TeamPolicy, StorageError> {
    Ok(TeamPolicy {
        team: row.try_get("team").map_err(decode_err)?,
        allow: decode_rules(row, "allow_rules")?,
        deny: decode_rules(row, "deny_rules")?,
        require_approval: decode_rules(row, "require_approval_rules")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode_err)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(decode_err)?,
    })
}
