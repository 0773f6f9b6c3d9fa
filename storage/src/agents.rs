//! Agent and agent-key repositories.

use chrono::{DateTime, Utc};
use errors::StorageError;
use guard_core::{Agent, AgentKey, Environment};
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::postgres::{db_err, decode_err};

/// Fields needed to register a new agent with its first key.
#[derive(Debug, Clone)]
pub struct NewAgent {
    pub agent_id: String,
    pub name: String,
    pub owner_team: String,
    pub environment: Environment,
    pub key_hash: String,
    pub key_prefix: String,
}

#[derive(Clone)]
pub struct AgentStore {
    pool: PgPool,
}

impl AgentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the agent row and its key row in one transaction.
    pub async fn create(&self, new: &NewAgent) -> Result<Agent, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query(
            "INSERT INTO agents (agent_id, name, owner_team, environment, is_active)
             VALUES ($1, $2, $3, $4, TRUE)
             RETURNING agent_id, name, owner_team, environment, is_active, created_at, updated_at",
        )
        .bind(&new.agent_id)
        .bind(&new.name)
        .bind(&new.owner_team)
        .bind(new.environment.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "INSERT INTO agent_keys (agent_id, key_hash, key_prefix, is_active)
             VALUES ($1, $2, $3, TRUE)",
        )
        .bind(&new.agent_id)
        .bind(&new.key_hash)
        .bind(&new.key_prefix)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;

        map_agent(&row)
    }

    pub async fn get(&self, agent_id: &str) -> Result<Option<Agent>, StorageError> {
        let row = sqlx::query(
            "SELECT agent_id, name, owner_team, environment, is_active, created_at, updated_at
             FROM agents WHERE agent_id = $1",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_agent).transpose()
    }

    /// Fetch only when the agent exists and is active — the shape every
    /// agent-auth path needs.
    pub async fn get_active(&self, agent_id: &str) -> Result<Option<Agent>, StorageError> {
        let row = sqlx::query(
            "SELECT agent_id, name, owner_team, environment, is_active, created_at, updated_at
             FROM agents WHERE agent_id = $1 AND is_active = TRUE",
        )
        .bind(agent_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_agent).transpose()
    }

    /// List active agents, optionally filtered by environment.
    /// `team_scope` restricts results to one owner team for team-scoped
    /// admin callers.
    pub async fn list(
        &self,
        environment: Option<Environment>,
        team_scope: Option<&str>,
        skip: i64,
        limit: i64,
    ) -> Result<Vec<Agent>, StorageError> {
        let rows = sqlx::query(
            "SELECT agent_id, name, owner_team, environment, is_active, created_at, updated_at
             FROM agents
             WHERE is_active = TRUE
               AND ($1::text IS NULL OR environment = $1)
               AND ($2::text IS NULL OR owner_team = $2)
             ORDER BY created_at DESC
             OFFSET $3 LIMIT $4",
        )
        .bind(environment.map(|e| e.as_str()))
        .bind(team_scope)
        .bind(skip)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_agent).collect()
    }

    /// Hard delete. Keys, policy, approvals, and logs go with it via
    /// `ON DELETE CASCADE`. Returns false when no such agent exists.
    pub async fn delete(&self, agent_id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM agents WHERE agent_id = $1")
            .bind(agent_id)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    /// Resolve a raw-key hash to its key row when the key is active.
    /// This is the credential store's `verify` path: a single indexed
    /// equality lookup on the hash.
    pub async fn find_key_by_hash(
        &self,
        key_hash: &str,
    ) -> Result<Option<AgentKey>, StorageError> {
        let row = sqlx::query(
            "SELECT agent_id, key_hash, key_prefix, is_active, created_at
             FROM agent_keys WHERE key_hash = $1 AND is_active = TRUE",
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(map_agent_key).transpose()
    }
}

fn map_agent_key(row: &PgRow) -> Result<AgentKey, StorageError> {
    Ok(AgentKey {
        agent_id: row.try_get("agent_id").map_err(decode_err)?,
        key_hash: row.try_get("key_hash").map_err(decode_err)?,
        key_prefix: row.try_get("key_prefix").map_err(decode_err)?,
        is_active: row.try_get("is_active").map_err(decode_err)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode_err)?,
    })
}

pub(crate) fn map_agent(row: &PgRow) -> Result<Agent, StorageError> {
    let environment: String = row.try_get("environment").map_err(decode_err)?;
    Ok(Agent {
        agent_id: row.try_get("agent_id").map_err(decode_err)?,
        name: row.try_get("name").map_err(decode_err)?,
        owner_team: row.try_get("owner_team").map_err(decode_err)?,
        environment: environment.parse().map_err(decode_err)?,
        is_active: row.try_get("is_active").map_err(decode_err)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(decode_err)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(decode_err)?,
    })
}
