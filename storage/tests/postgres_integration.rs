//! Repository integration tests against a disposable PostgreSQL
//! container. Every test skips cleanly when Docker is unavailable.

use guard_core::{ActionResult, AdminRole, ApprovalStatus, Environment, PolicyRules, Rule};
use sqlx::PgPool;
use storage::{
    AdminUserStore, AgentStore, ApprovalFilter, ApprovalStore, AuditLogStore, CancelOutcome,
    DecideOutcome, LogFilter, NewAdminUser, NewAgent, NewAuditLog, PolicyStore, ReportStore,
    RevokedTokenStore,
};
use uuid::Uuid;

async fn setup() -> Option<PgPool> {
    let fixture = testing::postgres().await?;
    let pool = storage::connect(fixture.url(), 5).await.ok()?;
    storage::run_migrations(&pool).await.ok()?;
    Some(pool)
}

async fn seed_agent(pool: &PgPool, team: &str) -> String {
    let agent_id = testing::unique_id("agt");
    AgentStore::new(pool.clone())
        .create(&NewAgent {
            agent_id: agent_id.clone(),
            name: format!("{agent_id}-name"),
            owner_team: team.to_string(),
            environment: Environment::Production,
            key_hash: format!("hash-{agent_id}"),
            key_prefix: "agk_testpref".to_string(),
        })
        .await
        .expect("seed agent");
    agent_id
}

fn log_entry(action: &str, allowed: bool) -> NewAuditLog {
    NewAuditLog {
        action: action.to_string(),
        resource: Some("doc.txt".to_string()),
        context: None,
        allowed,
        result: if allowed { ActionResult::Success } else { ActionResult::Error },
        metadata: None,
        request_id: None,
    }
}

#[tokio::test]
async fn agent_create_get_list_delete_cascades() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let agents = AgentStore::new(pool.clone());
    let policies = PolicyStore::new(pool.clone());
    let logs = AuditLogStore::new(pool.clone());

    let team = testing::unique_id("team");
    let agent_id = seed_agent(&pool, &team).await;

    let fetched = agents.get(&agent_id).await.unwrap().unwrap();
    assert_eq!(fetched.environment, Environment::Production);
    assert!(fetched.is_active);

    let resolved = agents
        .find_key_by_hash(&format!("hash-{agent_id}"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.agent_id, agent_id);
    assert_eq!(resolved.key_prefix, "agk_testpref");
    assert!(resolved.is_active);

    let listed = agents.list(None, Some(&team), 0, 50).await.unwrap();
    assert_eq!(listed.len(), 1);
    let other_team = agents.list(None, Some("nobody"), 0, 50).await.unwrap();
    assert!(other_team.is_empty());

    // Attach dependents, then hard-delete and watch them cascade.
    policies
        .upsert(
            &agent_id,
            &PolicyRules {
                allow: vec![Rule::new("read:*", "*")],
                ..PolicyRules::default()
            },
        )
        .await
        .unwrap();
    logs.append(&agent_id, &log_entry("read:file", true)).await.unwrap();

    assert!(agents.delete(&agent_id).await.unwrap());
    assert!(agents.get(&agent_id).await.unwrap().is_none());
    assert!(policies.get(&agent_id).await.unwrap().is_none());
    assert!(logs
        .query(&LogFilter {
            agent_id: Some(agent_id.clone()),
            limit: 10,
            ..LogFilter::default()
        })
        .await
        .unwrap()
        .is_empty());
    assert!(agents
        .find_key_by_hash(&format!("hash-{agent_id}"))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn policy_upsert_replaces_rule_lists() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let policies = PolicyStore::new(pool.clone());
    let agent_id = seed_agent(&pool, &testing::unique_id("team")).await;

    let first = policies
        .upsert(
            &agent_id,
            &PolicyRules {
                allow: vec![Rule::new("read:*", "*")],
                deny: vec![],
                require_approval: vec![],
            },
        )
        .await
        .unwrap();
    assert_eq!(first.allow.len(), 1);

    let replaced = policies
        .upsert(
            &agent_id,
            &PolicyRules {
                allow: vec![],
                deny: vec![Rule::new("delete:*", "*"), Rule::new("write:*", "secrets/*")],
                require_approval: vec![Rule::new("export:*", "payments/*")],
            },
        )
        .await
        .unwrap();
    assert!(replaced.allow.is_empty());
    assert_eq!(replaced.deny.len(), 2);
    assert_eq!(replaced.require_approval.len(), 1);

    let fetched = policies.get(&agent_id).await.unwrap().unwrap();
    assert_eq!(fetched.deny[0].action, "delete:*");
    assert!(fetched.updated_at >= first.updated_at);
}

#[tokio::test]
async fn team_policy_round_trips() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let policies = PolicyStore::new(pool.clone());
    let team = testing::unique_id("team");

    assert!(policies.get_team(&team).await.unwrap().is_none());

    let stored = policies
        .upsert_team(
            &team,
            &PolicyRules {
                deny: vec![Rule::new("export:pii", "*")],
                ..PolicyRules::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(stored.team, team);
    assert_eq!(stored.deny[0].action, "export:pii");
}

#[tokio::test]
async fn approval_lifecycle_and_conflicts() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let approvals = ApprovalStore::new(pool.clone());
    let team = testing::unique_id("team");
    let agent_id = seed_agent(&pool, &team).await;

    let approval = approvals
        .create(&agent_id, "export:csv", Some("payments/Q4"), None)
        .await
        .unwrap();
    assert_eq!(approval.status, ApprovalStatus::Pending);
    assert!(approval.decision_fields_consistent());

    // Agents only see their own approvals.
    assert!(approvals
        .get_for_agent(approval.approval_id, &agent_id)
        .await
        .unwrap()
        .is_some());
    assert!(approvals
        .get_for_agent(approval.approval_id, "agt_other")
        .await
        .unwrap()
        .is_none());

    let outcome = approvals
        .decide(approval.approval_id, ApprovalStatus::Approved, "adm_1", "looks fine")
        .await
        .unwrap();
    let decided = match outcome {
        DecideOutcome::Decided(a) => a,
        other => panic!("expected Decided, got {other:?}"),
    };
    assert_eq!(decided.status, ApprovalStatus::Approved);
    assert_eq!(decided.decision_by.as_deref(), Some("adm_1"));
    assert!(decided.decision_fields_consistent());

    // Second decision conflicts; terminal status is sticky.
    let second = approvals
        .decide(approval.approval_id, ApprovalStatus::Denied, "adm_2", "no")
        .await
        .unwrap();
    assert!(matches!(second, DecideOutcome::Conflict(ApprovalStatus::Approved)));

    // Cancelling a decided request conflicts too.
    let cancel = approvals.cancel(approval.approval_id).await.unwrap();
    assert!(matches!(cancel, CancelOutcome::NotPending(ApprovalStatus::Approved)));

    // Unknown ids report NotFound.
    let missing = approvals
        .decide(Uuid::new_v4(), ApprovalStatus::Approved, "adm_1", "x")
        .await
        .unwrap();
    assert!(matches!(missing, DecideOutcome::NotFound));
}

#[tokio::test]
async fn approval_listing_is_team_scoped() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let approvals = ApprovalStore::new(pool.clone());
    let team_a = testing::unique_id("team");
    let team_b = testing::unique_id("team");
    let agent_a = seed_agent(&pool, &team_a).await;
    let agent_b = seed_agent(&pool, &team_b).await;

    approvals.create(&agent_a, "export:csv", None, None).await.unwrap();
    approvals.create(&agent_b, "delete:table", None, None).await.unwrap();

    let scoped = approvals
        .list(&ApprovalFilter {
            team: Some(team_a.clone()),
            limit: 50,
            ..ApprovalFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(scoped.total, 1);
    assert_eq!(scoped.items.len(), 1);
    assert_eq!(scoped.items[0].0.agent_id, agent_a);
    assert!(scoped.items[0].1.as_deref().unwrap().contains(&agent_a));

    let filtered = approvals
        .list(&ApprovalFilter {
            status: Some(ApprovalStatus::Approved),
            team: Some(team_a.clone()),
            limit: 50,
            ..ApprovalFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(filtered.total, 0);
}

#[tokio::test]
async fn chain_links_and_verifies() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let logs = AuditLogStore::new(pool.clone());
    let agent_id = seed_agent(&pool, &testing::unique_id("team")).await;

    let first = logs.append(&agent_id, &log_entry("read:file", true)).await.unwrap();
    assert_eq!(first.previous_hash, storage::genesis_hash());

    let second = logs.append(&agent_id, &log_entry("write:file", true)).await.unwrap();
    assert_eq!(
        second.previous_hash,
        storage::link_hash(first.log_id, first.timestamp, second.log_id, "write:file")
    );

    let verification = logs.verify_chain(&agent_id).await.unwrap();
    assert!(verification.valid);
    assert_eq!(verification.total_entries, 2);
}

#[tokio::test]
async fn chains_are_per_agent() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let logs = AuditLogStore::new(pool.clone());
    let team = testing::unique_id("team");
    let agent_a = seed_agent(&pool, &team).await;
    let agent_b = seed_agent(&pool, &team).await;

    logs.append(&agent_a, &log_entry("read:file", true)).await.unwrap();
    let b_first = logs.append(&agent_b, &log_entry("read:file", true)).await.unwrap();

    // Agent B's first entry is a genesis entry regardless of A's chain.
    assert_eq!(b_first.previous_hash, storage::genesis_hash());
    assert!(logs.verify_chain(&agent_a).await.unwrap().valid);
    assert!(logs.verify_chain(&agent_b).await.unwrap().valid);
}

#[tokio::test]
async fn concurrent_appends_never_share_a_previous_hash() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let logs = AuditLogStore::new(pool.clone());
    let agent_id = seed_agent(&pool, &testing::unique_id("team")).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let logs = logs.clone();
        let agent_id = agent_id.clone();
        handles.push(tokio::spawn(async move {
            logs.append(&agent_id, &log_entry(&format!("act:{i}"), true)).await
        }));
    }

    let mut hashes = Vec::new();
    for handle in handles {
        let entry = handle.await.unwrap().unwrap();
        hashes.push(entry.previous_hash);
    }

    let mut deduped = hashes.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), hashes.len(), "duplicate previous_hash under concurrency");

    let verification = logs.verify_chain(&agent_id).await.unwrap();
    assert!(verification.valid);
    assert_eq!(verification.total_entries, 8);
}

#[tokio::test]
async fn tampered_row_breaks_verification() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let logs = AuditLogStore::new(pool.clone());
    let agent_id = seed_agent(&pool, &testing::unique_id("team")).await;

    logs.append(&agent_id, &log_entry("read:file", true)).await.unwrap();
    let middle = logs.append(&agent_id, &log_entry("write:file", true)).await.unwrap();
    logs.append(&agent_id, &log_entry("delete:file", true)).await.unwrap();

    // Simulate out-of-band tampering with the stored action.
    sqlx::query("UPDATE audit_logs SET action = 'export:pii' WHERE log_id = $1")
        .bind(middle.log_id)
        .execute(&pool)
        .await
        .unwrap();

    let verification = logs.verify_chain(&agent_id).await.unwrap();
    assert!(!verification.valid);
    assert_eq!(verification.total_entries, 3);
    assert_eq!(verification.broken_at, Some(middle.log_id));
}

#[tokio::test]
async fn log_query_filters_apply() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let logs = AuditLogStore::new(pool.clone());
    let team = testing::unique_id("team");
    let agent_id = seed_agent(&pool, &team).await;

    logs.append(&agent_id, &log_entry("read:file", true)).await.unwrap();
    logs.append(&agent_id, &log_entry("write:file", false)).await.unwrap();
    logs.append(&agent_id, &log_entry("read:file", true)).await.unwrap();

    let reads = logs
        .query(&LogFilter {
            agent_id: Some(agent_id.clone()),
            action: Some("read:file".to_string()),
            limit: 10,
            ..LogFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(reads.len(), 2);

    let denied = logs
        .query(&LogFilter {
            agent_id: Some(agent_id.clone()),
            allowed: Some(false),
            limit: 10,
            ..LogFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(denied.len(), 1);
    assert_eq!(denied[0].action, "write:file");

    let scoped_out = logs
        .query(&LogFilter {
            agent_id: Some(agent_id.clone()),
            team: Some("some-other-team".to_string()),
            limit: 10,
            ..LogFilter::default()
        })
        .await
        .unwrap();
    assert!(scoped_out.is_empty());

    let paged = logs
        .query(&LogFilter {
            agent_id: Some(agent_id.clone()),
            limit: 2,
            offset: 2,
            ..LogFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(paged.len(), 1);
}

#[tokio::test]
async fn revocation_round_trip_and_purge() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let revoked = RevokedTokenStore::new(pool.clone());
    let jti = Uuid::new_v4();
    let now = chrono::Utc::now();

    assert!(!revoked.is_revoked(jti).await.unwrap());

    revoked.revoke(jti, now + chrono::Duration::hours(1)).await.unwrap();
    assert!(revoked.is_revoked(jti).await.unwrap());

    let row = revoked.get(jti).await.unwrap().unwrap();
    assert_eq!(row.jti, jti);
    assert!(row.expires_at > row.revoked_at);

    // Revoking again is a no-op.
    revoked.revoke(jti, now + chrono::Duration::hours(1)).await.unwrap();

    // Purge removes only rows whose token has expired.
    let expired = Uuid::new_v4();
    revoked.revoke(expired, now - chrono::Duration::hours(1)).await.unwrap();
    revoked.purge_expired(now).await.unwrap();
    assert!(!revoked.is_revoked(expired).await.unwrap());
    assert!(revoked.is_revoked(jti).await.unwrap());
}

#[tokio::test]
async fn admin_user_store_round_trip() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let admins = AdminUserStore::new(pool.clone());
    let admin_id = testing::unique_id("adm");
    let key_hash = format!("hash-{admin_id}");

    let created = admins
        .create(&NewAdminUser {
            admin_id: admin_id.clone(),
            name: "auditor-jo".to_string(),
            key_hash: key_hash.clone(),
            key_prefix: "adk_testpref".to_string(),
            role: AdminRole::Auditor,
            team: Some("payments".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(created.role, AdminRole::Auditor);

    let found = admins.find_active_by_key_hash(&key_hash).await.unwrap().unwrap();
    assert_eq!(found.admin_id, admin_id);

    assert!(admins.deactivate(&admin_id).await.unwrap());
    assert!(admins.find_active_by_key_hash(&key_hash).await.unwrap().is_none());
    assert!(!admins.deactivate("adm_missing").await.unwrap());
}

#[tokio::test]
async fn report_summary_is_team_scoped() {
    let Some(pool) = setup().await else {
        eprintln!("skipping: no docker");
        return;
    };
    let logs = AuditLogStore::new(pool.clone());
    let approvals = ApprovalStore::new(pool.clone());
    let reports = ReportStore::new(pool.clone());
    let team = testing::unique_id("team");
    let agent_id = seed_agent(&pool, &team).await;

    logs.append(&agent_id, &log_entry("read:file", true)).await.unwrap();
    logs.append(&agent_id, &log_entry("delete:db", false)).await.unwrap();
    logs.append(&agent_id, &log_entry("delete:db", false)).await.unwrap();
    approvals.create(&agent_id, "export:csv", None, None).await.unwrap();

    let report = reports.summary(30, Some(&team)).await.unwrap();
    assert_eq!(report.period_days, 30);
    assert_eq!(report.overview.total_actions, 3);
    assert_eq!(report.overview.allowed, 1);
    assert_eq!(report.overview.denied, 2);
    assert_eq!(report.approvals.total, 1);
    assert_eq!(report.approvals.pending, 1);
    assert_eq!(report.top_agents.len(), 1);
    assert_eq!(report.top_agents[0].agent_id, agent_id);
    assert_eq!(report.top_denied_actions[0].action, "delete:db");
    assert_eq!(report.top_denied_actions[0].count, 2);
    assert!(!report.daily_breakdown.is_empty());
    let today = report.daily_breakdown.last().unwrap();
    assert_eq!(today.total, 3);

    // A different team sees nothing of this activity.
    let other = reports.summary(30, Some("unrelated-team")).await.unwrap();
    assert_eq!(other.overview.total_actions, 0);
    assert_eq!(other.approvals.total, 0);
}
