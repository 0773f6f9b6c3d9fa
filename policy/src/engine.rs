//! Three-outcome policy evaluation over merged agent + team rule lists.

use chrono::{DateTime, Utc};
use guard_core::{Environment, Policy, Rule, TeamPolicy};

use crate::conditions::evaluate_conditions;
use crate::normalize::normalize_action;
use crate::pattern::glob_match;

/// Outcome of evaluating one `(action, resource)` request.
///
/// Decisions never fail: every input maps to exactly one variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Allowed { reason: String },
    Denied { reason: String },
    /// A require-approval rule matched. The caller is responsible for
    /// creating the approval record and notifying humans; `rule` is the
    /// matched clause for the audit trail.
    RequiresApproval { reason: String, rule: Rule },
}

impl Decision {
    pub fn status(&self) -> &'static str {
        match self {
            Decision::Allowed { .. } => "allowed",
            Decision::Denied { .. } => "denied",
            Decision::RequiresApproval { .. } => "pending",
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Decision::Allowed { reason }
            | Decision::Denied { reason }
            | Decision::RequiresApproval { reason, .. } => reason,
        }
    }
}

/// Agent and team rule lists merged in precedence order.
///
/// - `require_approval`: agent rules first, team rules appended;
/// - `deny`: team rules first, so a team can block an agent allow;
/// - `allow`: agent rules first, so an agent can narrow a team allow.
#[derive(Debug, Clone, Default)]
pub struct MergedRules {
    pub require_approval: Vec<Rule>,
    pub deny: Vec<Rule>,
    pub allow: Vec<Rule>,
}

pub fn merge_rules(policy: &Policy, team_policy: Option<&TeamPolicy>) -> MergedRules {
    match team_policy {
        Some(team) => MergedRules {
            require_approval: [policy.require_approval.as_slice(), team.require_approval.as_slice()]
                .concat(),
            deny: [team.deny.as_slice(), policy.deny.as_slice()].concat(),
            allow: [policy.allow.as_slice(), team.allow.as_slice()].concat(),
        },
        None => MergedRules {
            require_approval: policy.require_approval.clone(),
            deny: policy.deny.clone(),
            allow: policy.allow.clone(),
        },
    }
}

/// Check one rule against a request.
///
/// The action comparison works on normalized `verb:noun` forms with glob
/// semantics. A single-token action (`"read"`) additionally matches a
/// verb-qualified rule (`"read:*"`) when it equals or globs the rule's
/// verb. The resource pattern (missing or `"*"` → match-all) is then
/// applied case-insensitively, and finally any conditions block must hold.
pub fn rule_matches(
    rule: &Rule,
    action: &str,
    resource: Option<&str>,
    environment: Environment,
    now: DateTime<Utc>,
) -> bool {
    let normalized_action = normalize_action(action);
    let normalized_rule = normalize_action(&rule.action);

    let resource_ok = |pattern: &str| {
        if pattern.is_empty() || pattern == "*" {
            return true;
        }
        let supplied = resource.unwrap_or("").to_lowercase();
        glob_match(&supplied, &pattern.to_lowercase())
    };

    let matched = if glob_match(&normalized_action, &normalized_rule) {
        resource_ok(rule.resource_pattern())
    } else if !normalized_action.contains(':') && normalized_rule.contains(':') {
        // Single-token fallback: "read" against "read:*".
        let rule_verb = normalized_rule.split(':').next().unwrap_or("");
        if normalized_action == rule_verb || glob_match(&normalized_action, rule_verb) {
            resource_ok(rule.resource_pattern())
        } else {
            false
        }
    } else {
        false
    };

    if !matched {
        return false;
    }

    match &rule.conditions {
        Some(conditions) => evaluate_conditions(conditions, environment, now),
        None => true,
    }
}

fn rule_label(rule: &Rule) -> String {
    format!("{} on {}", rule.action, rule.resource_pattern())
}

/// Evaluate a request against an agent's policy merged with its team's.
///
/// `policy = None` means no policy row exists for the agent, which is an
/// unconditional deny before any rule is consulted.
pub fn evaluate(
    policy: Option<&Policy>,
    team_policy: Option<&TeamPolicy>,
    environment: Environment,
    action: &str,
    resource: Option<&str>,
    now: DateTime<Utc>,
) -> Decision {
    let Some(policy) = policy else {
        return Decision::Denied {
            reason: "No policy defined for agent (default deny)".to_string(),
        };
    };

    let merged = merge_rules(policy, team_policy);

    for rule in &merged.require_approval {
        if rule_matches(rule, action, resource, environment, now) {
            return Decision::RequiresApproval {
                reason: format!("Requires human approval: {}", rule_label(rule)),
                rule: rule.clone(),
            };
        }
    }

    for rule in &merged.deny {
        if rule_matches(rule, action, resource, environment, now) {
            return Decision::Denied {
                reason: format!("Denied by rule: {}", rule_label(rule)),
            };
        }
    }

    for rule in &merged.allow {
        if rule_matches(rule, action, resource, environment, now) {
            return Decision::Allowed {
                reason: format!("Allowed by rule: {}", rule_label(rule)),
            };
        }
    }

    // Dual tail default: any configured allow rule switches the agent into
    // allow-list mode; a deny-only policy is a blacklist.
    if merged.allow.is_empty() {
        Decision::Allowed {
            reason: "No deny rule matched (default allow — deny-list mode)".to_string(),
        }
    } else {
        Decision::Denied {
            reason: "No matching allow rule (default deny)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use guard_core::RuleConditions;

    fn noon_monday() -> DateTime<Utc> {
        // 2026-01-05 is a Monday.
        Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap()
    }

    fn noon_saturday() -> DateTime<Utc> {
        // 2026-01-03 is a Saturday.
        Utc.with_ymd_and_hms(2026, 1, 3, 12, 0, 0).unwrap()
    }

    fn policy(allow: Vec<Rule>, deny: Vec<Rule>, require_approval: Vec<Rule>) -> Policy {
        Policy {
            agent_id: "agt_test".to_string(),
            allow,
            deny,
            require_approval,
            created_at: noon_monday(),
            updated_at: noon_monday(),
        }
    }

    fn team_policy(allow: Vec<Rule>, deny: Vec<Rule>, require_approval: Vec<Rule>) -> TeamPolicy {
        TeamPolicy {
            team: "payments".to_string(),
            allow,
            deny,
            require_approval,
            created_at: noon_monday(),
            updated_at: noon_monday(),
        }
    }

    fn eval(policy: Option<&Policy>, team: Option<&TeamPolicy>, action: &str, resource: &str) -> Decision {
        evaluate(
            policy,
            team,
            Environment::Production,
            action,
            if resource.is_empty() { None } else { Some(resource) },
            noon_monday(),
        )
    }

    #[test]
    fn no_policy_row_denies() {
        let decision = eval(None, None, "read:file", "a.txt");
        assert!(matches!(decision, Decision::Denied { .. }));
        assert!(decision.reason().contains("No policy defined"));
    }

    #[test]
    fn deny_list_mode_allows_unmatched_actions() {
        let p = policy(vec![], vec![Rule::new("delete:*", "*")], vec![]);
        let decision = eval(Some(&p), None, "read:file", "foo.txt");
        assert_eq!(decision.status(), "allowed");
        assert!(decision.reason().contains("deny-list mode"));

        let decision = eval(Some(&p), None, "delete:x", "y");
        assert_eq!(decision.status(), "denied");
        assert!(decision.reason().contains("delete:*"));
    }

    #[test]
    fn allow_list_mode_denies_unmatched_actions() {
        let p = policy(vec![Rule::new("read:*", "*.txt")], vec![], vec![]);
        assert_eq!(eval(Some(&p), None, "read:file", "a.txt").status(), "allowed");

        let decision = eval(Some(&p), None, "write:file", "a.txt");
        assert_eq!(decision.status(), "denied");
        assert!(decision.reason().contains("No matching allow rule"));
    }

    #[test]
    fn require_approval_takes_precedence_over_allow_and_deny() {
        let p = policy(
            vec![Rule::new("export:*", "*")],
            vec![Rule::new("export:*", "*")],
            vec![Rule::new("export:*", "payments/*")],
        );
        let decision = eval(Some(&p), None, "export:csv", "payments/Q4");
        match decision {
            Decision::RequiresApproval { reason, rule } => {
                assert!(reason.contains("Requires human approval"));
                assert_eq!(rule.action, "export:*");
            }
            other => panic!("expected RequiresApproval, got {other:?}"),
        }
    }

    #[test]
    fn deny_beats_allow() {
        let p = policy(
            vec![Rule::new("read:*", "*")],
            vec![Rule::new("read:*", "secrets/*")],
            vec![],
        );
        assert_eq!(eval(Some(&p), None, "read:file", "secrets/key").status(), "denied");
        assert_eq!(eval(Some(&p), None, "read:file", "public/doc").status(), "allowed");
    }

    #[test]
    fn team_deny_overrides_agent_allow() {
        let p = policy(vec![Rule::new("write:transaction", "payments/*")], vec![], vec![]);
        let t = team_policy(vec![], vec![Rule::new("export:pii", "*")], vec![]);

        let decision = eval(Some(&p), Some(&t), "export:pii", "any");
        assert_eq!(decision.status(), "denied");
        assert!(decision.reason().contains("export:pii"));

        // Agent's own allow still works for its scoped action.
        assert_eq!(
            eval(Some(&p), Some(&t), "write:transaction", "payments/tx-1").status(),
            "allowed"
        );
    }

    #[test]
    fn team_allow_rules_count_for_allow_list_mode() {
        // Agent has no allow rules of its own, but the merged allow list is
        // non-empty, so the tail default is deny.
        let p = policy(vec![], vec![], vec![]);
        let t = team_policy(vec![Rule::new("read:*", "*")], vec![], vec![]);
        assert_eq!(eval(Some(&p), Some(&t), "read:file", "a").status(), "allowed");
        assert_eq!(eval(Some(&p), Some(&t), "write:file", "a").status(), "denied");
    }

    #[test]
    fn team_approval_rules_are_appended_after_agent_rules() {
        let p = policy(vec![], vec![], vec![Rule::new("deploy:*", "staging/*")]);
        let t = team_policy(vec![], vec![], vec![Rule::new("deploy:*", "*")]);
        // Both match; the agent's rule must win the citation.
        let decision = eval(Some(&p), Some(&t), "deploy:service", "staging/api");
        match decision {
            Decision::RequiresApproval { rule, .. } => {
                assert_eq!(rule.resource_pattern(), "staging/*");
            }
            other => panic!("expected RequiresApproval, got {other:?}"),
        }
    }

    #[test]
    fn resource_defaults_to_match_all() {
        let p = policy(vec![], vec![Rule { action: "delete:*".to_string(), resource: None, conditions: None }], vec![]);
        assert_eq!(eval(Some(&p), None, "delete:table", "").status(), "denied");
        assert_eq!(eval(Some(&p), None, "delete:table", "users").status(), "denied");
    }

    #[test]
    fn resource_match_is_case_insensitive() {
        let p = policy(vec![Rule::new("read:*", "Payments/*")], vec![], vec![]);
        assert_eq!(eval(Some(&p), None, "read:file", "payments/q4").status(), "allowed");
        assert_eq!(eval(Some(&p), None, "read:file", "PAYMENTS/Q4").status(), "allowed");
    }

    #[test]
    fn missing_resource_against_concrete_pattern_does_not_match() {
        let p = policy(vec![Rule::new("read:*", "*.txt")], vec![], vec![]);
        assert_eq!(eval(Some(&p), None, "read:file", "").status(), "denied");
    }

    #[test]
    fn single_token_action_matches_verb_qualified_rule() {
        let p = policy(vec![Rule::new("read:*", "*")], vec![], vec![]);
        assert_eq!(eval(Some(&p), None, "read", "anything").status(), "allowed");
        assert_eq!(eval(Some(&p), None, "write", "anything").status(), "denied");
    }

    #[test]
    fn normalized_spellings_hit_the_same_rule() {
        let p = policy(vec![Rule::new("read:file", "*")], vec![], vec![]);
        for action in ["read:file", "readFile", "Read File", "read-file", "read_file"] {
            assert_eq!(eval(Some(&p), None, action, "x").status(), "allowed", "action {action:?}");
        }
    }

    #[test]
    fn failed_condition_demotes_match_to_no_match() {
        // Weekday-only deploy rule evaluated on a Saturday falls through to
        // the deny-list default.
        let rule = Rule::new("deploy:*", "*").with_conditions(RuleConditions {
            env: Some(vec!["production".to_string()]),
            day_of_week: Some(
                ["Mon", "Tue", "Wed", "Thu", "Fri"].iter().map(|d| (*d).to_string()).collect(),
            ),
            ..RuleConditions::default()
        });
        let p = policy(vec![], vec![], vec![rule]);

        let weekday = evaluate(
            Some(&p),
            None,
            Environment::Production,
            "deploy:svc",
            Some("any"),
            noon_monday(),
        );
        assert_eq!(weekday.status(), "pending");

        let weekend = evaluate(
            Some(&p),
            None,
            Environment::Production,
            "deploy:svc",
            Some("any"),
            noon_saturday(),
        );
        assert_eq!(weekend.status(), "allowed");
        assert!(weekend.reason().contains("deny-list mode"));
    }

    #[test]
    fn condition_env_mismatch_skips_rule() {
        let rule = Rule::new("deploy:*", "*").with_conditions(RuleConditions {
            env: Some(vec!["production".to_string()]),
            ..RuleConditions::default()
        });
        let p = policy(vec![], vec![rule], vec![]);
        let decision = evaluate(
            Some(&p),
            None,
            Environment::Development,
            "deploy:svc",
            Some("any"),
            noon_monday(),
        );
        assert_eq!(decision.status(), "allowed");
    }

    #[test]
    fn adding_a_matching_deny_rule_never_turns_denied_into_allowed() {
        let base = policy(vec![Rule::new("read:*", "*")], vec![], vec![]);
        let before = eval(Some(&base), None, "read:file", "a");

        let mut stricter = base.clone();
        stricter.deny.push(Rule::new("read:*", "*"));
        let after = eval(Some(&stricter), None, "read:file", "a");

        assert_eq!(before.status(), "allowed");
        assert_eq!(after.status(), "denied");

        // And a decision that was already denied stays denied.
        let denied_before = eval(Some(&base), None, "write:file", "a");
        let denied_after = eval(Some(&stricter), None, "write:file", "a");
        assert_eq!(denied_before.status(), "denied");
        assert_eq!(denied_after.status(), "denied");
    }

    #[test]
    fn adding_a_matching_approval_rule_never_turns_denied_into_allowed() {
        let base = policy(vec![Rule::new("read:*", "*")], vec![], vec![]);
        assert_eq!(eval(Some(&base), None, "export:csv", "x").status(), "denied");

        let mut gated = base.clone();
        gated.require_approval.push(Rule::new("export:*", "*"));
        assert_eq!(eval(Some(&gated), None, "export:csv", "x").status(), "pending");
    }

    #[test]
    fn first_match_wins_within_a_list() {
        let p = policy(
            vec![],
            vec![Rule::new("delete:*", "tmp/*"), Rule::new("delete:*", "*")],
            vec![],
        );
        let decision = eval(Some(&p), None, "delete:file", "tmp/scratch");
        assert!(decision.reason().contains("tmp/*"));
    }
}
