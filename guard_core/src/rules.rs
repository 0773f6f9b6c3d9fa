use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single policy clause: an action pattern, an optional resource pattern,
/// and optional conditions.
///
/// Patterns use `*`/`?` globbing and are matched case-insensitively.
/// A missing resource behaves like `"*"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<RuleConditions>,
}

impl Rule {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: Some(resource.into()),
            conditions: None,
        }
    }

    pub fn with_conditions(mut self, conditions: RuleConditions) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// Resource pattern with the missing-means-wildcard default applied.
    pub fn resource_pattern(&self) -> &str {
        self.resource.as_deref().unwrap_or("*")
    }
}

/// Optional condition block on a rule. Present keys are AND-ed; a missing
/// key always passes. Unknown keys are retained but ignored by the
/// evaluator, so newer rule documents stay loadable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Inclusive single-day `HH:MM` window.
///
/// `tz` is parsed and stored but evaluation currently runs in UTC
/// regardless; honoring it is a future additive change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default = "TimeRange::default_start")]
    pub start: String,
    #[serde(default = "TimeRange::default_end")]
    pub end: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tz: Option<String>,
}

impl TimeRange {
    fn default_start() -> String {
        "00:00".to_string()
    }

    fn default_end() -> String {
        "23:59".to_string()
    }
}

/// The three ordered rule lists of a policy document, as sent over the
/// wire on `PUT .../policy`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PolicyRules {
    #[serde(default)]
    pub allow: Vec<Rule>,
    #[serde(default)]
    pub deny: Vec<Rule>,
    #[serde(default)]
    pub require_approval: Vec<Rule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_parses_without_resource_or_conditions() {
        let rule: Rule = serde_json::from_str(r#"{"action": "read:*"}"#).unwrap();
        assert_eq!(rule.action, "read:*");
        assert_eq!(rule.resource, None);
        assert_eq!(rule.resource_pattern(), "*");
        assert_eq!(rule.conditions, None);
    }

    #[test]
    fn conditions_keep_unknown_keys() {
        let rule: Rule = serde_json::from_str(
            r#"{
                "action": "deploy:*",
                "resource": "production/*",
                "conditions": {
                    "env": ["production"],
                    "day_of_week": ["Mon", "Tue"],
                    "max_cost_usd": 100
                }
            }"#,
        )
        .unwrap();
        let conditions = rule.conditions.unwrap();
        assert_eq!(conditions.env.as_deref(), Some(&["production".to_string()][..]));
        assert!(conditions.extra.contains_key("max_cost_usd"));
    }

    #[test]
    fn time_range_tz_is_optional() {
        let tr: TimeRange = serde_json::from_str(r#"{"start": "09:00", "end": "17:00"}"#).unwrap();
        assert_eq!(tr.tz, None);
        let tr: TimeRange =
            serde_json::from_str(r#"{"start": "09:00", "end": "17:00", "tz": "UTC"}"#).unwrap();
        assert_eq!(tr.tz.as_deref(), Some("UTC"));
    }

    #[test]
    fn time_range_bounds_default_to_full_day() {
        let tr: TimeRange = serde_json::from_str(r#"{"start": "09:00"}"#).unwrap();
        assert_eq!(tr.end, "23:59");
        let tr: TimeRange = serde_json::from_str("{}").unwrap();
        assert_eq!(tr.start, "00:00");
        assert_eq!(tr.end, "23:59");
    }

    #[test]
    fn policy_rules_lists_default_empty() {
        let rules: PolicyRules = serde_json::from_str(r#"{"deny": [{"action": "delete:*"}]}"#).unwrap();
        assert!(rules.allow.is_empty());
        assert_eq!(rules.deny.len(), 1);
        assert!(rules.require_approval.is_empty());
    }

    #[test]
    fn rule_serialization_omits_absent_fields() {
        let rule = Rule {
            action: "read:*".to_string(),
            resource: None,
            conditions: None,
        };
        assert_eq!(serde_json::to_string(&rule).unwrap(), r#"{"action":"read:*"}"#);
    }
}
