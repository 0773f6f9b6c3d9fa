//! # Policy Decision Engine
//!
//! Pure three-outcome policy evaluation: given an agent's policy, its
//! team's policy, and a requested `(action, resource)`, decide `allowed`,
//! `denied`, or `requires approval`.
//!
//! The crate does no I/O. Callers load the policy rows, pass the current
//! UTC time (injected for testability), and act on the returned
//! [`Decision`] — the server turns `RequiresApproval` into an approval
//! record and a webhook notification.
//!
//! Evaluation order (first match wins inside each list):
//! 1. no policy row at all → denied
//! 2. merged require-approval rules (agent first, team appended)
//! 3. merged deny rules (team first, so a team can override an agent allow)
//! 4. merged allow rules (agent first)
//! 5. tail default: allow-list mode when any allow rule exists, otherwise
//!    deny-list mode (allow anything not denied)

pub mod conditions;
pub mod engine;
pub mod normalize;
pub mod pattern;

pub use conditions::evaluate_conditions;
pub use engine::{Decision, MergedRules, evaluate, merge_rules, rule_matches};
pub use normalize::normalize_action;
pub use pattern::glob_match;
