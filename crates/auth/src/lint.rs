//! Least-privilege checks over a grant.
//!
//! The deploy layer runs these before anything is provisioned. Whether a
//! finding blocks the deploy is decided there (strict vs lenient mode).

use serde::Serialize;

use crate::{Action, PermissionGrant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// A statement applies to every resource (`*`).
    UnscopedResource,
    /// A statement applies to a resource prefix.
    PrefixResource,
    /// A statement uses a wildcard action.
    WildcardAction,
    /// The grant names an action outside the expected capability set.
    UnexpectedAction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantFinding {
    pub kind: FindingKind,
    pub severity: Severity,
    pub statement: usize,
    pub message: String,
}

/// Check `grant` against the capability set it is supposed to carry.
pub fn lint_grant(grant: &PermissionGrant, expected: &[Action]) -> Vec<GrantFinding> {
    let mut findings = Vec::new();

    for (idx, statement) in grant.statements().iter().enumerate() {
        for action in &statement.actions {
            if action.is_wildcard() {
                findings.push(GrantFinding {
                    kind: FindingKind::WildcardAction,
                    severity: Severity::Error,
                    statement: idx,
                    message: format!("wildcard action '{action}' grants more than required"),
                });
            } else if !expected.contains(action) {
                findings.push(GrantFinding {
                    kind: FindingKind::UnexpectedAction,
                    severity: Severity::Error,
                    statement: idx,
                    message: format!("action '{action}' is not part of the unit's capability set"),
                });
            }
        }

        for resource in &statement.resources {
            if resource.is_any() {
                findings.push(GrantFinding {
                    kind: FindingKind::UnscopedResource,
                    severity: Severity::Error,
                    statement: idx,
                    message: format!(
                        "{:?} applies to all resources; scope it to the configured resource",
                        statement.actions.iter().map(Action::as_str).collect::<Vec<_>>()
                    ),
                });
            } else if resource.is_wildcard() {
                findings.push(GrantFinding {
                    kind: FindingKind::PrefixResource,
                    severity: Severity::Warning,
                    statement: idx,
                    message: format!("resource pattern '{resource}' matches by prefix"),
                });
            }
        }
    }

    findings
}
