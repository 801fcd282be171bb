//! Permission grants.
//!
//! A grant binds a principal to a list of allow-statements. Grants only grow:
//! there is no API to remove a statement from an existing grant. Narrowing
//! authority means declaring a new grant and replacing the old one through an
//! explicit redeploy.

use serde::{Deserialize, Serialize};

use crate::{Action, PrincipalId, ResourcePattern};

/// One allow-statement: every listed action on every listed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicyStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    pub actions: Vec<Action>,
    pub resources: Vec<ResourcePattern>,
}

impl PolicyStatement {
    pub fn new(actions: Vec<Action>, resources: Vec<ResourcePattern>) -> Self {
        Self {
            sid: None,
            actions,
            resources,
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn allows(&self, action: &Action, resource: &str) -> bool {
        self.actions.iter().any(|a| a.covers(action))
            && self.resources.iter().any(|r| r.matches(resource))
    }
}

/// Named set of statements attached to one execution identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    name: String,
    principal: PrincipalId,
    statements: Vec<PolicyStatement>,
}

impl PermissionGrant {
    pub fn new(name: impl Into<String>, principal: PrincipalId) -> Self {
        Self {
            name: name.into(),
            principal,
            statements: Vec::new(),
        }
    }

    pub fn with_statement(mut self, statement: PolicyStatement) -> Self {
        self.add_statement(statement);
        self
    }

    /// Append a statement. Duplicates are ignored.
    pub fn add_statement(&mut self, statement: PolicyStatement) {
        if !self.statements.contains(&statement) {
            self.statements.push(statement);
        }
    }

    /// Fold another grant's statements into this one (same principal only).
    ///
    /// Returns `false` and leaves `self` untouched on a principal mismatch.
    pub fn absorb(&mut self, other: &PermissionGrant) -> bool {
        if other.principal != self.principal {
            return false;
        }
        for statement in &other.statements {
            self.add_statement(statement.clone());
        }
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn principal(&self) -> &PrincipalId {
        &self.principal
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Distinct actions mentioned anywhere in the grant.
    pub fn actions(&self) -> Vec<&Action> {
        let mut out: Vec<&Action> = self.statements.iter().flat_map(|s| &s.actions).collect();
        out.sort();
        out.dedup();
        out
    }
}
