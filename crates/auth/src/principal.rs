use serde::{Deserialize, Serialize};

use digestflow_core::Arn;

/// Execution identity of a compute unit (its role name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(Arn);

impl PrincipalId {
    pub fn new(role: Arn) -> Self {
        Self(role)
    }

    pub fn as_arn(&self) -> &Arn {
        &self.0
    }
}

impl core::fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Arn> for PrincipalId {
    fn from(value: Arn) -> Self {
        Self(value)
    }
}
