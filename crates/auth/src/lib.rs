//! `digestflow-auth` -- the trust boundary of a compute unit.
//!
//! Pure policy evaluation: which actions an execution identity may perform on
//! which resources. Decoupled from the platform that enforces it.

pub mod authorize;
pub mod grant;
pub mod lint;
pub mod permissions;
pub mod principal;

pub use authorize::{
    AuthorizationExplanation, AuthzError, DenialKind, DenialReason, authorize,
    explain_authorization,
};
pub use grant::{PermissionGrant, PolicyStatement};
pub use lint::{FindingKind, GrantFinding, Severity, lint_grant};
pub use permissions::{Action, ResourcePattern, actions};
pub use principal::PrincipalId;
