use serde::Serialize;
use thiserror::Error;

use crate::{Action, PermissionGrant, PrincipalId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("grant '{grant}' is bound to a different principal")]
    PrincipalMismatch { grant: String },

    #[error("forbidden: '{action}' on '{resource}'")]
    Forbidden { action: String, resource: String },
}

/// Decide whether `principal` may perform `action` on `resource` under `grant`.
///
/// Default deny: anything not covered by a statement is forbidden.
///
/// - No IO
/// - No panics
pub fn authorize(
    grant: &PermissionGrant,
    principal: &PrincipalId,
    action: &Action,
    resource: &str,
) -> Result<(), AuthzError> {
    if grant.principal() != principal {
        return Err(AuthzError::PrincipalMismatch {
            grant: grant.name().to_string(),
        });
    }

    if grant.statements().iter().any(|s| s.allows(action, resource)) {
        Ok(())
    } else {
        tracing::debug!(
            grant = grant.name(),
            action = %action,
            resource,
            "authorization denied"
        );
        Err(AuthzError::Forbidden {
            action: action.to_string(),
            resource: resource.to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub action: String,
    pub resource: String,
    pub granted: bool,
    pub reason: String,
    /// Index of the statement that allowed the request, if any.
    pub matched_statement: Option<usize>,
    pub denial_reason: Option<DenialReason>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DenialReason {
    pub kind: DenialKind,
    pub message: String,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialKind {
    PrincipalMismatch,
    ActionNotGranted,
    ResourceOutOfScope,
}

/// Explain why a request would be allowed or denied.
///
/// Distinguishes "the action is never granted" from "the action is granted
/// but not on this resource", which is the usual symptom of a grant scoped
/// to a stale model or topic name.
pub fn explain_authorization(
    grant: &PermissionGrant,
    principal: &PrincipalId,
    action: &Action,
    resource: &str,
) -> AuthorizationExplanation {
    let base = |granted: bool,
                reason: String,
                matched: Option<usize>,
                denial: Option<DenialReason>| AuthorizationExplanation {
        action: action.to_string(),
        resource: resource.to_string(),
        granted,
        reason,
        matched_statement: matched,
        denial_reason: denial,
    };

    if grant.principal() != principal {
        return base(
            false,
            format!(
                "Grant '{}' belongs to {} but the caller is {}",
                grant.name(),
                grant.principal(),
                principal
            ),
            None,
            Some(DenialReason {
                kind: DenialKind::PrincipalMismatch,
                message: "Grants are bound to exactly one execution identity".to_string(),
                suggestions: vec![format!(
                    "Attach a grant to {principal} in the deployment descriptor"
                )],
            }),
        );
    }

    if let Some(idx) = grant
        .statements()
        .iter()
        .position(|s| s.allows(action, resource))
    {
        return base(
            true,
            format!("Statement #{idx} allows '{action}' on '{resource}'"),
            Some(idx),
            None,
        );
    }

    let scoped_elsewhere: Vec<String> = grant
        .statements()
        .iter()
        .filter(|s| s.actions.iter().any(|a| a.covers(action)))
        .flat_map(|s| s.resources.iter().map(|r| r.to_string()))
        .collect();

    if scoped_elsewhere.is_empty() {
        base(
            false,
            format!("No statement grants '{action}'"),
            None,
            Some(DenialReason {
                kind: DenialKind::ActionNotGranted,
                message: format!("Missing action: '{action}'"),
                suggestions: vec![format!(
                    "Add an explicit statement for '{action}' scoped to '{resource}'"
                )],
            }),
        )
    } else {
        base(
            false,
            format!("'{action}' is granted only on {scoped_elsewhere:?}"),
            None,
            Some(DenialReason {
                kind: DenialKind::ResourceOutOfScope,
                message: format!("'{resource}' is outside the granted resources"),
                suggestions: vec![
                    "Check that the configured identifier matches the deployed resource".to_string(),
                    format!("Scope a statement for '{action}' to '{resource}'"),
                ],
            }),
        )
    }
}

#[cfg(test)]
mod tests {
    use digestflow_core::PlatformContext;

    use super::*;
    use crate::{PolicyStatement, ResourcePattern, actions};

    const TOPIC: &str = "arn:aws:sns:us-east-1:1:topic-1";
    const MODEL: &str = "arn:aws:bedrock:us-east-1::foundation-model/model-a";

    fn principal() -> PrincipalId {
        PrincipalId::new(PlatformContext::new("us-east-1", "1").role_arn("analyzer-role"))
    }

    fn minimal_grant() -> PermissionGrant {
        PermissionGrant::new("AnalyzerPolicy", principal())
            .with_statement(PolicyStatement::new(
                vec![actions::MODEL_INVOKE],
                vec![ResourcePattern::new(MODEL)],
            ))
            .with_statement(PolicyStatement::new(
                vec![actions::TOPIC_PUBLISH],
                vec![ResourcePattern::new(TOPIC)],
            ))
    }

    #[test]
    fn the_two_granted_capabilities_are_allowed() {
        let grant = minimal_grant();
        assert!(authorize(&grant, &principal(), &actions::MODEL_INVOKE, MODEL).is_ok());
        assert!(authorize(&grant, &principal(), &actions::TOPIC_PUBLISH, TOPIC).is_ok());
    }

    #[test]
    fn everything_else_is_denied() {
        let grant = minimal_grant();
        let denied = [
            (Action::new("sns:Subscribe"), TOPIC),
            (Action::new("sns:DeleteTopic"), TOPIC),
            (Action::new("s3:GetObject"), "arn:aws:s3:::bucket/key"),
            (Action::new("dynamodb:PutItem"), "arn:aws:dynamodb:us-east-1:1:table/t"),
            (Action::new("secretsmanager:GetSecretValue"), "arn:aws:secretsmanager:us-east-1:1:secret:x"),
            (actions::MODEL_INVOKE, "arn:aws:bedrock:us-east-1::foundation-model/model-b"),
            (actions::TOPIC_PUBLISH, "arn:aws:sns:us-east-1:1:other-topic"),
        ];

        for (action, resource) in denied {
            let result = authorize(&grant, &principal(), &action, resource);
            assert!(
                matches!(result, Err(AuthzError::Forbidden { .. })),
                "{action} on {resource} should be denied"
            );
        }
    }

    #[test]
    fn foreign_principal_is_rejected() {
        let other = PrincipalId::new(PlatformContext::new("us-east-1", "1").role_arn("intruder"));
        let result = authorize(&minimal_grant(), &other, &actions::TOPIC_PUBLISH, TOPIC);
        assert!(matches!(result, Err(AuthzError::PrincipalMismatch { .. })));
    }

    #[test]
    fn explanation_distinguishes_scope_from_missing_action() {
        let grant = minimal_grant();

        let wrong_model = explain_authorization(
            &grant,
            &principal(),
            &actions::MODEL_INVOKE,
            "arn:aws:bedrock:us-east-1::foundation-model/model-b",
        );
        assert!(!wrong_model.granted);
        assert_eq!(
            wrong_model.denial_reason.map(|d| d.kind),
            Some(DenialKind::ResourceOutOfScope)
        );

        let missing = explain_authorization(&grant, &principal(), &Action::new("s3:PutObject"), "x");
        assert_eq!(
            missing.denial_reason.map(|d| d.kind),
            Some(DenialKind::ActionNotGranted)
        );

        let ok = explain_authorization(&grant, &principal(), &actions::TOPIC_PUBLISH, TOPIC);
        assert!(ok.granted);
        assert_eq!(ok.matched_statement, Some(1));
    }
}
