//! Authorization policies.

use crate::principal::{Principal, SurveyRole};
use std::fmt;
use tailspin_core::{TailspinResult, TrustError};

/// Named policies guarding survey operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationPolicy {
    /// Survey creators and admins.
    RequireSurveyCreator,
    /// Survey admins only.
    RequireSurveyAdmin,
}

impl AuthorizationPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            AuthorizationPolicy::RequireSurveyCreator => "RequireSurveyCreator",
            AuthorizationPolicy::RequireSurveyAdmin => "RequireSurveyAdmin",
        }
    }

    pub fn is_satisfied_by(&self, principal: &Principal) -> bool {
        match self {
            AuthorizationPolicy::RequireSurveyCreator => {
                principal.has_role(SurveyRole::SurveyCreator)
                    || principal.has_role(SurveyRole::SurveyAdmin)
            }
            AuthorizationPolicy::RequireSurveyAdmin => principal.has_role(SurveyRole::SurveyAdmin),
        }
    }

    pub fn authorize(&self, principal: &Principal) -> TailspinResult<()> {
        if self.is_satisfied_by(principal) {
            Ok(())
        } else {
            tracing::info!(
                policy = self.name(),
                tenant_id = %principal.tenant_id,
                user_id = %principal.user_id,
                "Authorization policy not satisfied"
            );
            Err(TrustError::PolicyNotSatisfied {
                policy: self.name().to_string(),
                user_id: principal.user_id.to_string(),
            }
            .into())
        }
    }
}

impl fmt::Display for AuthorizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tailspin_core::{TenantId, UserId};

    fn principal(roles: &[SurveyRole]) -> Principal {
        Principal {
            user_id: UserId::from("u1"),
            tenant_id: TenantId::from("t1"),
            issuer: "https://login/t1".to_string(),
            display_name: None,
            user_principal_name: None,
            roles: roles.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_creator_policy() {
        let policy = AuthorizationPolicy::RequireSurveyCreator;
        assert!(policy.authorize(&principal(&[SurveyRole::SurveyCreator])).is_ok());
        assert!(policy.authorize(&principal(&[SurveyRole::SurveyAdmin])).is_ok());
        assert!(policy.authorize(&principal(&[])).is_err());
    }

    #[test]
    fn test_admin_policy() {
        let policy = AuthorizationPolicy::RequireSurveyAdmin;
        assert!(policy.authorize(&principal(&[SurveyRole::SurveyAdmin])).is_ok());
        let err = policy
            .authorize(&principal(&[SurveyRole::SurveyCreator]))
            .unwrap_err();
        assert!(err.is_trust_failure());
        assert!(err.to_string().contains("RequireSurveyAdmin"));
    }
}
