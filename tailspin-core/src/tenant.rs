//! Registered tenants and issuer matching.

use crate::identity::{TenantId, Timestamp};
use serde::{Deserialize, Serialize};

/// Placeholder expanded with the tenant id in issuer templates.
pub const TENANT_ID_PLACEHOLDER: &str = "{tenantid}";

/// A tenant trusted by this deployment.
///
/// Created on the first sign-in from the tenant and never mutated after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredTenant {
    pub tenant_id: TenantId,
    /// Either a literal issuer URL or a template containing `{tenantid}`.
    pub issuer_value: String,
    pub created_at: Timestamp,
}

impl RegisteredTenant {
    pub fn new(
        tenant_id: impl Into<TenantId>,
        issuer_value: impl Into<String>,
        created_at: Timestamp,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            issuer_value: issuer_value.into(),
            created_at,
        }
    }

    /// Check a token's `iss` claim against the stored issuer.
    ///
    /// Exact, case-sensitive comparison; a single trailing `/` is ignored on
    /// both sides.
    pub fn matches_issuer(&self, token_issuer: &str) -> bool {
        issuer_matches(&self.issuer_value, self.tenant_id.as_str(), token_issuer)
    }
}

/// Compare `token_issuer` with a literal issuer or an issuer template.
pub fn issuer_matches(stored: &str, tenant_id: &str, token_issuer: &str) -> bool {
    let expected = expand_issuer_template(stored, tenant_id);
    !token_issuer.is_empty() && normalize(&expected) == normalize(token_issuer)
}

/// Substitute `{tenantid}` in an issuer template.
pub fn expand_issuer_template(template: &str, tenant_id: &str) -> String {
    template.replace(TENANT_ID_PLACEHOLDER, tenant_id)
}

fn normalize(issuer: &str) -> &str {
    issuer.strip_suffix('/').unwrap_or(issuer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SystemClock};

    #[test]
    fn test_literal_issuer_match() {
        let tenant = RegisteredTenant::new("t1", "https://login/t1", SystemClock.now());
        assert!(tenant.matches_issuer("https://login/t1"));
        assert!(tenant.matches_issuer("https://login/t1/"));
        assert!(!tenant.matches_issuer("https://login/t2"));
        assert!(!tenant.matches_issuer(""));
    }

    #[test]
    fn test_issuer_match_is_case_sensitive() {
        let tenant = RegisteredTenant::new("t1", "https://login/t1", SystemClock.now());
        assert!(!tenant.matches_issuer("HTTPS://LOGIN/T1"));
        assert!(!tenant.matches_issuer("https://login/T1/"));
        assert!(tenant.matches_issuer("https://login/t1/"));
    }

    #[test]
    fn test_template_issuer_match() {
        let tenant = RegisteredTenant::new(
            "72f988bf-86f1-41af-91ab-2d7cd011db47",
            "https://sts.windows.net/{tenantid}/",
            SystemClock.now(),
        );
        assert!(tenant.matches_issuer(
            "https://sts.windows.net/72f988bf-86f1-41af-91ab-2d7cd011db47/"
        ));
        assert!(!tenant.matches_issuer("https://sts.windows.net/someone-else/"));
        assert!(!tenant.matches_issuer("https://sts.windows.net/{tenantid}/"));
    }
}
