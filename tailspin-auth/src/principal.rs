//! Authenticated principal and the claims it is built from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tailspin_core::{TailspinResult, TenantId, TokenCacheKey, TrustError, UserId};

/// Claim carrying the tenant id.
pub const TENANT_ID_CLAIM: &str = "tid";
/// Claim carrying the stable user object id.
pub const OBJECT_ID_CLAIM: &str = "oid";

// ============================================================================
// CLAIMS
// ============================================================================

/// `roles` is a single string when the user holds exactly one role in some
/// token versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RolesClaim {
    One(String),
    Many(Vec<String>),
}

impl RolesClaim {
    pub fn values(&self) -> Vec<&str> {
        match self {
            RolesClaim::One(role) => vec![role.as_str()],
            RolesClaim::Many(roles) => roles.iter().map(String::as_str).collect(),
        }
    }
}

/// Claims of an Azure AD id or access token that the application uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AadClaims {
    #[serde(default)]
    pub iss: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<RolesClaim>,
}

// ============================================================================
// ROLES
// ============================================================================

/// Application roles defined on the Surveys app registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SurveyRole {
    SurveyAdmin,
    SurveyCreator,
}

impl SurveyRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyRole::SurveyAdmin => "SurveyAdmin",
            SurveyRole::SurveyCreator => "SurveyCreator",
        }
    }

    /// Case-insensitive match on the role claim value.
    pub fn parse(value: &str) -> Option<Self> {
        [SurveyRole::SurveyAdmin, SurveyRole::SurveyCreator]
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

impl fmt::Display for SurveyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PRINCIPAL
// ============================================================================

/// A signed-in user with a normalized claim set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub issuer: String,
    pub display_name: Option<String>,
    pub user_principal_name: Option<String>,
    pub roles: BTreeSet<SurveyRole>,
}

impl Principal {
    /// Normalize raw claims.
    ///
    /// `tid`, `iss` and one of `oid`/`sub` are required. Unknown roles are
    /// dropped.
    pub fn from_claims(claims: &AadClaims) -> TailspinResult<Self> {
        let tenant_id =
            non_empty(claims.tid.as_deref()).ok_or_else(|| missing(TENANT_ID_CLAIM))?;
        let user_id = non_empty(claims.oid.as_deref())
            .or_else(|| non_empty(claims.sub.as_deref()))
            .ok_or_else(|| missing(OBJECT_ID_CLAIM))?;
        if claims.iss.trim().is_empty() {
            return Err(missing("iss").into());
        }

        let roles = claims
            .roles
            .as_ref()
            .map(|r| r.values().into_iter().filter_map(SurveyRole::parse).collect())
            .unwrap_or_default();

        Ok(Self {
            user_id: UserId::from(user_id),
            tenant_id: TenantId::from(tenant_id),
            issuer: claims.iss.clone(),
            display_name: claims.name.clone(),
            user_principal_name: claims.upn.clone().or_else(|| claims.unique_name.clone()),
            roles,
        })
    }

    pub fn has_role(&self, role: SurveyRole) -> bool {
        self.roles.contains(&role)
    }

    /// Key of this user's entry in the token cache.
    pub fn token_cache_key(&self) -> TokenCacheKey {
        TokenCacheKey::new(self.user_id.clone(), self.tenant_id.clone())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn missing(claim: &str) -> TrustError {
    TrustError::MissingClaim {
        claim: claim.to_string(),
    }
}
