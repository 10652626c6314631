//! Token cache data model.
//!
//! A user's tokens live in one [`TokenCacheEntry`] stored under one
//! [`TokenCacheKey`]. Inside the entry, tokens are unique by
//! [`TokenKey`] (client, resource, user).

use crate::identity::{TenantId, Timestamp, UserId};
use chrono::{DateTime, Duration};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one user's token cache entry in the distributed cache.
///
/// Fields are private so the key cannot be altered after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenCacheKey {
    user_id: UserId,
    tenant_id: TenantId,
}

impl TokenCacheKey {
    pub fn new(user_id: impl Into<UserId>, tenant_id: impl Into<TenantId>) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Render the backend key: `{prefix}:{tenant_id}:{user_id}`.
    pub fn storage_key(&self, prefix: &str) -> String {
        format!("{}:{}:{}", prefix, self.tenant_id, self.user_id)
    }
}

impl fmt::Display for TokenCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.tenant_id, self.user_id)
    }
}

/// Compound key of a single token inside an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenKey {
    pub client_id: String,
    pub resource: String,
    pub user_id: UserId,
}

impl TokenKey {
    pub fn new(
        client_id: impl Into<String>,
        resource: impl Into<String>,
        user_id: impl Into<UserId>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            resource: resource.into(),
            user_id: user_id.into(),
        }
    }
}

/// A token pair as stored in the cache.
///
/// Expiry is kept at millisecond precision, matching the stored form.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expires_on: Timestamp,
    resource: String,
}

impl CachedToken {
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_on: Timestamp,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_on: truncate_to_millis(expires_on),
            resource: resource.into(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_on(&self) -> Timestamp {
        self.expires_on
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Expired once `now >= expires_on - margin`.
    pub fn is_expired_at(&self, now: Timestamp, margin: Duration) -> bool {
        now >= self.expires_on - margin
    }

    /// Hand out the access token to a caller.
    pub fn to_access_token(&self) -> AccessToken {
        AccessToken {
            token: self.access_token.clone(),
            expires_on: self.expires_on,
            resource: self.resource.clone(),
        }
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_on", &self.expires_on)
            .field("resource", &self.resource)
            .finish()
    }
}

fn truncate_to_millis(ts: Timestamp) -> Timestamp {
    DateTime::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// All tokens held for one user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenCacheEntry {
    tokens: BTreeMap<TokenKey, CachedToken>,
}

impl TokenCacheEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TokenKey) -> Option<&CachedToken> {
        self.tokens.get(key)
    }

    /// Insert a token, overwriting any token stored under the same key.
    pub fn insert(&mut self, key: TokenKey, token: CachedToken) -> Option<CachedToken> {
        self.tokens.insert(key, token)
    }

    pub fn remove(&mut self, key: &TokenKey) -> Option<CachedToken> {
        self.tokens.remove(key)
    }

    pub fn contains(&self, key: &TokenKey) -> bool {
        self.tokens.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TokenKey, &CachedToken)> {
        self.tokens.iter()
    }

    /// Find a refresh token usable for `key`.
    ///
    /// The token stored under `key` wins. Otherwise any refresh token issued to
    /// the same client and user is returned (Azure AD refresh tokens are
    /// multi-resource), preferring the latest expiry.
    pub fn find_refresh_token(&self, key: &TokenKey) -> Option<(&TokenKey, &str)> {
        if let Some((k, rt)) = self
            .tokens
            .get_key_value(key)
            .and_then(|(k, t)| t.refresh_token().map(|rt| (k, rt)))
        {
            return Some((k, rt));
        }

        self.tokens
            .iter()
            .filter(|(k, _)| k.client_id == key.client_id && k.user_id == key.user_id)
            .filter_map(|(k, t)| t.refresh_token().map(|rt| (k, t.expires_on(), rt)))
            .max_by_key(|(_, expires_on, _)| *expires_on)
            .map(|(k, _, rt)| (k, rt))
    }
}

impl FromIterator<(TokenKey, CachedToken)> for TokenCacheEntry {
    fn from_iter<I: IntoIterator<Item = (TokenKey, CachedToken)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

/// Access token handed back to callers.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: Timestamp,
    pub resource: String,
}

impl AccessToken {
    /// Value for an `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AccessToken([REDACTED, {} chars], resource={}, expires_on={})",
            self.token.len(),
            self.resource,
            self.expires_on
        )
    }
}
