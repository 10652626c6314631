//! End-to-end tests for sign-in, token caching and tenant trust.
//!
//! Wires the real cache, acquisition service, issuer policy, event handlers
//! and bearer validator over in-memory adapters and a scripted identity
//! provider.

use chrono::Duration as ChronoDuration;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::SecretString;
use std::sync::Arc;
use tailspin_auth::{
    AadClaims, AuthEvent, AuthOutcome, AuthenticationEvents, AuthorizationCodeReceivedContext,
    BearerConfig, BearerKey, BearerValidator, DistributedTokenCache, IssuerValidationPolicy,
    SignedOutContext, TokenAcquisitionService, TokenValidatedContext,
};
use tailspin_core::{
    AzureAdConfig, Clock, IssuerPolicyConfig, ManualClock, ProviderConfig, TenantId,
    TokenCacheConfig, UserId,
};
use tailspin_storage::{InMemoryCacheBackend, InMemoryTenantStore};
use tailspin_test_utils::{assertions, fixtures, CountingCacheBackend, MockIdentityProvider};

const SIGNING_SECRET: &str = "integration-signing-secret";
const API: &str = "https://surveys/api";

struct App {
    events: AuthenticationEvents,
    acquisition: Arc<TokenAcquisitionService>,
    bearer: BearerValidator,
    provider: Arc<MockIdentityProvider>,
    backend: Arc<CountingCacheBackend<InMemoryCacheBackend>>,
    clock: Arc<ManualClock>,
    azure_ad: AzureAdConfig,
}

fn app() -> App {
    let clock = Arc::new(ManualClock::new(fixtures::epoch()));
    let mut azure_ad = fixtures::azure_ad_config();
    azure_ad.issuer_template = "https://login/{tenantid}".to_string();

    let backend = Arc::new(CountingCacheBackend::new(InMemoryCacheBackend::new()));
    let cache = Arc::new(DistributedTokenCache::new(
        backend.clone(),
        TokenCacheConfig::default(),
    ));
    let provider = Arc::new(MockIdentityProvider::new());
    let acquisition = Arc::new(TokenAcquisitionService::new(
        cache,
        provider.clone(),
        clock.clone(),
        &ProviderConfig::default(),
    ));
    let policy = Arc::new(IssuerValidationPolicy::new(
        Arc::new(InMemoryTenantStore::new()),
        IssuerPolicyConfig::default(),
    ));
    let events = AuthenticationEvents::new(
        policy.clone(),
        acquisition.clone(),
        azure_ad.clone(),
        clock.clone(),
    );
    let bearer = BearerValidator::new(
        &BearerConfig {
            key: BearerKey::Hmac(SecretString::new(SIGNING_SECRET.into())),
            audience: None,
            clock_skew_secs: 60,
        },
        policy,
        clock.clone(),
    )
    .unwrap();

    App {
        events,
        acquisition,
        bearer,
        provider,
        backend,
        clock,
        azure_ad,
    }
}

fn claims(user: &str, tenant: &str, issuer: &str) -> AadClaims {
    AadClaims {
        iss: issuer.to_string(),
        tid: Some(tenant.to_string()),
        oid: Some(user.to_string()),
        exp: Some(fixtures::epoch().timestamp() + 3600),
        ..AadClaims::default()
    }
}

fn bearer_token(claims: &AadClaims) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(SIGNING_SECRET.as_bytes()),
    )
    .unwrap()
}

#[tokio::test]
async fn first_sign_in_registers_tenant_and_gates_api() {
    let app = app();

    // Before sign-up no request from t1 is trusted
    let t1_token = bearer_token(&claims("u1", "t1", "https://login/t1"));
    let result = app.bearer.validate(&t1_token).await;
    assertions::assert_untrusted_issuer(&result, "t1");

    let outcome = app
        .events
        .handle(AuthEvent::TokenValidated(TokenValidatedContext {
            claims: claims("u1", "t1", "https://login/t1"),
        }))
        .await;
    assert!(matches!(outcome, AuthOutcome::SignedIn { .. }));

    let principal = app.bearer.validate(&t1_token).await.unwrap();
    assert_eq!(principal.user_id, UserId::from("u1"));
    assert_eq!(principal.tenant_id, TenantId::from("t1"));

    // t2 never signed up
    let t2_token = bearer_token(&claims("u2", "t2", "https://login/t2"));
    let result = app.bearer.validate(&t2_token).await;
    assertions::assert_untrusted_issuer(&result, "t2");
}

#[tokio::test]
async fn sign_in_then_api_calls_hit_the_cache() {
    let app = app();
    app.provider.push_ok(fixtures::token_response(
        "api-at-1",
        Some("rt-1"),
        fixtures::epoch() + ChronoDuration::hours(1),
    ));
    app.provider.push_ok(fixtures::token_response(
        "api-at-2",
        Some("rt-2"),
        fixtures::epoch() + ChronoDuration::hours(2),
    ));

    let principal = app
        .events
        .on_token_validated(TokenValidatedContext {
            claims: claims("u1", "t1", "https://login/t1"),
        })
        .await
        .unwrap();
    app.events
        .on_authorization_code_received(AuthorizationCodeReceivedContext {
            principal: principal.clone(),
            code: "code".to_string(),
            redirect_uri: None,
        })
        .await
        .unwrap();
    assert_eq!(app.provider.calls(), 1);

    let credential = app.azure_ad.client_credential();
    let user = principal.user_id.clone();
    let tenant = principal.tenant_id.clone();

    // Served from cache, no provider call and no write
    let sets = app.backend.sets();
    let token = app
        .acquisition
        .get_token(&user, &tenant, API, &credential)
        .await
        .unwrap();
    assert_eq!(token.token, "api-at-1");
    assert_eq!(app.provider.calls(), 1);
    assert_eq!(app.backend.sets(), sets);

    // Past expiry: exactly one renewal and one save
    app.clock.advance(ChronoDuration::minutes(58));
    let token = app
        .acquisition
        .get_token(&user, &tenant, API, &credential)
        .await
        .unwrap();
    assert_eq!(token.token, "api-at-2");
    assert_eq!(app.provider.calls(), 2);
    assert_eq!(app.backend.sets(), sets + 1);
    assert_eq!(app.clock.now(), fixtures::epoch() + ChronoDuration::minutes(58));

    // Sign-out clears the cache; the next call needs interactive sign-in
    app.events
        .handle(AuthEvent::SignedOut(SignedOutContext {
            principal: principal.clone(),
        }))
        .await;
    let result = app
        .acquisition
        .get_token(&user, &tenant, API, &credential)
        .await;
    assertions::assert_acquisition_required(&result);
    assert_eq!(app.provider.calls(), 2);
}

#[tokio::test]
async fn tenants_do_not_share_token_caches() {
    let app = app();
    app.provider.push_ok(fixtures::token_response(
        "t1-token",
        Some("rt"),
        fixtures::epoch() + ChronoDuration::hours(1),
    ));

    let principal = app
        .events
        .on_token_validated(TokenValidatedContext {
            claims: claims("u1", "t1", "https://login/t1"),
        })
        .await
        .unwrap();
    app.events
        .on_authorization_code_received(AuthorizationCodeReceivedContext {
            principal,
            code: "code".to_string(),
            redirect_uri: None,
        })
        .await
        .unwrap();

    // Same user id in another tenant
    let result = app
        .acquisition
        .get_token(
            &UserId::from("u1"),
            &TenantId::from("t2"),
            API,
            &app.azure_ad.client_credential(),
        )
        .await;
    assertions::assert_acquisition_required(&result);
}
