use std::sync::Arc;

use adsim_core::error::AuthFailure;
use adsim_core::{
    ApiError, AuthorizeRequest, ClientCredential, ExpiryPolicy, GrantEngine, InMemoryCredentialStore,
    InMemoryGrantStore, Platform, PresentedCredential, TokenRequest,
};

fn engine() -> GrantEngine {
    GrantEngine::new(
        Arc::new(InMemoryCredentialStore::with_defaults()),
        Arc::new(InMemoryGrantStore::new()),
    )
}

fn authorize_request(platform: Platform, scope: &str) -> AuthorizeRequest {
    AuthorizeRequest {
        client_id: ClientCredential::default_for(platform).client_id,
        redirect_uri: "https://app.example.com/callback".to_string(),
        response_type: "code".to_string(),
        scope: Some(scope.to_string()),
        state: Some("xyz".to_string()),
    }
}

fn code_request(platform: Platform, code: &str) -> TokenRequest {
    let credential = ClientCredential::default_for(platform);
    TokenRequest {
        grant_type: "authorization_code".to_string(),
        code: Some(code.to_string()),
        client_id: credential.client_id,
        client_secret: credential.client_secret,
        redirect_uri: Some("https://app.example.com/callback".to_string()),
        ..Default::default()
    }
}

fn refresh_request(platform: Platform, token: &str) -> TokenRequest {
    let credential = ClientCredential::default_for(platform);
    TokenRequest {
        grant_type: "refresh_token".to_string(),
        refresh_token: Some(token.to_string()),
        client_id: credential.client_id,
        client_secret: credential.client_secret,
        ..Default::default()
    }
}

#[tokio::test]
async fn meta_code_is_exchanged_exactly_once() {
    let engine = engine();
    let authorized = engine
        .authorize(Platform::Meta, &authorize_request(Platform::Meta, "ads_management,ads_read"))
        .await
        .unwrap();
    assert!(authorized.code.starts_with("AQ"));
    assert_eq!(authorized.state.as_deref(), Some("xyz"));

    let token = engine
        .exchange(Platform::Meta, &code_request(Platform::Meta, &authorized.code))
        .await
        .unwrap();
    assert_eq!(token.access_token, "meta-static-access-token");
    assert_eq!(token.token_type, "bearer");
    assert_eq!(token.expires_in, 5_183_944);
    assert!(token.refresh_token.is_some());

    let again = engine
        .exchange(Platform::Meta, &code_request(Platform::Meta, &authorized.code))
        .await
        .unwrap_err();
    assert!(matches!(again, ApiError::InvalidGrant { .. }));
    assert_eq!(again.oauth_response().body["error"], "invalid_grant");
}

#[tokio::test]
async fn concurrent_exchanges_have_one_winner() {
    let engine = engine();
    let code = engine
        .authorize(Platform::GoogleAds, &authorize_request(Platform::GoogleAds, "https://www.googleapis.com/auth/adwords"))
        .await
        .unwrap()
        .code;

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = engine.clone();
        let request = code_request(Platform::GoogleAds, &code);
        handles.push(tokio::spawn(async move { engine.exchange(Platform::GoogleAds, &request).await }));
    }
    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => winners += 1,
            Err(err) => assert!(matches!(err, ApiError::InvalidGrant { .. })),
        }
    }
    assert_eq!(winners, 1);
}

#[tokio::test]
async fn refresh_tokens_rotate() {
    let engine = engine();
    let code = engine
        .authorize(Platform::LinkedIn, &authorize_request(Platform::LinkedIn, "r_ads rw_ads"))
        .await
        .unwrap()
        .code;
    let first = engine
        .exchange(Platform::LinkedIn, &code_request(Platform::LinkedIn, &code))
        .await
        .unwrap();
    let r1 = first.refresh_token.unwrap();
    assert_eq!(first.refresh_token_expires_in, Some(31_536_000));

    let second = engine
        .exchange(Platform::LinkedIn, &refresh_request(Platform::LinkedIn, &r1))
        .await
        .unwrap();
    let r2 = second.refresh_token.unwrap();
    assert_ne!(r1, r2);
    assert_eq!(second.access_token, first.access_token);

    let reused = engine
        .exchange(Platform::LinkedIn, &refresh_request(Platform::LinkedIn, &r1))
        .await
        .unwrap_err();
    assert!(matches!(reused, ApiError::InvalidGrant { .. }));

    engine
        .exchange(Platform::LinkedIn, &refresh_request(Platform::LinkedIn, &r2))
        .await
        .unwrap();
}

#[tokio::test]
async fn revoked_refresh_token_is_rejected() {
    let engine = engine();
    let code = engine
        .authorize(Platform::TikTok, &authorize_request(Platform::TikTok, "campaign"))
        .await
        .unwrap()
        .code;
    let mut request = code_request(Platform::TikTok, &code);
    request.redirect_uri = None;
    let token = engine.exchange(Platform::TikTok, &request).await.unwrap();
    let refresh = token.refresh_token.unwrap();

    engine.revoke(Platform::TikTok, &refresh).await.unwrap();
    engine.revoke(Platform::TikTok, "never-issued").await.unwrap();
    let err = engine
        .exchange(Platform::TikTok, &refresh_request(Platform::TikTok, &refresh))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidGrant { .. }));
}

#[tokio::test]
async fn client_credentials_issue_no_refresh_token() {
    let engine = engine();
    let credential = ClientCredential::default_for(Platform::TradeDesk);
    let request = TokenRequest {
        grant_type: "client_credentials".to_string(),
        client_id: credential.client_id.clone(),
        client_secret: credential.client_secret.clone(),
        ..Default::default()
    };
    let token = engine.exchange(Platform::TradeDesk, &request).await.unwrap();
    assert_eq!(token.access_token, credential.static_access_token);
    assert_eq!(token.token_type, "TTD-Auth");
    assert!(token.refresh_token.is_none());

    let mut wrong_secret = request.clone();
    wrong_secret.client_secret = Some("guess".to_string());
    let err = engine.exchange(Platform::TradeDesk, &wrong_secret).await.unwrap_err();
    assert_eq!(err, ApiError::InvalidClient);

    let mut code_grant = request;
    code_grant.grant_type = "authorization_code".to_string();
    let err = engine.exchange(Platform::TradeDesk, &code_grant).await.unwrap_err();
    assert!(matches!(err, ApiError::UnsupportedGrantType { .. }));
}

#[tokio::test]
async fn authorize_rejects_bad_requests() {
    let engine = engine();

    let mut request = authorize_request(Platform::Dv360, "https://www.googleapis.com/auth/display-video");
    request.response_type = "token".to_string();
    let err = engine.authorize(Platform::Dv360, &request).await.unwrap_err();
    assert!(matches!(err, ApiError::UnsupportedResponseType { .. }));

    let request = authorize_request(Platform::Dv360, "https://www.googleapis.com/auth/userinfo.email");
    let err = engine.authorize(Platform::Dv360, &request).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidScope { .. }));

    let mut request = authorize_request(Platform::Dv360, "https://www.googleapis.com/auth/display-video");
    request.client_id = "someone-else".to_string();
    let err = engine.authorize(Platform::Dv360, &request).await.unwrap_err();
    assert_eq!(err, ApiError::InvalidClient);
}

#[tokio::test]
async fn redirect_uri_must_match_and_codes_do_not_cross_platforms() {
    let engine = engine();
    let code = engine
        .authorize(Platform::GoogleAds, &authorize_request(Platform::GoogleAds, "adwords"))
        .await
        .unwrap()
        .code;

    let mut mismatched = code_request(Platform::GoogleAds, &code);
    mismatched.redirect_uri = Some("https://evil.example.com/".to_string());
    let err = engine.exchange(Platform::GoogleAds, &mismatched).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidGrant { .. }));

    let mut missing = code_request(Platform::GoogleAds, &code);
    missing.redirect_uri = None;
    let err = engine.exchange(Platform::GoogleAds, &missing).await.unwrap_err();
    assert!(matches!(err, ApiError::InvalidRequest { .. }));

    let err = engine
        .exchange(Platform::Dv360, &code_request(Platform::Dv360, &code))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidGrant { .. }));

    // failed attempts do not burn the code
    engine
        .exchange(Platform::GoogleAds, &code_request(Platform::GoogleAds, &code))
        .await
        .unwrap();
}

#[tokio::test]
async fn expired_codes_are_rejected_under_a_strict_policy() {
    let engine = GrantEngine::with_policy(
        Arc::new(InMemoryCredentialStore::with_defaults()),
        Arc::new(InMemoryGrantStore::new()),
        ExpiryPolicy { code_ttl: Some(chrono::Duration::zero()), refresh_ttl: None },
    );
    let code = engine
        .authorize(Platform::Meta, &authorize_request(Platform::Meta, "ads_read"))
        .await
        .unwrap()
        .code;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let err = engine
        .exchange(Platform::Meta, &code_request(Platform::Meta, &code))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidGrant { ref reason } if reason.contains("expired")));
}

#[tokio::test]
async fn limits_beyond_the_calendar_never_expire() {
    let far = chrono::Duration::try_seconds(10_000_000_000_000).unwrap();
    let engine = GrantEngine::with_policy(
        Arc::new(InMemoryCredentialStore::with_defaults()),
        Arc::new(InMemoryGrantStore::new()),
        ExpiryPolicy { code_ttl: Some(far), refresh_ttl: Some(far) },
    );
    let code = engine
        .authorize(Platform::Meta, &authorize_request(Platform::Meta, "ads_read"))
        .await
        .unwrap()
        .code;
    let issued = engine
        .exchange(Platform::Meta, &code_request(Platform::Meta, &code))
        .await
        .unwrap();
    let refresh = issued.refresh_token.unwrap();
    let rotated = engine
        .exchange(Platform::Meta, &refresh_request(Platform::Meta, &refresh))
        .await
        .unwrap();
    assert_eq!(rotated.access_token, "meta-static-access-token");
}

#[tokio::test]
async fn authentication_boundary() {
    let engine = engine();
    let header = |value| PresentedCredential { header: Some(value), query: None };

    let context = engine
        .authenticate(Platform::Meta, header("Bearer meta-static-access-token"))
        .await
        .unwrap();
    assert_eq!(context.client_id, "meta-test-client");

    let via_query = PresentedCredential { header: None, query: Some("meta-static-access-token") };
    engine.authenticate(Platform::Meta, via_query).await.unwrap();

    let cases = [
        (PresentedCredential::default(), AuthFailure::Missing),
        (header("Bearer "), AuthFailure::Empty),
        (header("Bearer wrong"), AuthFailure::Invalid),
        (header("Token meta-static-access-token"), AuthFailure::MalformedScheme),
    ];
    for (presented, expected) in cases {
        let err = engine.authenticate(Platform::Meta, presented).await.unwrap_err();
        assert_eq!(err, ApiError::unauthenticated(expected), "{:?}", presented);
        assert_eq!(err.status(), 401);
    }

    // raw header platforms take the token as-is
    engine
        .authenticate(Platform::TikTok, header("tiktok-static-access-token"))
        .await
        .unwrap();
    let err = engine
        .authenticate(Platform::TikTok, header("meta-static-access-token"))
        .await
        .unwrap_err();
    assert_eq!(err, ApiError::unauthenticated(AuthFailure::Invalid));
}

#[tokio::test]
async fn reset_forgets_outstanding_codes() {
    let engine = engine();
    let code = engine
        .authorize(Platform::Meta, &authorize_request(Platform::Meta, "ads_read"))
        .await
        .unwrap()
        .code;
    engine.reset().await.unwrap();
    let err = engine
        .exchange(Platform::Meta, &code_request(Platform::Meta, &code))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidGrant { .. }));
}
