mod common;

use axum::http::StatusCode;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use common::{Call, app, location_params, param};
use serde_json::json;

const REDIRECT: &str = "https%3A%2F%2Fapp.example.com%2Fcallback";

#[tokio::test]
async fn health_lists_every_platform() {
    let reply = Call::get("/health").send(&app()).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["status"], "ok");
    assert_eq!(reply.body["platforms"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn meta_code_flow_redirects_and_exchanges_once() {
    let app = app();
    let reply = Call::get(format!(
        "/meta/dialog/oauth?client_id=meta-test-client&redirect_uri={}&scope=ads_management&state=xyz",
        REDIRECT
    ))
    .send(&app)
    .await;
    assert_eq!(reply.status, StatusCode::FOUND);
    let pairs = location_params(&reply);
    let code = param(&pairs, "code").unwrap().to_string();
    assert!(code.starts_with("AQ"));
    assert_eq!(param(&pairs, "state"), Some("xyz"));

    let exchange = format!(
        "/meta/v19.0/oauth/access_token?client_id=meta-test-client&client_secret=meta-test-secret&redirect_uri={}&code={}",
        REDIRECT, code
    );
    let reply = Call::get(exchange.clone()).send(&app).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["access_token"], "meta-static-access-token");
    assert_eq!(reply.body["token_type"], "bearer");

    let replay = Call::get(exchange).send(&app).await;
    assert_eq!(replay.status, StatusCode::BAD_REQUEST);
    assert_eq!(replay.body["error"], "invalid_grant");
}

#[tokio::test]
async fn meta_token_endpoint_defaults_to_client_credentials() {
    let reply = Call::get("/meta/v19.0/oauth/access_token?client_id=meta-test-client&client_secret=meta-test-secret")
        .send(&app())
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["access_token"], "meta-static-access-token");
    assert!(reply.body.get("refresh_token").is_none());
}

#[tokio::test]
async fn authorize_answers_json_when_asked() {
    let app = app();
    let reply = Call::get(format!(
        "/linkedin/oauth/v2/authorization?client_id=linkedin-test-client&redirect_uri={}&response_type=code&scope=r_ads&state=st",
        REDIRECT
    ))
    .header("accept", "application/json")
    .send(&app)
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.headers.get("location").is_none());
    assert_eq!(reply.body["state"], "st");
    let code = reply.body["code"].as_str().unwrap().to_string();

    let reply = Call::post("/linkedin/oauth/v2/accessToken")
        .form(&format!(
            "grant_type=authorization_code&code={}&redirect_uri={}&client_id=linkedin-test-client&client_secret=linkedin-test-secret",
            code, REDIRECT
        ))
        .send(&app)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["access_token"], "linkedin-static-access-token");

    let reply = Call::get(format!("/tiktok/portal/auth?app_id=tiktok-test-client&redirect_uri={}", REDIRECT))
        .header("accept", "application/json")
        .send(&app)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["code"], 0);
    assert_eq!(reply.body["data"]["auth_code"], reply.body["data"]["code"]);
}

#[tokio::test]
async fn authorize_rejects_unsupported_response_type() {
    let reply = Call::get(format!(
        "/google-ads/o/oauth2/auth?client_id=google_ads-test-client&redirect_uri={}&response_type=token&scope=adwords",
        REDIRECT
    ))
    .send(&app())
    .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["error"], "unsupported_response_type");
}

#[tokio::test]
async fn google_token_endpoint_accepts_basic_client_auth() {
    let app = app();
    let reply = Call::get(format!(
        "/google-ads/o/oauth2/auth?client_id=google_ads-test-client&redirect_uri={}&response_type=code&scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fadwords",
        REDIRECT
    ))
    .send(&app)
    .await;
    assert_eq!(reply.status, StatusCode::FOUND);
    let code = param(&location_params(&reply), "code").unwrap().to_string();
    assert!(code.starts_with("4/0A"));

    let basic = STANDARD.encode("google_ads-test-client:google_ads-test-secret");
    let reply = Call::post("/google-ads/token")
        .header("authorization", &format!("Basic {}", basic))
        .form(&format!(
            "grant_type=authorization_code&code={}&redirect_uri={}",
            code.replace('/', "%2F"),
            REDIRECT
        ))
        .send(&app)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["token_type"], "Bearer");
    assert_eq!(reply.body["expires_in"], 3599);
    let refresh = reply.body["refresh_token"].as_str().unwrap().to_string();
    assert!(refresh.starts_with("1//0g"));

    let reply = Call::post("/google-ads/token")
        .json(json!({
            "grant_type": "refresh_token",
            "refresh_token": refresh,
            "client_id": "google_ads-test-client",
            "client_secret": "google_ads-test-secret",
        }))
        .send(&app)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["access_token"], "google_ads-static-access-token");
}

#[tokio::test]
async fn token_endpoint_reports_bad_secrets_as_invalid_client() {
    let reply = Call::post("/dv360/token")
        .form("grant_type=refresh_token&refresh_token=x&client_id=dv360-test-client&client_secret=nope")
        .send(&app())
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["error"], "invalid_client");
}

#[tokio::test]
async fn tiktok_portal_hands_back_auth_code() {
    let app = app();
    let reply = Call::get(format!(
        "/tiktok/portal/auth?app_id=tiktok-test-client&redirect_uri={}&state=s1",
        REDIRECT
    ))
    .send(&app)
    .await;
    assert_eq!(reply.status, StatusCode::FOUND);
    let pairs = location_params(&reply);
    let code = param(&pairs, "auth_code").unwrap().to_string();
    assert_eq!(param(&pairs, "code"), Some(code.as_str()));
    assert_eq!(param(&pairs, "state"), Some("s1"));

    let request = json!({"app_id": "tiktok-test-client", "secret": "tiktok-test-secret", "auth_code": code});
    let reply = Call::post("/tiktok/open_api/v1.3/oauth2/access_token/")
        .json(request.clone())
        .send(&app)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["code"], 0);
    assert_eq!(reply.body["data"]["access_token"], "tiktok-static-access-token");
    assert_eq!(reply.body["data"]["advertiser_ids"], json!([]));
    let refresh = reply.body["data"]["refresh_token"].as_str().unwrap().to_string();

    let replay = Call::post("/tiktok/open_api/v1.3/oauth2/access_token/")
        .json(request)
        .send(&app)
        .await;
    assert_eq!(replay.status, StatusCode::OK);
    assert_eq!(replay.body["code"], 40102);

    let reply = Call::post("/tiktok/open_api/v1.3/oauth2/refresh_token/")
        .json(json!({"app_id": "tiktok-test-client", "secret": "tiktok-test-secret", "refresh_token": refresh}))
        .send(&app)
        .await;
    assert_eq!(reply.body["code"], 0);
    assert_ne!(reply.body["data"]["refresh_token"], json!(refresh));
}

#[tokio::test]
async fn trade_desk_login_issues_ttd_auth_token() {
    let app = app();
    let reply = Call::post("/ttd/v3/authentication")
        .json(json!({"Login": "trade_desk-test-client", "Password": "wrong"}))
        .send(&app)
        .await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply.body["ErrorCode"], "AuthenticationFailed");

    let reply = Call::post("/ttd/v3/authentication")
        .json(json!({"Login": "trade_desk-test-client", "Password": "trade_desk-test-secret"}))
        .send(&app)
        .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["Token"], "trade_desk-static-access-token");

    let reply = Call::post("/ttd/v3/authentication")
        .json(json!({"Login": "trade_desk-test-client"}))
        .send(&app)
        .await;
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert_eq!(reply.body["ErrorDetails"][0]["Property"], "Password");
}
