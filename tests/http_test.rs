//! The guardian routes over a real socket

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{create_service, STAFF_BRANCH_1};
use guardian_pickup::client::{
    CredentialCache, GuardianApi, GuardianSessionManager, HttpGuardianApi, LoginFailure,
    MemoryCredentialCache, TokenInput,
};
use guardian_pickup::device::{self, PushTokenSource};
use guardian_pickup::err::{Error, Maybe, ROUTE_NOT_FOUND};
use guardian_pickup::models::{
    DevicePlatform, IssuedToken, LoginRequest, PickupCard, ProfileFields,
};
use guardian_pickup::{routes, ClientConfig, SharedService};
use serde_json::json;

async fn serve(service: SharedService) -> SocketAddr {
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let server = axum::Server::bind(&addr).serve(routes::router(service).into_make_service());
    let local = server.local_addr();
    tokio::spawn(server);
    local
}

async fn post<T: serde::de::DeserializeOwned>(
    addr: SocketAddr,
    path: &str,
    body: serde_json::Value,
) -> Result<T, Error> {
    let response = reqwest::Client::new()
        .post(format!("http://{}{}", addr, path))
        .json(&body)
        .send()
        .await
        .unwrap();
    response.json::<Maybe<T>>().await.unwrap().into_result()
}

struct SlowPushService;

#[async_trait]
impl PushTokenSource for SlowPushService {
    async fn push_token(&self) -> anyhow::Result<String> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok("late-token".to_string())
    }
}

/// Test: create, login, complete profile, contacts and logout over HTTP
#[tokio::test]
async fn test_guardian_flow_over_http() {
    let addr = serve(create_service()).await;

    let card: PickupCard = post(
        addr,
        "/guardian/create",
        json!({ "student_id": 123, "name": "John Driver", "relation": "driver" }),
    )
    .await
    .unwrap();

    let api = HttpGuardianApi::new(&ClientConfig::new(format!("http://{}/", addr))).unwrap();
    let session = api
        .login(&LoginRequest {
            token: card.token.clone(),
            device: common::claim("fcm-http"),
        })
        .await
        .unwrap();
    assert!(session.requires_profile_completion);
    assert_eq!(session.student.id, 123);

    let guardian = api
        .complete_profile(
            &session.auth_code,
            &ProfileFields {
                email: Some("x@y.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(guardian.profile_completed);

    let updated = api
        .update_profile(
            &session.auth_code,
            &ProfileFields {
                address: Some("1 School Lane".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.email.as_deref(), Some("x@y.com"));

    let directory = api.contacts(&session.auth_code).await.unwrap();
    assert_eq!(directory.len(), 3);
    let head = &directory.heads_of_school[0];
    assert_eq!(head.email.as_deref(), Some("staff1@school.example"));
    assert_eq!(head.title.as_deref(), Some("head of school"));

    let view = api.session(&session.auth_code).await.unwrap();
    assert_eq!(view.guardian.id, card.guardian.id);

    assert!(api.logout(&session.auth_code).await.unwrap().session_removed);
    let err = api.session(&session.auth_code).await.unwrap_err();
    assert!(matches!(err, Error::AuthError { .. }));
}

/// Test: the old token stops working over HTTP once rotated
#[tokio::test]
async fn test_rotation_over_http() {
    let addr = serve(create_service()).await;
    let card: PickupCard = post(
        addr,
        "/guardian/create",
        json!({ "student_id": 123, "name": "John Driver", "relation": "driver" }),
    )
    .await
    .unwrap();

    let rotated: IssuedToken = post(
        addr,
        "/guardian/rotate",
        json!({ "auth_code": STAFF_BRANCH_1, "guardian_id": card.guardian.id }),
    )
    .await
    .unwrap();
    assert_eq!(rotated.guardian_id, card.guardian.id);

    let manager = GuardianSessionManager::new(
        Arc::new(HttpGuardianApi::new(&ClientConfig::new(format!("http://{}", addr))).unwrap()),
        Arc::new(MemoryCredentialCache::new()),
    );
    let failure = manager
        .login(TokenInput::Scanned(card.pickup_url.clone()), common::claim(""))
        .await
        .unwrap_err();
    assert_eq!(failure, LoginFailure::Rejected);

    manager
        .login(TokenInput::Scanned(rotated.pickup_url.clone()), common::claim(""))
        .await
        .unwrap();
}

/// Test: validation errors come back field by field
#[tokio::test]
async fn test_create_validation_over_http() {
    let addr = serve(create_service()).await;
    let err = post::<PickupCard>(addr, "/guardian/create", json!({ "relation": "driver" }))
        .await
        .unwrap_err();
    match err {
        Error::ValidationError { fields } => {
            let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
            assert_eq!(names, vec!["student_id", "name"]);
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

/// Test: a body of the wrong shape is answered inside the envelope
#[tokio::test]
async fn test_malformed_body_is_a_validation_error() {
    let addr = serve(create_service()).await;

    let err = post::<IssuedToken>(
        addr,
        "/guardian/rotate",
        json!({ "auth_code": STAFF_BRANCH_1, "guardian_id": "not-a-uuid" }),
    )
    .await
    .unwrap_err();
    match err {
        Error::ValidationError { fields } => assert_eq!(fields[0].field, "body"),
        other => panic!("expected validation error, got {:?}", other),
    }

    let response = reqwest::Client::new()
        .post(format!("http://{}/guardian/login", addr))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let parsed = response.json::<Maybe<PickupCard>>().await.unwrap();
    assert!(matches!(
        parsed.into_result(),
        Err(Error::ValidationError { .. })
    ));
}

/// Test: unknown paths answer with a route error body
#[tokio::test]
async fn test_unknown_path() {
    let addr = serve(create_service()).await;
    let response = reqwest::Client::new()
        .post(format!("http://{}/guardian/nothing-here", addr))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let err: Error = response.json().await.unwrap();
    match err {
        Error::InternalError { kind, .. } => assert_eq!(kind, ROUTE_NOT_FOUND),
        other => panic!("expected a route error, got {:?}", other),
    }
}

/// Test: a client pointed at the wrong path keeps its cached session
#[tokio::test]
async fn test_unknown_route_keeps_cached_session() {
    let service = create_service();
    let card = common::create_john_driver(&service).await;
    let addr = serve(service).await;

    let cache = Arc::new(MemoryCredentialCache::new());
    let good = GuardianSessionManager::new(
        Arc::new(HttpGuardianApi::new(&ClientConfig::new(format!("http://{}", addr))).unwrap()),
        cache.clone(),
    );
    good.login(TokenInput::Manual(card.token.clone()), common::claim(""))
        .await
        .unwrap();
    let cached = cache.load().await.unwrap();

    let moved = GuardianSessionManager::new(
        Arc::new(
            HttpGuardianApi::new(&ClientConfig::new(format!("http://{}/v2", addr))).unwrap(),
        ),
        cache.clone(),
    );
    let err = moved.refresh(&cached).await.unwrap_err();
    assert!(!err.revokes_session());
    assert!(moved.contacts(&cached).await.is_err());
    assert_eq!(cache.load().await, Some(cached.clone()));

    good.refresh(&cached).await.unwrap();
}

/// Test: a silent server ends in a retryable timeout
#[tokio::test]
async fn test_silent_server_times_out() {
    // accepts connections but never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ClientConfig::new(format!("http://{}", addr));
    config.request_timeout = Duration::from_millis(200);
    let api = HttpGuardianApi::new(&config).unwrap();

    let err = api
        .login(&LoginRequest {
            token: "a".repeat(32),
            device: common::claim(""),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }));

    let manager = GuardianSessionManager::new(
        Arc::new(api),
        Arc::new(MemoryCredentialCache::new()),
    );
    let failure = manager
        .login(TokenInput::Manual("a".repeat(32)), common::claim(""))
        .await
        .unwrap_err();
    assert_eq!(failure, LoginFailure::TimedOut);
    assert!(failure.can_retry());
    drop(listener);
}

/// Test: a push service that never answers does not hold up the login
#[tokio::test]
async fn test_login_goes_ahead_without_push_token() {
    let addr = serve(create_service()).await;
    let card: PickupCard = post(
        addr,
        "/guardian/create",
        json!({ "student_id": 123, "name": "John Driver", "relation": "driver" }),
    )
    .await
    .unwrap();

    let mut config = ClientConfig::new(format!("http://{}", addr));
    config.push_token_timeout = Duration::from_millis(50);

    let claim = device::collect_claim(
        &SlowPushService,
        DevicePlatform::Ios,
        Some("iPhone".to_string()),
        config.push_token_timeout,
    )
    .await;
    assert!(claim.device_token.is_empty());

    let manager = GuardianSessionManager::new(
        Arc::new(HttpGuardianApi::new(&config).unwrap()),
        Arc::new(MemoryCredentialCache::new()),
    );
    let session = manager
        .login(TokenInput::Manual(card.token.clone()), claim)
        .await
        .unwrap();
    assert_eq!(session.guardian.id, card.guardian.id);
}
