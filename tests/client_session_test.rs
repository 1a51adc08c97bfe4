//! App-side session handling: cache, auto-resume, eviction

mod common;

use std::sync::Arc;

use common::{claim, create_john_driver, create_service, PARENT_OF_123, STAFF_BRANCH_1};
use guardian_pickup::client::{
    CredentialCache, FileCredentialCache, GuardianSessionManager, LocalGuardianApi, LoginFailure,
    MemoryCredentialCache, Startup, TokenInput,
};
use guardian_pickup::err::Error;
use guardian_pickup::models::ProfileFields;
use guardian_pickup::SharedService;

fn manager(service: &SharedService, cache: Arc<dyn CredentialCache>) -> GuardianSessionManager {
    GuardianSessionManager::new(Arc::new(LocalGuardianApi::new(service.clone())), cache)
}

/// Test: store then load returns the same triple, clear empties the slot
#[tokio::test]
async fn test_file_cache_round_trip() {
    let service = create_service();
    let card = create_john_driver(&service).await;
    let session = service
        .login(&common::login_with(&card.token))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let slot = dir.path().join("nested").join("guardian.session");
    let cache = FileCredentialCache::new(&slot);
    assert_eq!(cache.path(), slot.as_path());

    assert!(cache.load().await.is_none());
    assert!(
        cache
            .store(&session.guardian, &session.auth_code, &session.student)
            .await
    );

    assert!(slot.exists());
    let loaded = cache.load().await.unwrap();
    assert_eq!(loaded.auth_code, session.auth_code);
    assert_eq!(loaded.guardian, session.guardian);
    assert_eq!(loaded.student, session.student);

    cache.clear().await;
    assert!(cache.load().await.is_none());
    // clearing twice is fine
    cache.clear().await;
    assert!(cache.load().await.is_none());
}

/// Test: a second store replaces the first one completely
#[tokio::test]
async fn test_file_cache_overwrites_slot() {
    let service = create_service();
    let card = create_john_driver(&service).await;
    let first = service
        .login(&common::login_with(&card.token))
        .await
        .unwrap();
    let second = service
        .login(&common::login_with(&card.token))
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let cache = FileCredentialCache::new(dir.path().join("guardian.session"));
    assert!(cache.store(&first.guardian, &first.auth_code, &first.student).await);
    assert!(
        cache
            .store(&second.guardian, &second.auth_code, &second.student)
            .await
    );
    assert_eq!(cache.load().await.unwrap().auth_code, second.auth_code);
}

/// Test: garbage in the slot reads as a miss
#[tokio::test]
async fn test_corrupt_cache_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("guardian.session");
    tokio::fs::write(&path, b"\xff\xfe not postcard").await.unwrap();

    let cache = FileCredentialCache::new(&path);
    assert!(cache.load().await.is_none());
}

/// Test: a cache that cannot be written does not fail the login
#[tokio::test]
async fn test_unwritable_cache_does_not_block_login() {
    let service = create_service();
    let card = create_john_driver(&service).await;

    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    tokio::fs::write(&blocker, b"file").await.unwrap();
    let cache: Arc<dyn CredentialCache> =
        Arc::new(FileCredentialCache::new(blocker.join("guardian.session")));

    let manager = manager(&service, cache.clone());
    let session = manager
        .login(TokenInput::Scanned(card.pickup_url.clone()), claim("fcm"))
        .await
        .unwrap();
    assert!(!session.auth_code.is_empty());
    assert_eq!(manager.start().await, Startup::Login);
}

/// Test: after login the next start resumes without asking again
#[tokio::test]
async fn test_login_then_auto_resume() {
    let service = create_service();
    let card = create_john_driver(&service).await;
    let cache: Arc<dyn CredentialCache> = Arc::new(MemoryCredentialCache::new());
    let manager = manager(&service, cache.clone());

    assert_eq!(manager.start().await, Startup::Login);

    let session = manager
        .login(TokenInput::Scanned(card.pickup_url.clone()), claim("fcm"))
        .await
        .unwrap();

    match manager.start().await {
        Startup::Resume(cached) => {
            assert_eq!(cached.auth_code, session.auth_code);
            assert_eq!(cached.guardian.id, card.guardian.id);
        }
        Startup::Login => panic!("expected to resume"),
    }
}

/// Test: scanned and typed tokens reach the service the same way
#[tokio::test]
async fn test_manual_entry_matches_scanner() {
    let service = create_service();
    let card = create_john_driver(&service).await;
    let manager = manager(&service, Arc::new(MemoryCredentialCache::new()));

    let scanned = TokenInput::Scanned(card.pickup_url.clone());
    let typed = TokenInput::Manual(format!(" {} ", card.token));
    let pasted_link = TokenInput::Manual(card.pickup_url.clone());
    assert_eq!(scanned.token(), typed.token());
    assert_eq!(scanned.token(), pasted_link.token());

    manager.login(typed, claim("")).await.unwrap();
    manager.login(pasted_link, claim("")).await.unwrap();
}

/// Test: every rejection shows the same generic failure
#[tokio::test]
async fn test_rejections_are_generic() {
    let service = create_service();
    let card = create_john_driver(&service).await;
    let manager = manager(&service, Arc::new(MemoryCredentialCache::new()));

    let unknown = manager
        .login(TokenInput::Manual("nonsense".to_string()), claim(""))
        .await
        .unwrap_err();
    assert_eq!(unknown, LoginFailure::Rejected);
    assert!(!unknown.can_retry());

    service
        .deactivate_guardian(PARENT_OF_123, card.guardian.id)
        .await
        .unwrap();
    let inactive = manager
        .login(TokenInput::Scanned(card.pickup_url.clone()), claim(""))
        .await
        .unwrap_err();
    assert_eq!(inactive, LoginFailure::Rejected);
    assert_eq!(inactive.to_string(), unknown.to_string());
}

/// Test: timeouts map to a retryable failure
#[test]
fn test_timeout_is_retryable() {
    let failure = LoginFailure::from(Error::timeout("slow"));
    assert_eq!(failure, LoginFailure::TimedOut);
    assert!(failure.can_retry());
}

/// Test: a guardian deactivated on the server is evicted from the cache
#[tokio::test]
async fn test_stale_cache_is_evicted() {
    let service = create_service();
    let card = create_john_driver(&service).await;
    let cache: Arc<dyn CredentialCache> = Arc::new(MemoryCredentialCache::new());
    let manager = manager(&service, cache.clone());

    manager
        .login(TokenInput::Scanned(card.pickup_url.clone()), claim(""))
        .await
        .unwrap();
    let cached = match manager.start().await {
        Startup::Resume(cached) => cached,
        Startup::Login => panic!("expected to resume"),
    };

    // still fine before deactivation
    manager.refresh(&cached).await.unwrap();
    assert!(cache.load().await.is_some());

    service
        .deactivate_guardian(STAFF_BRANCH_1, card.guardian.id)
        .await
        .unwrap();

    let err = manager.refresh(&cached).await.unwrap_err();
    assert!(matches!(err, Error::AuthError { .. }));
    assert!(cache.load().await.is_none());
    assert_eq!(manager.start().await, Startup::Login);
}

/// Test: profile completion updates the cached guardian
#[tokio::test]
async fn test_profile_completion_updates_cache() {
    let service = create_service();
    let card = create_john_driver(&service).await;
    let cache: Arc<dyn CredentialCache> = Arc::new(MemoryCredentialCache::new());
    let manager = manager(&service, cache.clone());

    let session = manager
        .login(TokenInput::Scanned(card.pickup_url.clone()), claim(""))
        .await
        .unwrap();
    assert!(session.requires_profile_completion);

    let cached = cache.load().await.unwrap();
    let guardian = manager
        .complete_profile(
            &cached,
            &ProfileFields {
                email: Some("x@y.com".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(guardian.profile_completed);
    assert!(cache.load().await.unwrap().guardian.profile_completed);

    let directory = manager.contacts(&cached).await.unwrap();
    assert_eq!(directory.len(), 3);
}

/// Test: logout clears the slot and the server session
#[tokio::test]
async fn test_logout_clears_everything() {
    let service = create_service();
    let card = create_john_driver(&service).await;
    let cache: Arc<dyn CredentialCache> = Arc::new(MemoryCredentialCache::new());
    let manager = manager(&service, cache.clone());

    manager
        .login(TokenInput::Scanned(card.pickup_url.clone()), claim(""))
        .await
        .unwrap();
    let cached = cache.load().await.unwrap();

    manager.logout(&cached).await;
    assert!(cache.load().await.is_none());
    assert!(service.session(&cached.auth_code).await.is_err());

    // logging out again is harmless
    manager.logout(&cached).await;
}
