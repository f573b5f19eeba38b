//! Integration tests for Vault authentication

use crate::integration::fixtures::{self, MOUNT, ROLE};
use crate::integration::{MockVault, TEST_TOKEN};
use serde_json::json;
use vault_cert_agent::error::BackendError;
use vault_cert_agent::{authenticate, issue, AgentError, AuthError, HookRunner, TickOutcome, Worker};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

#[tokio::test]
async fn test_token_auth_sends_token_header() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path(MockVault::issue_path(MOUNT, ROLE)))
        .and(header("X-Vault-Token", TEST_TOKEN))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": fixtures::issue_data(json!(1_900_000_000)) })),
        )
        .expect(1)
        .mount(mock.inner())
        .await;

    let config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::token_auth());
    let session = authenticate(&config.vault).await.expect("token auth needs no round trip");
    assert_eq!(session.token(), Some(TEST_TOKEN));

    let issued = issue(&session, &config).await.expect("issue failed");
    assert_eq!(issued.expiration, 1_900_000_000);
}

#[tokio::test]
async fn test_approle_login_then_issue_with_client_token() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();

    mock.mock_approle_login("role-123", "secret-456", "s.from-approle").await;
    Mock::given(method("POST"))
        .and(path(MockVault::issue_path(MOUNT, ROLE)))
        .and(header("X-Vault-Token", "s.from-approle"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": fixtures::issue_data(json!(1_900_000_000)) })),
        )
        .expect(1)
        .mount(mock.inner())
        .await;

    let config = fixtures::tenant(
        "web",
        &mock.url(),
        dir.path(),
        fixtures::approle_auth("role-123", "secret-456"),
    );
    let session = authenticate(&config.vault).await.expect("approle login failed");
    assert_eq!(session.token(), Some("s.from-approle"));

    issue(&session, &config).await.expect("issue failed");
}

#[tokio::test]
async fn test_approle_rejected() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock.mock_approle_response(400, json!({ "errors": ["invalid role or secret ID"] }))
        .await;

    let config = fixtures::tenant(
        "web",
        &mock.url(),
        dir.path(),
        fixtures::approle_auth("role-123", "wrong"),
    );

    match authenticate(&config.vault).await {
        Err(AuthError::BackendRejected(BackendError::Status { status, errors })) => {
            assert_eq!(status, 400);
            assert_eq!(errors, vec!["invalid role or secret ID".to_string()]);
        }
        other => panic!("Expected BackendRejected, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_approle_without_auth_block_is_malformed() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock.mock_approle_response(200, json!({ "auth": null, "warnings": ["odd"] }))
        .await;

    let config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::approle_auth("r", "s"));
    let result = authenticate(&config.vault).await;
    assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_approle_empty_client_token_is_malformed() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock.mock_approle_response(200, json!({ "auth": { "client_token": "" } }))
        .await;

    let config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::approle_auth("r", "s"));
    let result = authenticate(&config.vault).await;
    assert!(matches!(result, Err(AuthError::MalformedResponse(_))));
}

#[tokio::test]
async fn test_unknown_method_never_reaches_vault() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(mock.inner())
        .await;

    let mut auth = fixtures::token_auth();
    auth.method = "kerberos".to_string();
    let config = fixtures::tenant("web", &mock.url(), dir.path(), auth);

    let worker = Worker::new(config, HookRunner::default());
    match worker.tick().await {
        TickOutcome::Failed(AgentError::Auth(AuthError::UnknownMethod(m))) => {
            assert_eq!(m, "kerberos")
        }
        other => panic!("Expected UnknownMethod failure, got {:?}", other),
    }
    assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_tls_auth_with_unreadable_identity() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();

    let mut auth = fixtures::token_auth();
    auth.method = "tls".to_string();
    auth.tls.cert = Some(dir.path().join("missing.crt"));
    auth.tls.key = Some(dir.path().join("missing.key"));
    let config = fixtures::tenant("web", &mock.url(), dir.path(), auth);

    let result = authenticate(&config.vault).await;
    assert!(matches!(result, Err(AuthError::Tls(_))));
}

#[tokio::test]
async fn test_tls_auth_without_key_is_missing_credential() {
    let dir = tempfile::tempdir().unwrap();

    let mut auth = fixtures::token_auth();
    auth.method = "TLS".to_string();
    auth.tls.cert = Some(dir.path().join("client.crt"));
    let config = fixtures::tenant("web", "https://vault.example.com:8200", dir.path(), auth);

    match authenticate(&config.vault).await {
        Err(AuthError::MissingCredential(field)) => assert_eq!(field, "vault.auth.tls.key"),
        other => panic!("Expected MissingCredential, got {:?}", other.map(|_| ())),
    }
}
