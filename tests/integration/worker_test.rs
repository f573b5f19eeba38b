//! Integration tests for the renewal worker and supervisor

use crate::integration::fixtures::{self, MOUNT, ROLE};
use crate::integration::MockVault;
use serde_json::json;
use std::fs;
use vault_cert_agent::{
    HookRunner, HookSpec, IssuanceMetadata, RenewalDecision, Supervisor, TickOutcome, Worker,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

async fn mock_issue_expecting(mock: &MockVault, role: &str, expiration: i64, calls: u64) {
    Mock::given(method("POST"))
        .and(path(MockVault::issue_path(MOUNT, role)))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "data": fixtures::issue_data(json!(expiration)) })),
        )
        .expect(calls)
        .mount(mock.inner())
        .await;
}

#[tokio::test]
async fn test_tick_issues_once_then_skips() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();
    let expiration = fixtures::days_from_now(30);
    mock_issue_expecting(&mock, ROLE, expiration, 1).await;

    let config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::token_auth());
    let worker = Worker::new(config, HookRunner::default());

    match worker.tick().await {
        TickOutcome::Issued(issued) => assert_eq!(issued.expiration, expiration),
        other => panic!("Expected Issued, got {:?}", other),
    }
    assert!(matches!(
        worker.tick().await,
        TickOutcome::Skipped(RenewalDecision::Valid { .. })
    ));
}

#[tokio::test]
async fn test_tick_renews_inside_lead_time() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock_issue_expecting(&mock, ROLE, fixtures::days_from_now(30), 1).await;

    // Two days left, default lead time is three.
    let soon = IssuanceMetadata {
        expiration: fixtures::days_from_now(2),
    };
    fs::write(IssuanceMetadata::path(dir.path()), soon.to_json()).unwrap();

    let config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::token_auth());
    let worker = Worker::new(config, HookRunner::default());
    assert!(matches!(worker.tick().await, TickOutcome::Issued(_)));
}

#[tokio::test]
async fn test_shorter_lead_time_skips() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock_issue_expecting(&mock, ROLE, fixtures::days_from_now(30), 0).await;

    let soon = IssuanceMetadata {
        expiration: fixtures::days_from_now(2),
    };
    fs::write(IssuanceMetadata::path(dir.path()), soon.to_json()).unwrap();

    let mut config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::token_auth());
    config.daemon.renew_before = Some("24h".to_string());
    let worker = Worker::new(config, HookRunner::default());
    assert!(matches!(worker.tick().await, TickOutcome::Skipped(_)));
}

#[tokio::test]
async fn test_corrupt_metadata_triggers_renewal() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();
    let expiration = fixtures::days_from_now(30);
    mock_issue_expecting(&mock, ROLE, expiration, 1).await;

    fs::write(IssuanceMetadata::path(dir.path()), "{\"expiration\": \"never\"").unwrap();

    let config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::token_auth());
    let worker = Worker::new(config, HookRunner::default());
    assert!(matches!(worker.tick().await, TickOutcome::Issued(_)));

    let repaired = IssuanceMetadata::load(dir.path()).await.unwrap();
    assert_eq!(repaired.expiration, expiration);
}

#[tokio::test]
async fn test_failed_attempt_retried_on_next_tick() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .and(path(MockVault::issue_path(MOUNT, ROLE)))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "errors": ["sealed"] })))
        .expect(2)
        .mount(mock.inner())
        .await;

    let config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::token_auth());
    let worker = Worker::new(config, HookRunner::default());

    assert!(matches!(worker.tick().await, TickOutcome::Failed(_)));
    assert!(matches!(worker.tick().await, TickOutcome::Failed(_)));
    assert!(!IssuanceMetadata::path(dir.path()).exists());
}

#[tokio::test]
async fn test_hooks_run_after_issue() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock_issue_expecting(&mock, ROLE, fixtures::days_from_now(30), 1).await;

    let marker = dir.path().join("reloaded");
    let mut config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::token_auth());
    config.hooks.post_issue = vec![
        HookSpec::immediate(format!("test -f {}/cert.pem && touch {}", dir.path().display(), marker.display())),
        HookSpec::immediate("exit 3"),
    ];

    let worker = Worker::new(config, HookRunner::new(1));
    let (_, hooks) = worker.issue_once().await.expect("issue failed");
    assert_eq!(hooks.len(), 2);
    hooks.wait().await;

    assert!(marker.exists());
}

#[tokio::test]
async fn test_hooks_skipped_when_issue_fails() {
    let mock = MockVault::start().await;
    let dir = tempfile::tempdir().unwrap();
    mock.mock_issue_error(MOUNT, ROLE, 500, &["internal error"]).await;

    let marker = dir.path().join("reloaded");
    let mut config = fixtures::tenant("web", &mock.url(), dir.path(), fixtures::token_auth());
    config.hooks.post_issue = vec![HookSpec::immediate(format!("touch {}", marker.display()))];

    let worker = Worker::new(config, HookRunner::default());
    assert!(worker.issue_once().await.is_err());
    assert!(!marker.exists());
}

#[tokio::test]
async fn test_issue_all_stops_at_first_failure() {
    let mock = MockVault::start().await;
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    mock.mock_issue_error(MOUNT, "broken", 403, &["permission denied"]).await;
    mock_issue_expecting(&mock, ROLE, fixtures::days_from_now(30), 0).await;

    let mut broken = fixtures::tenant("broken", &mock.url(), first.path(), fixtures::token_auth());
    broken.pki.role = "broken".to_string();
    let healthy = fixtures::tenant("healthy", &mock.url(), second.path(), fixtures::token_auth());

    let supervisor = Supervisor::new(vec![broken, healthy]);
    assert!(supervisor.issue_all().await.is_err());
    assert!(!IssuanceMetadata::path(second.path()).exists());
}

#[tokio::test]
async fn test_issue_all_then_status() {
    let mock = MockVault::start().await;
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    mock_issue_expecting(&mock, ROLE, fixtures::days_from_now(30), 2).await;

    let supervisor = Supervisor::new(vec![
        fixtures::tenant("a", &mock.url(), a.path(), fixtures::token_auth()),
        fixtures::tenant("b", &mock.url(), b.path(), fixtures::token_auth()),
    ]);
    supervisor.issue_all().await.expect("issue_all failed");

    let status = supervisor.status().await;
    assert_eq!(status.len(), 2);
    for (name, decision) in status {
        assert!(!decision.needs_renewal(), "{name}: {decision}");
    }
}

#[tokio::test]
async fn test_supervisor_runs_workers_concurrently() {
    let mock = MockVault::start().await;
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    mock_issue_expecting(&mock, ROLE, fixtures::days_from_now(30), 2).await;

    let supervisor = Supervisor::new(vec![
        fixtures::tenant("a", &mock.url(), a.path(), fixtures::token_auth()),
        fixtures::tenant("b", &mock.url(), b.path(), fixtures::token_auth()),
    ]);

    // Workers never return; give them time for their first tick.
    let run = tokio::time::timeout(std::time::Duration::from_secs(2), supervisor.run()).await;
    assert!(run.is_err());

    assert!(IssuanceMetadata::path(a.path()).exists());
    assert!(IssuanceMetadata::path(b.path()).exists());
}
