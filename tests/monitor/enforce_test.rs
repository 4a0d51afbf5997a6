//! Mode-by-state coverage for blocked-container enforcement.

use portcullis::enforce::{enforce, EnforceMode, EnforcementOutcome};
use portcullis::runtime::RuntimeError;

use super::fake_runtime::{snapshot, FakeRuntime};

#[tokio::test]
async fn strict_mode_stops_then_removes_a_running_container() {
    let runtime = FakeRuntime::new();
    runtime.put_container("c1", snapshot(true, Some("sha256:aa11"), None));

    let outcome = enforce(&runtime, "c1", EnforceMode::Strict)
        .await
        .expect("enforce");

    assert_eq!(outcome, EnforcementOutcome::StoppedAndRemoved);
    assert_eq!(runtime.calls(), vec!["stop:c1", "remove:c1"]);
}

#[tokio::test]
async fn strict_mode_removes_a_stopped_container_directly() {
    let runtime = FakeRuntime::new();
    runtime.put_container("c1", snapshot(false, Some("sha256:aa11"), None));

    let outcome = enforce(&runtime, "c1", EnforceMode::Strict)
        .await
        .expect("enforce");

    assert_eq!(outcome, EnforcementOutcome::Removed);
    assert_eq!(runtime.calls(), vec!["remove:c1"]);
}

#[tokio::test]
async fn safe_mode_stops_a_running_container_without_removing() {
    let runtime = FakeRuntime::new();
    runtime.put_container("c1", snapshot(true, Some("sha256:aa11"), None));

    let outcome = enforce(&runtime, "c1", EnforceMode::Safe)
        .await
        .expect("enforce");

    assert_eq!(outcome, EnforcementOutcome::Stopped);
    assert_eq!(runtime.calls(), vec!["stop:c1"]);
}

#[tokio::test]
async fn safe_mode_leaves_a_stopped_container_in_place() {
    let runtime = FakeRuntime::new();
    runtime.put_container("c1", snapshot(false, Some("sha256:aa11"), None));

    let outcome = enforce(&runtime, "c1", EnforceMode::Safe)
        .await
        .expect("enforce");

    assert_eq!(outcome, EnforcementOutcome::LeftInPlace);
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn a_vanished_container_is_already_gone_not_an_error() {
    let runtime = FakeRuntime::new();

    let outcome = enforce(&runtime, "ghost", EnforceMode::Strict)
        .await
        .expect("enforce");

    assert_eq!(outcome, EnforcementOutcome::AlreadyGone);
    assert!(runtime.calls().is_empty());
}

#[tokio::test]
async fn stop_failure_propagates_and_skips_removal() {
    let runtime = FakeRuntime::new();
    runtime.put_container("c1", snapshot(true, Some("sha256:aa11"), None));
    runtime.fail_stops_for("c1");

    let result = enforce(&runtime, "c1", EnforceMode::Strict).await;

    assert!(matches!(result, Err(RuntimeError::Api(_))));
    assert_eq!(runtime.calls(), vec!["stop:c1"]);
}
