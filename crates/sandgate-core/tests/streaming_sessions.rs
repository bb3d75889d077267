//! End-to-end streaming tests: fan-out, command relays, and teardown.

use std::sync::Arc;
use std::time::Duration;

use sandgate_core::domain::SandboxSpec;
use sandgate_core::fakes::{StaticAuthority, StubEngine};
use sandgate_core::lifecycle::LifecycleManager;
use sandgate_core::streaming::{ErrorScope, SessionEvent, SessionHandle, SessionManager};

async fn running_manager() -> (Arc<SessionManager<StubEngine>>, String) {
    let lifecycle = Arc::new(LifecycleManager::new(StubEngine::new(), "dev-sandbox"));
    let container = lifecycle
        .ensure_running(&SandboxSpec::default())
        .await
        .unwrap();

    let authority = Arc::new(StaticAuthority::new());
    authority.accept("good-token", "dev");

    let manager = Arc::new(SessionManager::new(lifecycle, authority));
    (manager, container.id)
}

async fn next_event(handle: &mut SessionHandle) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(1), handle.events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn no_event_within(handle: &mut SessionHandle, wait: Duration) {
    assert!(
        tokio::time::timeout(wait, handle.events.recv()).await.is_err(),
        "expected silence on the event channel"
    );
}

async fn authed_session(manager: &SessionManager<StubEngine>) -> SessionHandle {
    let mut handle = manager.connect().await;
    manager
        .authenticate(&handle.session_id, "good-token")
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut handle).await,
        SessionEvent::Authenticated { .. }
    ));
    handle
}

async fn subscribed_session(
    manager: &SessionManager<StubEngine>,
    container_id: &str,
) -> SessionHandle {
    let mut handle = authed_session(manager).await;
    manager
        .subscribe(&handle.session_id, container_id)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut handle).await,
        SessionEvent::Subscribed { .. }
    ));
    handle
}

async fn eventually(label: &str, check: impl Fn() -> bool) {
    for _ in 0..50 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{label} not reached within 1s");
}

// -------------------------------------------------------------------------
// Container output fan-out
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_two_sessions_receive_every_chunk_in_order() {
    let (manager, container_id) = running_manager().await;
    let mut alpha = subscribed_session(&manager, &container_id).await;
    let mut beta = subscribed_session(&manager, &container_id).await;

    let engine = manager.lifecycle().engine();
    for line in ["one", "two", "three"] {
        engine.push_output(&container_id, line);
    }

    for handle in [&mut alpha, &mut beta] {
        for expected in ["one", "two", "three"] {
            match next_event(handle).await {
                SessionEvent::ContainerOutput {
                    container_id: tagged,
                    chunk,
                } => {
                    assert_eq!(tagged, container_id);
                    assert_eq!(chunk, expected);
                }
                other => panic!("expected container output, got {other:?}"),
            }
        }
    }

    // One broadcast feed serves both sessions off a single engine attach.
    assert_eq!(manager.feed_count().await, 1);
    assert_eq!(engine.watcher_count(&container_id), 1);
}

#[tokio::test]
async fn test_duplicate_subscription_adds_no_second_relay() {
    let (manager, container_id) = running_manager().await;
    let mut handle = subscribed_session(&manager, &container_id).await;

    manager
        .subscribe(&handle.session_id, &container_id)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut handle).await,
        SessionEvent::Subscribed { .. }
    ));

    manager
        .lifecycle()
        .engine()
        .push_output(&container_id, "once");

    match next_event(&mut handle).await {
        SessionEvent::ContainerOutput { chunk, .. } => assert_eq!(chunk, "once"),
        other => panic!("expected container output, got {other:?}"),
    }
    no_event_within(&mut handle, Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_attach_failure_is_scoped_to_the_subscription() {
    let (manager, container_id) = running_manager().await;
    let mut handle = authed_session(&manager).await;

    manager
        .subscribe(&handle.session_id, "container-gone")
        .await
        .unwrap();
    match next_event(&mut handle).await {
        SessionEvent::Error {
            scope: ErrorScope::Subscription { container_id },
            ..
        } => assert_eq!(container_id, "container-gone"),
        other => panic!("expected subscription error, got {other:?}"),
    }

    // The session survives and can subscribe to the real container.
    manager
        .subscribe(&handle.session_id, &container_id)
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut handle).await,
        SessionEvent::Subscribed { .. }
    ));
}

// -------------------------------------------------------------------------
// Command relays
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_command_output_then_exactly_one_completion() {
    let (manager, container_id) = running_manager().await;
    let mut handle = authed_session(&manager).await;

    let engine = manager.lifecycle().engine();
    engine.queue_exec(&["src", "README.md"], 0);

    let command_id = manager
        .run_command(&handle.session_id, &container_id, "ls")
        .await
        .unwrap()
        .expect("authenticated command returns an id");

    for expected in ["src", "README.md"] {
        match next_event(&mut handle).await {
            SessionEvent::CommandOutput {
                command_id: tagged,
                chunk,
                ..
            } => {
                assert_eq!(tagged, command_id);
                assert_eq!(chunk, expected);
            }
            other => panic!("expected command output, got {other:?}"),
        }
    }

    match next_event(&mut handle).await {
        SessionEvent::CommandCompleted {
            command_id: tagged,
            exit_code,
            ..
        } => {
            assert_eq!(tagged, command_id);
            assert_eq!(exit_code, 0);
        }
        other => panic!("expected completion, got {other:?}"),
    }
    no_event_within(&mut handle, Duration::from_millis(100)).await;

    // The exec really went through `sh -c`.
    let executed = engine.executed();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0], vec!["sh", "-c", "ls"]);
}

#[tokio::test]
async fn test_nonzero_exit_code_reaches_the_client() {
    let (manager, container_id) = running_manager().await;
    let mut handle = authed_session(&manager).await;

    manager.lifecycle().engine().queue_exec(&[], 7);
    manager
        .run_command(&handle.session_id, &container_id, "cat missing.txt")
        .await
        .unwrap();

    match next_event(&mut handle).await {
        SessionEvent::CommandCompleted { exit_code, .. } => assert_eq!(exit_code, 7),
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn test_concurrent_commands_interleave_but_stay_tagged() {
    let (manager, container_id) = running_manager().await;
    let mut handle = authed_session(&manager).await;

    let engine = manager.lifecycle().engine();
    engine.queue_exec(&["first-out"], 0);
    engine.queue_exec(&["second-out"], 1);

    let first = manager
        .run_command(&handle.session_id, &container_id, "echo first")
        .await
        .unwrap()
        .expect("command id");
    let second = manager
        .run_command(&handle.session_id, &container_id, "echo second")
        .await
        .unwrap()
        .expect("command id");

    let mut outputs = std::collections::HashMap::new();
    let mut completions = std::collections::HashMap::new();
    for _ in 0..4 {
        match next_event(&mut handle).await {
            SessionEvent::CommandOutput {
                command_id, chunk, ..
            } => {
                outputs.insert(command_id.clone(), chunk);
                assert!(
                    !completions.contains_key(&command_id),
                    "output after completion"
                );
            }
            SessionEvent::CommandCompleted {
                command_id,
                exit_code,
                ..
            } => {
                completions.insert(command_id, exit_code);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(outputs[&first], "first-out");
    assert_eq!(outputs[&second], "second-out");
    assert_eq!(completions[&first], 0);
    assert_eq!(completions[&second], 1);
}

#[tokio::test]
async fn test_exec_failure_is_scoped_to_the_command() {
    let (manager, container_id) = running_manager().await;
    let mut handle = authed_session(&manager).await;

    let command_id = manager
        .run_command(&handle.session_id, "container-gone", "ls")
        .await
        .unwrap()
        .expect("command id is assigned even on failure");

    match next_event(&mut handle).await {
        SessionEvent::Error {
            scope: ErrorScope::Command { command_id: tagged },
            ..
        } => assert_eq!(tagged, command_id),
        other => panic!("expected command error, got {other:?}"),
    }

    // Unrelated commands on the same session still run.
    manager
        .run_command(&handle.session_id, &container_id, "pwd")
        .await
        .unwrap();
    assert!(matches!(
        next_event(&mut handle).await,
        SessionEvent::CommandCompleted { .. }
    ));
}

#[tokio::test]
async fn test_finished_command_relays_are_reaped() {
    let (manager, container_id) = running_manager().await;
    let mut handle = authed_session(&manager).await;

    for _ in 0..6 {
        manager
            .run_command(&handle.session_id, &container_id, "pwd")
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut handle).await,
            SessionEvent::CommandCompleted { .. }
        ));
    }

    // Starting a relay reaps the finished ones, so a long-lived session
    // tracks at most the live relay plus one straggler, not one per command.
    assert!(manager.relay_count(&handle.session_id).await.unwrap() <= 2);
}

// -------------------------------------------------------------------------
// Teardown
// -------------------------------------------------------------------------

#[tokio::test]
async fn test_disconnect_closes_orphaned_feeds() {
    let (manager, container_id) = running_manager().await;
    let alpha = subscribed_session(&manager, &container_id).await;
    let beta = subscribed_session(&manager, &container_id).await;

    manager.disconnect(&alpha.session_id).await.unwrap();
    assert_eq!(manager.feed_count().await, 1, "beta still watches the feed");

    manager.disconnect(&beta.session_id).await.unwrap();
    assert_eq!(manager.feed_count().await, 0);
    assert_eq!(manager.session_count().await, 0);

    // The aborted pump drops the engine attachment.
    let engine = manager.lifecycle().engine();
    eventually("engine attachment released", || {
        engine.watcher_count(&container_id) == 0
    })
    .await;
}

#[tokio::test]
async fn test_disconnect_only_affects_the_disconnected_session() {
    let (manager, container_id) = running_manager().await;
    let alpha = subscribed_session(&manager, &container_id).await;
    let mut beta = subscribed_session(&manager, &container_id).await;

    manager.disconnect(&alpha.session_id).await.unwrap();

    manager
        .lifecycle()
        .engine()
        .push_output(&container_id, "still-flowing");
    match next_event(&mut beta).await {
        SessionEvent::ContainerOutput { chunk, .. } => assert_eq!(chunk, "still-flowing"),
        other => panic!("expected container output, got {other:?}"),
    }
}

#[tokio::test]
async fn test_disconnecting_an_unknown_session_is_an_error() {
    let (manager, _) = running_manager().await;
    assert!(manager.disconnect("ghost").await.is_err());
}
