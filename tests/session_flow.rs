//! End-to-end session tests against a real shell.
//!
//! These spawn the host's actual shell in a PTY, so they depend on the
//! shell printing a prompt that ends in `$` or `#` (the default for
//! bash, dash, and sh, whether or not running as root). Each test waits
//! generously; the session itself has no timeouts by design.

#![cfg(unix)]

use std::time::Duration;

use termhub::{Config, ObserverHandle, Session, SessionEvent, COMMAND_END_SENTINEL};
use tokio::time::{sleep, timeout};

const EVENT_DEADLINE: Duration = Duration::from_secs(20);

fn test_config() -> Config {
    Config {
        workdir: Some(std::env::temp_dir()),
        ..Config::default()
    }
}

/// Let the shell print its startup banner and first prompt before any
/// command is tracked, so a pre-existing prompt cannot finalize a fresh
/// record prematurely.
async fn settle() {
    sleep(Duration::from_millis(1200)).await;
}

/// Collect output chunks until the next `command-completed` event.
async fn drain_until_completed(observer: &mut ObserverHandle) -> (String, String, usize) {
    let mut streamed = String::new();
    loop {
        let event = timeout(EVENT_DEADLINE, observer.recv())
            .await
            .expect("timed out waiting for command completion")
            .expect("broadcast channel closed unexpectedly");
        match event {
            SessionEvent::Output(chunk) => streamed.push_str(&chunk),
            SessionEvent::CommandCompleted {
                command,
                output_length,
                ..
            } => return (streamed, command, output_length),
            _ => {}
        }
    }
}

#[tokio::test]
async fn tracked_command_completes_against_real_shell() {
    let session = Session::new(test_config());
    let mut observer = session.attach().expect("attach should initialize the shell");
    settle().await;

    let ack = session
        .execute_command("echo termhub-e2e")
        .expect("execute should acknowledge");
    assert!(ack.success);
    assert_eq!(ack.command, "echo termhub-e2e");

    let (streamed, command, output_length) = drain_until_completed(&mut observer).await;
    assert_eq!(command, "echo termhub-e2e");
    assert!(
        streamed.contains("termhub-e2e"),
        "broadcast stream should contain the echoed text"
    );

    let record = session.last().expect("history should have the record");
    assert_eq!(record.command, "echo termhub-e2e");
    assert!(record.completed);
    assert!(record.output.ends_with(COMMAND_END_SENTINEL));
    assert_eq!(record.output.len(), output_length);

    session.destroy();
}

#[tokio::test]
async fn history_grows_per_submission_and_clears_atomically() {
    let session = Session::new(test_config());
    let mut observer = session.attach().expect("attach should succeed");
    settle().await;

    session.execute_command("echo first").unwrap();
    drain_until_completed(&mut observer).await;
    session.execute_command("echo second").unwrap();
    drain_until_completed(&mut observer).await;

    let commands: Vec<_> = session
        .history()
        .into_iter()
        .map(|r| r.command)
        .collect();
    assert_eq!(commands, ["echo first", "echo second"]);

    session.clear_history();
    assert!(session.history().is_empty());
    assert!(session.last().is_none());

    session.destroy();
}

#[tokio::test]
async fn observers_attached_before_output_see_identical_streams() {
    let session = Session::new(test_config());
    let mut obs1 = session.attach().expect("first attach");
    let mut obs2 = session.attach().expect("second attach");
    assert_ne!(obs1.session_id(), obs2.session_id());
    settle().await;

    session.execute_command("echo shared-view").unwrap();

    let (stream1, _, _) = drain_until_completed(&mut obs1).await;
    let (stream2, _, _) = drain_until_completed(&mut obs2).await;
    assert_eq!(stream1, stream2);

    session.destroy();
}

#[tokio::test]
async fn destroy_broadcasts_process_exit() {
    let session = Session::new(test_config());
    let mut observer = session.attach().expect("attach should succeed");
    settle().await;

    session.destroy();

    loop {
        let event = timeout(EVENT_DEADLINE, observer.recv())
            .await
            .expect("timed out waiting for process exit")
            .expect("broadcast channel closed unexpectedly");
        if event.is_process_exited() {
            break;
        }
    }
    assert!(!session.is_initialized());
}

#[tokio::test]
async fn raw_keystrokes_bypass_history() {
    let session = Session::new(test_config());
    let mut observer = session.attach().expect("attach should succeed");
    settle().await;

    session.write_input(b"echo untracked\r");

    // The output is broadcast like any other, but no record tracks it.
    let mut saw_untracked = false;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while tokio::time::Instant::now() < deadline {
        match timeout(Duration::from_secs(2), observer.recv()).await {
            Ok(Ok(SessionEvent::Output(chunk))) => {
                if chunk.contains("untracked") {
                    saw_untracked = true;
                    break;
                }
            }
            Ok(Ok(_)) => {}
            Ok(Err(_)) | Err(_) => break,
        }
    }
    assert!(saw_untracked, "untracked output should still be broadcast");
    assert!(session.history().is_empty());

    session.destroy();
}
