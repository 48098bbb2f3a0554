mod common;

use common::{RecordingModel, deps};
use std::time::Duration;
use switchboard::inbound::gmail::{GmailHookPayload, GmailMessage};
use switchboard::{Config, Switchboard};
use tokio::time::Instant;

fn delivery(account: &str, subject: &str) -> GmailHookPayload {
    GmailHookPayload {
        account: Some(account.to_string()),
        messages: vec![GmailMessage {
            subject: Some(subject.to_string()),
            from: Some("alice@company.com".to_string()),
            ..GmailMessage::default()
        }],
        ..GmailHookPayload::default()
    }
}

fn config() -> Config {
    Config {
        debounce_ms: 500,
        ..Config::default()
    }
}

#[tokio::test(start_paused = true)]
async fn burst_flushes_once_after_quiet_period() {
    let (model, mut calls) = RecordingModel::new(Duration::ZERO);
    let (deps, events) = deps(model);
    let switchboard = Switchboard::new(&config(), deps, events);
    let start = Instant::now();

    assert!(switchboard.enqueue_inbound(delivery("acct1", "first")));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(switchboard.enqueue_inbound(delivery("acct1", "second")));

    let flushed = calls.recv().await.expect("first batch should reach the model");
    let elapsed = flushed.at - start;
    assert!(
        elapsed >= Duration::from_millis(600) && elapsed < Duration::from_millis(650),
        "flushed after {elapsed:?}"
    );
    assert!(flushed.last_user_message.starts_with("New Gmail: 2 message(s)"));
    let first = flushed.last_user_message.find("\"first\"").expect("first item described");
    let second = flushed.last_user_message.find("\"second\"").expect("second item described");
    assert!(first < second, "items must keep enqueue order");

    tokio::time::sleep_until(start + Duration::from_millis(700)).await;
    assert!(switchboard.enqueue_inbound(delivery("acct1", "third")));

    let flushed = calls.recv().await.expect("second batch should reach the model");
    assert!(flushed.at - start >= Duration::from_millis(1200));
    assert!(flushed.last_user_message.starts_with("New Gmail: 1 message(s)"));
    assert!(flushed.last_user_message.contains("\"third\""));
    // Each ingestion turn starts without history.
    assert_eq!(flushed.message_count, 1);

    switchboard.shutdown().await;
    assert!(calls.try_recv().is_err(), "no other flush may happen");
}

#[tokio::test(start_paused = true)]
async fn deliveries_without_account_are_dropped() {
    let (model, mut calls) = RecordingModel::new(Duration::ZERO);
    let (deps, events) = deps(model);
    let switchboard = Switchboard::new(&config(), deps, events);

    assert!(!switchboard.enqueue_inbound(GmailHookPayload::default()));
    tokio::time::sleep(Duration::from_secs(2)).await;

    switchboard.shutdown().await;
    assert!(calls.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn same_account_turns_never_overlap() {
    let (model, mut calls) = RecordingModel::new(Duration::from_secs(1));
    let (deps, events) = deps(model.clone());
    let switchboard = Switchboard::new(&config(), deps, events);
    let start = Instant::now();

    switchboard.enqueue_inbound(delivery("acct1", "first"));
    let first = calls.recv().await.expect("first batch should reach the model");

    // Flushes at 1100ms while the first turn runs until 1500ms.
    tokio::time::sleep_until(start + Duration::from_millis(600)).await;
    switchboard.enqueue_inbound(delivery("acct1", "second"));
    let second = calls.recv().await.expect("second batch should reach the model");

    assert!(second.at - first.at >= Duration::from_secs(1));
    assert_eq!(model.peak(), 1);
    switchboard.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn accounts_share_the_turn_limit() {
    let (model, mut calls) = RecordingModel::new(Duration::from_secs(1));
    let (deps, events) = deps(model.clone());
    let config = Config {
        max_concurrent_turns: 2,
        ..config()
    };
    let switchboard = Switchboard::new(&config, deps, events);

    for account in ["acct1", "acct2", "acct3", "acct4"] {
        switchboard.enqueue_inbound(delivery(account, "hello"));
    }
    for _ in 0..4 {
        calls.recv().await.expect("every account should get a turn");
    }

    assert_eq!(model.peak(), 2);
    switchboard.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_pending_batches() {
    let (model, mut calls) = RecordingModel::new(Duration::ZERO);
    let (deps, events) = deps(model);
    let switchboard = Switchboard::new(&config(), deps, events);

    switchboard.enqueue_inbound(delivery("acct1", "late"));
    switchboard.shutdown().await;

    let flushed = calls.try_recv().expect("pending batch should flush on shutdown");
    assert!(flushed.last_user_message.contains("\"late\""));
}
