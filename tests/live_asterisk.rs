//! Integration tests against a live Asterisk instance.
//!
//! These tests require the manager interface on 127.0.0.1:5038 with a user
//! `admin` / `amp111` allowed the `system,call,command,reporting` classes.
//! Run with: cargo test --test live_asterisk -- --ignored

use asterisk_agi_tokio::{ManagerAction, ManagerOptions, ManagerSession, SessionState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const AMI_HOST: &str = "127.0.0.1";
const AMI_PORT: u16 = 5038;
const AMI_USER: &str = "admin";
const AMI_SECRET: &str = "amp111";

async fn connect() -> ManagerSession {
    let options = ManagerOptions::new(AMI_HOST, AMI_USER, AMI_SECRET).with_port(AMI_PORT);
    let mut session = ManagerSession::new(options);
    session
        .connect()
        .await
        .expect("failed to connect to Asterisk");
    session
}

#[tokio::test]
#[ignore]
async fn live_login_and_ping() {
    let mut session = connect().await;
    assert!(session.is_logged_in());
    assert!(session
        .banner()
        .unwrap_or("")
        .starts_with("Asterisk Call Manager"));

    let pong = session
        .send_action("Ping", &[])
        .await
        .unwrap();
    assert!(pong.is_success(), "ping failed: {:?}", pong.message());

    session
        .disconnect()
        .await
        .unwrap();
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
#[ignore]
async fn live_bad_secret_rejected() {
    let options = ManagerOptions::new(AMI_HOST, AMI_USER, "definitely-wrong").with_port(AMI_PORT);
    let mut session = ManagerSession::new(options);
    assert!(session
        .connect()
        .await
        .is_err());
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
#[ignore]
async fn live_command_output() {
    let mut session = connect().await;

    let reply = session
        .send_action("Command", &[("Command", "core show version")])
        .await
        .unwrap();
    let output = reply
        .data()
        .or_else(|| reply.header("Output"))
        .unwrap_or("");
    assert!(output.contains("Asterisk"), "unexpected output: {:?}", reply);

    session
        .disconnect()
        .await
        .unwrap();
}

#[tokio::test]
#[ignore]
async fn live_event_list_and_handlers() {
    let mut session = connect().await;

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    session.register_event_handler("*", move |_, _, _, _| {
        counter.fetch_add(1, Ordering::Relaxed);
    });

    let list = tokio::time::timeout(
        Duration::from_secs(10),
        session.send_request(ManagerAction::new("CoreShowChannels")),
    )
    .await
    .expect("event list never completed")
    .unwrap();

    assert_eq!(list.event_list(), Some("Complete"));
    let items: usize = list
        .header("ListItems")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    assert_eq!(list.events().len(), items);
    assert!(seen.load(Ordering::Relaxed) >= items);

    session
        .disconnect()
        .await
        .unwrap();
}
