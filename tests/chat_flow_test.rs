//! Chat flow integration tests
//!
//! Drives the chat hub end to end with in-memory persistence: presence,
//! relay with ack, offline recipients, read receipts and heartbeat reaping.
//!
//! Run: cargo test --test chat_flow_test

use serde_json::json;
use std::time::Duration;

mod harness;
use harness::TestGateway;

fn gateway() -> TestGateway {
    TestGateway::new(&[(1, "alice"), (2, "bob"), (3, "carol")])
}

#[tokio::test]
async fn test_hello_reaches_recipient_and_acks_only_sending_tab() {
    let gw = gateway();
    let mut h1 = gw.connect(1).await;
    let mut h2 = gw.connect(1).await;
    let mut h3 = gw.connect(2).await;
    for c in [&mut h1, &mut h2, &mut h3] {
        c.frames();
    }

    h1.send(json!({
        "type": "message",
        "recipientId": 2,
        "body": "hello",
        "category": "marketplace"
    }))
    .await;

    let pushed = h3.frames();
    assert_eq!(pushed.len(), 1);
    assert_eq!(pushed[0]["type"], "new-message");
    assert_eq!(pushed[0]["body"], "hello");
    assert_eq!(pushed[0]["category"], "marketplace");
    assert_eq!(pushed[0]["senderId"], 1);

    let acks = h1.frames();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0]["type"], "message-sent");
    assert_eq!(acks[0]["id"], pushed[0]["id"]);

    assert!(h2.frames().is_empty());
    assert_eq!(gw.store.messages().len(), 1);
}

#[tokio::test]
async fn test_offline_recipient_gets_message_on_next_fetch() {
    let gw = gateway();
    let mut alice = gw.connect(1).await;
    alice.frames();

    alice
        .send(json!({"type": "message", "recipientId": 3, "body": "ping me later", "category": "community"}))
        .await;

    let acks = alice.frames_of("message-sent");
    assert_eq!(acks.len(), 1);
    let rows = gw.store.messages();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].message.recipient_id, 3);
    assert!(!rows[0].is_read);
}

#[tokio::test]
async fn test_presence_follows_first_and_last_handle() {
    let gw = gateway();
    let mut bob = gw.connect(2).await;
    bob.frames();

    let a1 = gw.connect(1).await;
    let a2 = gw.connect(1).await;
    let online = bob.frames_of("presence");
    assert_eq!(online.len(), 1);
    assert_eq!(online[0]["state"], "online");

    a1.disconnect().await;
    assert!(bob.frames_of("presence").is_empty());

    a2.disconnect().await;
    let offline = bob.frames_of("presence");
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0]["userId"], 1);
    assert_eq!(offline[0]["state"], "offline");
    assert!(!gw.state.registry.is_online(1));
}

#[tokio::test]
async fn test_read_receipt_reaches_every_sender_tab() {
    let gw = gateway();
    let mut a1 = gw.connect(1).await;
    let mut a2 = gw.connect(1).await;
    let mut bob = gw.connect(2).await;

    a1.send(json!({"type": "message", "recipientId": 2, "body": "hi", "category": "dating"}))
        .await;
    let id = bob.frames_of("new-message")[0]["id"].clone();
    a1.frames();
    a2.frames();

    bob.send(json!({"type": "read-receipt", "messageIds": [id]}))
        .await;

    for tab in [&mut a1, &mut a2] {
        let receipts = tab.frames_of("read-receipt");
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0]["readerId"], 2);
        assert_eq!(receipts[0]["messageIds"], json!([id]));
    }
    assert!(gw.store.messages()[0].is_read);
}

#[tokio::test]
async fn test_read_receipt_ignores_claimed_sender() {
    let gw = gateway();
    let mut alice = gw.connect(1).await;
    let mut bob = gw.connect(2).await;
    let mut carol = gw.connect(3).await;

    alice
        .send(json!({"type": "message", "recipientId": 2, "body": "hi", "category": "community"}))
        .await;
    let id = bob.frames_of("new-message")[0]["id"].clone();
    alice.frames();
    carol.frames();

    // bob names carol as the sender of alice's message
    bob.send(json!({"type": "read-receipt", "senderId": 3, "messageIds": [id]}))
        .await;

    let receipts = alice.frames_of("read-receipt");
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0]["messageIds"], json!([id]));
    assert!(carol.frames_of("read-receipt").is_empty());
    assert!(bob.frames_of("read-receipt-failed").is_empty());
}

#[tokio::test]
async fn test_typing_is_forwarded_without_storage() {
    let gw = gateway();
    let alice = gw.connect(1).await;
    let mut bob = gw.connect(2).await;
    bob.frames();

    alice
        .send(json!({"type": "typing", "toUserId": 2, "isTyping": true}))
        .await;
    let typing = bob.frames_of("typing");
    assert_eq!(typing.len(), 1);
    assert_eq!(typing[0]["fromUserId"], 1);
    assert!(gw.store.messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unresponsive_tab_is_reaped_others_survive() {
    let gw = gateway();
    let mut quiet = gw.connect(1).await;
    let mut lively = gw.connect(1).await;
    let mut bob = gw.connect(2).await;
    bob.frames();

    for _ in 0..2 {
        tokio::time::sleep(Duration::from_secs(30)).await;
        tokio::task::yield_now().await;
        lively.handle.record_heartbeat();
        bob.handle.record_heartbeat();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(!quiet.handle.is_alive());
    assert!(lively.handle.is_alive());
    assert_eq!(gw.state.registry.connection_count(1), 1);
    // user 1 still has a live tab, so no offline event
    assert!(bob.frames_of("presence").is_empty());
    assert!(quiet.pings() <= 1);
    assert!(lively.pings() >= 1);
}
