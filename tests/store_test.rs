//! Tests for the store adapter contract, over the in-memory backend and
//! the TCP relay.

use std::time::Duration;

use serde_json::{Map, Value, json};
use tokio::time::timeout;

use gridhunt::Relay;
use gridhunt::store::{MemoryStore, RemoteStore, Store, Subscription};

fn fields(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

/// Next snapshot or panic; subscriptions should never stall in these tests.
async fn next_snapshot(subscription: &mut Subscription) -> Option<Value> {
    timeout(Duration::from_secs(2), subscription.next())
        .await
        .expect("timed out waiting for snapshot")
        .expect("subscription ended")
}

#[tokio::test]
async fn write_then_read_roundtrip() {
    let store = MemoryStore::new();
    store.write("a/b", json!({"x": 1})).await.expect("write");
    let value = store.read_once("a/b").await.expect("read");
    assert_eq!(value, Some(json!({"x": 1})));
}

#[tokio::test]
async fn read_of_absent_path_is_none() {
    let store = MemoryStore::new();
    assert_eq!(store.read_once("nothing/here").await.expect("read"), None);
}

#[tokio::test]
async fn update_merges_fields_and_leaves_siblings() {
    let store = MemoryStore::new();
    store
        .write("node", json!({"x": 1, "y": 2}))
        .await
        .expect("write");
    store
        .update("node", fields(json!({"y": 3, "z": 4})))
        .await
        .expect("update");
    let value = store.read_once("node").await.expect("read");
    assert_eq!(value, Some(json!({"x": 1, "y": 3, "z": 4})));
}

#[tokio::test]
async fn write_replaces_the_whole_value() {
    let store = MemoryStore::new();
    store
        .write("node", json!({"x": 1, "y": 2}))
        .await
        .expect("write");
    store.write("node", json!({"z": 3})).await.expect("write");
    let value = store.read_once("node").await.expect("read");
    assert_eq!(value, Some(json!({"z": 3})));
}

#[tokio::test]
async fn remove_is_idempotent() {
    let store = MemoryStore::new();
    store.write("a/b", json!(1)).await.expect("write");
    store.remove("a/b").await.expect("first remove");
    store.remove("a/b").await.expect("second remove");
    assert_eq!(store.read_once("a/b").await.expect("read"), None);
}

#[tokio::test]
async fn subscribe_delivers_the_current_value_immediately() {
    let store = MemoryStore::new();
    store.write("a", json!("first")).await.expect("write");
    let mut sub = store.subscribe("a").await.expect("subscribe");
    assert_eq!(next_snapshot(&mut sub).await, Some(json!("first")));
}

#[tokio::test]
async fn changes_are_delivered_in_apply_order() {
    let store = MemoryStore::new();
    let mut sub = store.subscribe("a").await.expect("subscribe");
    assert_eq!(next_snapshot(&mut sub).await, None);

    store.write("a", json!(1)).await.expect("write");
    store.write("a", json!(2)).await.expect("write");
    assert_eq!(next_snapshot(&mut sub).await, Some(json!(1)));
    assert_eq!(next_snapshot(&mut sub).await, Some(json!(2)));
}

#[tokio::test]
async fn nested_writes_reach_parent_subscribers() {
    let store = MemoryStore::new();
    let mut sub = store.subscribe("sessions/s1").await.expect("subscribe");
    assert_eq!(next_snapshot(&mut sub).await, None);

    store
        .write("sessions/s1/players/p1", json!({"name": "Ada"}))
        .await
        .expect("write");
    assert_eq!(
        next_snapshot(&mut sub).await,
        Some(json!({"players": {"p1": {"name": "Ada"}}}))
    );
}

#[tokio::test]
async fn unrelated_changes_are_not_delivered() {
    let store = MemoryStore::new();
    let mut sub = store.subscribe("a").await.expect("subscribe");
    assert_eq!(next_snapshot(&mut sub).await, None);

    store.write("b", json!("noise")).await.expect("write");
    store.write("a", json!("signal")).await.expect("write");
    // The write to "b" produced no delivery, so the next snapshot is "a".
    assert_eq!(next_snapshot(&mut sub).await, Some(json!("signal")));
}

#[tokio::test]
async fn removal_is_observed_as_absence() {
    let store = MemoryStore::new();
    store.write("a", json!(1)).await.expect("write");
    let mut sub = store.subscribe("a").await.expect("subscribe");
    assert_eq!(next_snapshot(&mut sub).await, Some(json!(1)));

    store.remove("a").await.expect("remove");
    assert_eq!(next_snapshot(&mut sub).await, None);
}

#[tokio::test]
async fn relay_serves_the_same_contract_over_tcp() {
    let relay = Relay::bind("127.0.0.1:0").await.expect("bind");
    let addr = relay.local_addr().expect("local addr").to_string();
    tokio::spawn(relay.run());

    let writer = RemoteStore::connect(&addr).await.expect("connect writer");
    let observer = RemoteStore::connect(&addr).await.expect("connect observer");

    let mut sub = observer.subscribe("shared").await.expect("subscribe");
    assert_eq!(next_snapshot(&mut sub).await, None);

    writer
        .write("shared", json!({"x": 1}))
        .await
        .expect("write");
    assert_eq!(next_snapshot(&mut sub).await, Some(json!({"x": 1})));

    writer
        .update("shared", fields(json!({"y": 2})))
        .await
        .expect("update");
    assert_eq!(next_snapshot(&mut sub).await, Some(json!({"x": 1, "y": 2})));
    assert_eq!(
        observer.read_once("shared").await.expect("read"),
        Some(json!({"x": 1, "y": 2}))
    );

    writer.remove("shared").await.expect("remove");
    assert_eq!(next_snapshot(&mut sub).await, None);
}
