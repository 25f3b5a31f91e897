//! End-to-end tests for a clustered deployment: two façades, one shared
//! broker, real listener tasks in between.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::timeout;

use ripple_cluster::MemoryBroker;
use ripple_core::{AckCallback, EmitOptions};
use ripple_server::{Config, OutboundEvent, Server};
use tokio::sync::mpsc;

fn config() -> Config {
    let mut config = Config::default();
    config.cluster.enabled = true;
    // The exporter cannot be installed twice in one test process.
    config.metrics.enabled = false;
    config
}

async fn clustered_server(broker: &MemoryBroker) -> Server {
    Server::clustered(config(), Arc::new(broker.backend()))
        .await
        .expect("server failed to start")
}

async fn expect_event(outbox: &mut mpsc::UnboundedReceiver<OutboundEvent>) -> OutboundEvent {
    timeout(Duration::from_secs(5), outbox.recv())
        .await
        .expect("timed out waiting for event")
        .expect("outbox closed")
}

#[tokio::test]
async fn test_emit_reaches_sessions_on_both_processes() {
    tracing_subscriber::fmt().with_test_writer().try_init().ok();

    let broker = MemoryBroker::new("ripple");
    let server_a = clustered_server(&broker).await;
    let server_b = clustered_server(&broker).await;

    let mut outbox_a = server_a.connect("a", "/");
    server_a.enter_room("a", "/", "game");
    let mut outbox_b = server_b.connect("b", "/");
    server_b.enter_room("b", "/", "game");

    server_a
        .emit(
            "state",
            &json!({"turn": 2}),
            "/",
            EmitOptions::to_room("game"),
            false,
        )
        .await
        .unwrap();

    let got_a = expect_event(&mut outbox_a).await;
    assert_eq!(got_a.event, "state");
    assert_eq!(got_a.data, json!({"turn": 2}));
    let got_b = expect_event(&mut outbox_b).await;
    assert_eq!(got_b.data, json!({"turn": 2}));

    server_a.shutdown().await;
    server_b.shutdown().await;
}

#[tokio::test]
async fn test_acknowledgement_crosses_the_cluster() {
    let broker = MemoryBroker::new("ripple");
    let server_a = clustered_server(&broker).await;
    let server_b = clustered_server(&broker).await;

    let mut outbox_b = server_b.connect("b", "/");

    let fired = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&fired);
    let callback: AckCallback = Arc::new(move |args| {
        assert_eq!(args, json!(["pong"]));
        inner.fetch_add(1, Ordering::SeqCst);
    });

    // Address the session on the other process through its private room.
    server_a
        .emit(
            "ping",
            &json!(null),
            "/",
            EmitOptions::to_room("b").with_callback(callback),
            false,
        )
        .await
        .unwrap();

    let event = expect_event(&mut outbox_b).await;
    let ack_id = event.ack_id.expect("callback emit carries an ack id");

    // The client acknowledges against the process it is connected to.
    server_b.ack("b", "/", ack_id, json!(["pong"]));

    timeout(Duration::from_secs(5), async {
        while fired.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("acknowledgement never reached the emitting process");
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    server_a.shutdown().await;
    server_b.shutdown().await;
}

#[tokio::test]
async fn test_remote_disconnect_tears_down_session_and_outbox() {
    let broker = MemoryBroker::new("ripple");
    let server_a = clustered_server(&broker).await;
    let server_b = clustered_server(&broker).await;

    let mut outbox_b = server_b.connect("b", "/");
    assert!(server_b.is_connected("b", "/"));

    // Process A does not host the session, so the request travels
    // through the shared channel.
    server_a.disconnect("b", "/").await;

    timeout(Duration::from_secs(5), async {
        while server_b.is_connected("b", "/") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("disconnect never applied");

    // The outbox was closed by the disconnect hook.
    assert!(timeout(Duration::from_secs(5), outbox_b.recv())
        .await
        .expect("timed out waiting for outbox close")
        .is_none());

    server_a.shutdown().await;
    server_b.shutdown().await;
}

#[tokio::test]
async fn test_history_records_clustered_emits() {
    let broker = MemoryBroker::new("ripple");
    let server_a = clustered_server(&broker).await;

    let mut outbox = server_a.connect("a", "/");
    server_a.enter_room("a", "/", "chat");
    server_a.enable_history("chat", "/").unwrap();

    server_a
        .emit("msg", &json!("one"), "/", EmitOptions::to_room("chat"), false)
        .await
        .unwrap();
    let _ = expect_event(&mut outbox).await;

    let entries = server_a.history("chat", "/", &Default::default());
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event, "msg");
    assert_eq!(entries[0].data, json!("one"));

    server_a.shutdown().await;
}
