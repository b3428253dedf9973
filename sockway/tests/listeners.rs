//! Listener chains and link subscriptions.

use serde_json::json;
use sockway::{Ack, Packet, Payload, ServerConfig, handler, testing::CountingHandler};
use std::sync::{Arc, Mutex};

mod common;
use common::{AddressRecorder, Recorder, Terminal, channel, entries, log, started_server};

#[tokio::test]
async fn test_listeners_run_in_order_on_one_context() {
    let (server, transport) = started_server(ServerConfig::default());
    let order = log();
    let addresses = log();
    let ns = server.namespace(None);
    ns.on("message", AddressRecorder { log: addresses.clone() });
    ns.on("message", Recorder { tag: "a", log: order.clone() });
    ns.on("message", AddressRecorder { log: addresses.clone() });
    ns.on("message", Terminal { tag: "b", log: order.clone() });

    let channel = channel(&transport, "/");
    let link = channel.connect("p1").await;
    assert!(link.deliver(Packet::new("message", "hi")).await);

    assert_eq!(
        entries(&order),
        vec![("a", json!("hi")), ("b", json!("hi"))]
    );
    let addresses = entries(&addresses);
    assert_eq!(addresses.len(), 2);
    assert_eq!(addresses[0], addresses[1]);
}

#[tokio::test]
async fn test_listener_acknowledges() {
    let (server, transport) = started_server(ServerConfig::default());
    server.on(
        "ping",
        handler(|ctx, _next| {
            Box::pin(async move {
                ctx.acknowledge("pong");
                Ok(())
            })
        }),
        None,
    );

    let answer: Arc<Mutex<Option<Payload>>> = Arc::new(Mutex::new(None));
    let slot = answer.clone();
    let ack = Ack::new(move |payload| *slot.lock().unwrap() = Some(payload));

    let link = channel(&transport, "/").connect("p1").await;
    link.deliver(Packet::new("ping", Payload::Null).with_ack(ack))
        .await;

    assert_eq!(*answer.lock().unwrap(), Some(json!("pong")));
}

#[tokio::test]
async fn test_listener_emits_to_peer() {
    let (server, transport) = started_server(ServerConfig::default());
    server.on(
        "echo",
        handler(|ctx, _next| {
            Box::pin(async move {
                let data = ctx.data.clone();
                ctx.emit("echo", data);
                Ok(())
            })
        }),
        None,
    );

    let link = channel(&transport, "/").connect("p1").await;
    link.deliver(Packet::new("echo", 42)).await;
    assert_eq!(link.received(), vec![("echo".to_string(), json!(42))]);
}

#[tokio::test]
async fn test_unlistened_events_are_not_delivered() {
    let (server, transport) = started_server(ServerConfig::default());
    let middleware = CountingHandler::new();
    server.middleware(middleware.clone(), None);

    let link = channel(&transport, "/").connect("p1").await;
    assert!(!link.deliver(Packet::new("nobody", 1)).await);

    let connection = server.namespace(None).connection("p1").unwrap();
    connection.dispatch("nobody", json!(1), None).await;
    assert_eq!(middleware.count(), 0);
}

#[tokio::test]
async fn test_subscription_follows_listener_set() {
    let (server, transport) = started_server(ServerConfig::default());
    let ns = server.namespace(None);
    let first = ns.on("message", CountingHandler::new());

    let link = channel(&transport, "/").connect("p1").await;
    assert!(link.is_subscribed("message"));

    let second = ns.on("message", CountingHandler::new());
    assert_eq!(link.subscribe_count("message"), 1);

    ns.off("message", Some(first));
    assert!(link.is_subscribed("message"));
    ns.off("message", Some(second));
    assert!(!link.is_subscribed("message"));
    ns.off("message", Some(second));
    ns.off("message", None);
    assert_eq!(link.unsubscribe_count("message"), 1);
}

#[tokio::test]
async fn test_listener_added_after_connect_is_subscribed() {
    let (server, transport) = started_server(ServerConfig::default());
    let link = channel(&transport, "/").connect("p1").await;
    assert!(!link.is_subscribed("late"));

    let counter = CountingHandler::new();
    server.on("late", counter.clone(), None);
    assert!(link.is_subscribed("late"));
    link.deliver(Packet::new("late", 1)).await;
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_off_all_unsubscribes_everything() {
    let (server, transport) = started_server(ServerConfig::default());
    let ns = server.namespace(None);
    ns.on("a", CountingHandler::new());
    ns.on("b", CountingHandler::new());
    let link = channel(&transport, "/").connect("p1").await;

    ns.off_all();
    assert!(ns.events().is_empty());
    assert!(!link.is_subscribed("a"));
    assert!(!link.is_subscribed("b"));
}

#[tokio::test]
async fn test_connection_listeners_run_after_namespace_listeners() {
    let (server, transport) = started_server(ServerConfig::default());
    let order = log();
    let ns = server.namespace(None);
    ns.on("message", Recorder { tag: "namespace", log: order.clone() });

    let channel = channel(&transport, "/");
    let link = channel.connect("p1").await;
    let other = channel.connect("p2").await;
    let connection = ns.connection("p1").unwrap();
    connection.on("message", Recorder { tag: "local", log: order.clone() });
    connection.on("private", Recorder { tag: "private", log: order.clone() });

    assert!(link.is_subscribed("private"));
    assert!(!other.is_subscribed("private"));

    link.deliver(Packet::new("message", 1)).await;
    link.deliver(Packet::new("private", 2)).await;
    other.deliver(Packet::new("message", 3)).await;
    assert_eq!(
        entries(&order),
        vec![
            ("namespace", json!(1)),
            ("local", json!(1)),
            ("private", json!(2)),
            ("namespace", json!(3)),
        ]
    );

    connection.off("private", None);
    assert!(!link.is_subscribed("private"));
    // Still wanted by the namespace listener.
    connection.off("message", None);
    assert!(link.is_subscribed("message"));
}

#[tokio::test]
async fn test_namespace_off_keeps_locally_wanted_events() {
    let (server, transport) = started_server(ServerConfig::default());
    let ns = server.namespace(None);
    let id = ns.on("message", CountingHandler::new());
    let link = channel(&transport, "/").connect("p1").await;
    ns.connection("p1")
        .unwrap()
        .on("message", CountingHandler::new());

    ns.off("message", Some(id));
    assert!(link.is_subscribed("message"));
    assert_eq!(link.unsubscribe_count("message"), 0);
}

#[tokio::test]
async fn test_connection_and_disconnect_events() {
    let (server, transport) = started_server(ServerConfig::default());
    let events = log();
    let ns = server.namespace(None);
    ns.on("connection", Recorder { tag: "connection", log: events.clone() });
    ns.on("disconnect", Recorder { tag: "disconnect", log: events.clone() });

    let link = channel(&transport, "/").connect("p1").await;
    assert!(!link.is_subscribed("connection"));
    assert!(!link.is_subscribed("disconnect"));
    assert_eq!(ns.connection_count(), 1);

    link.close("transport close").await;
    link.close("transport close").await;
    assert_eq!(ns.connection_count(), 0);
    assert_eq!(
        entries(&events),
        vec![
            ("connection", json!("p1")),
            ("disconnect", json!("transport close")),
        ]
    );
}

#[tokio::test]
async fn test_reserved_events_from_peer_are_dropped() {
    let (server, transport) = started_server(ServerConfig::default());
    let counter = CountingHandler::new();
    server.on("connection", counter.clone(), None);

    channel(&transport, "/").connect("p1").await;
    assert_eq!(counter.count(), 1);

    let connection = server.namespace(None).connection("p1").unwrap();
    connection.receive(Packet::new("connection", "spoofed")).await;
    assert_eq!(counter.count(), 1);
}
