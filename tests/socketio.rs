mod common;

use std::sync::{Arc, Mutex};

use echo_rs::{Echo, EchoError, EchoOptions};
use serde_json::json;

use common::{FakeTransport, init_tracing, recorder};

fn socket_io(transport: &Arc<FakeTransport>) -> Echo {
    init_tracing();
    Echo::new(
        EchoOptions::new("socket.io")
            .with_auth_header("Authorization", "Bearer token")
            .with_client(transport.clone()),
    )
    .unwrap()
}

#[test]
fn requires_a_client() {
    let err = Echo::new(EchoOptions::new("socket.io")).err().unwrap();

    assert!(matches!(err, EchoError::MissingTransport(_)));
    assert!(err.to_string().contains("Socket.io client not found"));
}

#[test]
fn subscribe_emits_channel_and_auth() {
    let transport = FakeTransport::new();
    let echo = socket_io(&transport);

    echo.private("chat.5").unwrap();
    echo.private("chat.5").unwrap();

    let subscribes = transport.sent_named("subscribe");
    assert_eq!(subscribes.len(), 1);
    assert_eq!(subscribes[0].data["channel"], "private-chat.5");
    assert_eq!(
        subscribes[0].data["auth"]["headers"]["Authorization"],
        "Bearer token"
    );
}

#[test]
fn delivers_namespaced_events() {
    let transport = FakeTransport::new();
    let echo = socket_io(&transport);
    let calls = Arc::new(Mutex::new(Vec::new()));

    echo.channel("orders")
        .unwrap()
        .listen("OrderShipped", recorder(&calls, "shipped"));

    transport.trigger("App.Events.OrderShipped", Some("orders"), json!({ "id": 7 }));

    assert_eq!(*calls.lock().unwrap(), vec![r#"shipped:{"id":7}"#]);
}

#[test]
fn whisper_emits_client_event() {
    let transport = FakeTransport::new();
    let echo = socket_io(&transport);

    echo.private("chat.5").unwrap().whisper("typing", json!(true));

    let emitted = transport.sent_named("client event");
    assert_eq!(emitted.len(), 1);
    assert_eq!(
        emitted[0].data,
        json!({ "channel": "private-chat.5", "event": "client-typing", "data": true })
    );
}

#[test]
fn presence_callbacks_receive_user_info() {
    let transport = FakeTransport::new();
    let echo = socket_io(&transport);
    let calls = Arc::new(Mutex::new(Vec::new()));

    echo.join("room")
        .unwrap()
        .here(recorder(&calls, "here"))
        .joining(recorder(&calls, "joining"))
        .leaving(recorder(&calls, "leaving"));

    transport.trigger(
        "presence:subscribed",
        Some("presence-room"),
        json!([{ "user_id": 1, "user_info": { "name": "Ann" } }]),
    );
    transport.trigger(
        "presence:joining",
        Some("presence-room"),
        json!({ "user_id": 2, "user_info": { "name": "Bob" } }),
    );
    transport.trigger(
        "presence:leaving",
        Some("presence-room"),
        json!({ "user_id": 2, "user_info": { "name": "Bob" } }),
    );

    assert_eq!(
        *calls.lock().unwrap(),
        vec![
            r#"here:[{"name":"Ann"}]"#,
            r#"joining:{"name":"Bob"}"#,
            r#"leaving:{"name":"Bob"}"#,
        ]
    );
}

#[test]
fn subscribed_fires_on_socket_connect() {
    let transport = FakeTransport::new();
    let echo = socket_io(&transport);
    let calls = Arc::new(Mutex::new(Vec::new()));

    echo.channel("orders")
        .unwrap()
        .subscribed(recorder(&calls, "connected"));

    transport.trigger("connect", None, json!(null));

    assert_eq!(*calls.lock().unwrap(), vec!["connected:null"]);
}

#[test]
fn has_no_wildcard_listening() {
    let transport = FakeTransport::new();
    let echo = socket_io(&transport);

    assert!(echo.channel("orders").unwrap().as_listen_to_all().is_none());
}

#[test]
fn leave_emits_unsubscribe() {
    let transport = FakeTransport::new();
    let echo = socket_io(&transport);

    echo.join("room").unwrap();
    echo.leave("room");

    let unsubscribes = transport.sent_named("unsubscribe");
    assert_eq!(unsubscribes.len(), 1);
    assert_eq!(unsubscribes[0].data["channel"], "presence-room");
}
