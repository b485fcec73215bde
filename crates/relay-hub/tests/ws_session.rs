//! End-to-end session tests: a real engine on a loopback port, driven by
//! real WebSocket clients and the HTTP facade.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use relay_core::SwitchId;
use relay_db::{Database, DbConfig};
use relay_hub::{CommandPayload, EngineHandle, HubConfig, HubEngine, ServerMessage};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_engine() -> EngineHandle {
    let mut config = HubConfig::default();
    config.server.port = 0;
    config.server.bind_addr = "127.0.0.1".to_string();

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    HubEngine::new(config).start(db).await.unwrap()
}

async fn connect(handle: &EngineHandle) -> WsClient {
    let url = format!("ws://{}/ws", handle.local_addr());
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

/// Reads frames until the next protocol message, with a timeout.
async fn next_message(ws: &mut WsClient) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("connection closed unexpectedly")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return ServerMessage::from_json(text.as_str()).unwrap(),
            _ => continue,
        }
    }
}

async fn send_json(ws: &mut WsClient, json: &str) {
    ws.send(Message::Text(json.to_string().into())).await.unwrap();
}

#[tokio::test]
async fn full_session_round_trip() {
    let handle = start_engine().await;

    // An app connects and starts from a full snapshot, hardware offline.
    let mut app = connect(&handle).await;
    match next_message(&mut app).await {
        ServerMessage::FullState(doc) => assert!(!doc.hardware_online),
        other => panic!("expected FullState on connect, got {:?}", other),
    }

    // Toggling while no hardware is attached: ERROR plus a resync, no
    // state change.
    send_json(
        &mut app,
        r#"{"type":"TOGGLE_SWITCH","data":{"switchId":"switch1","value":true}}"#,
    )
    .await;
    assert!(matches!(
        next_message(&mut app).await,
        ServerMessage::Error { .. }
    ));
    match next_message(&mut app).await {
        ServerMessage::FullState(doc) => {
            assert_eq!(doc.switches[&SwitchId::Switch1], false);
        }
        other => panic!("expected FullState resync, got {:?}", other),
    }

    // The hardware controller connects and identifies.
    let mut hardware = connect(&handle).await;
    assert!(matches!(
        next_message(&mut hardware).await,
        ServerMessage::FullState(_)
    ));
    send_json(
        &mut hardware,
        r#"{
            "type": "IDENTIFY",
            "role": "hardware",
            "data": { "physical": { "switch3": true } }
        }"#,
    )
    .await;

    // Everyone hears that the hardware came online.
    for ws in [&mut app, &mut hardware] {
        match next_message(ws).await {
            ServerMessage::FullState(doc) => {
                assert!(doc.hardware_online);
                assert_eq!(doc.physical[&SwitchId::Switch3], true);
            }
            other => panic!("expected FullState broadcast, got {:?}", other),
        }
    }

    // Now the same toggle succeeds: COMMAND first, then the new state.
    send_json(
        &mut app,
        r#"{"type":"TOGGLE_SWITCH","data":{"switchId":"switch1","value":true}}"#,
    )
    .await;
    for ws in [&mut app, &mut hardware] {
        assert_eq!(
            next_message(ws).await,
            ServerMessage::Command(CommandPayload::Toggle {
                switch_id: SwitchId::Switch1,
                value: true,
            })
        );
        match next_message(ws).await {
            ServerMessage::StateChanged(doc) => {
                assert_eq!(doc.switches[&SwitchId::Switch1], true);
            }
            other => panic!("expected StateChanged, got {:?}", other),
        }
    }

    // Hardware drops; the app is told the hub lost it.
    hardware.close(None).await.unwrap();
    match next_message(&mut app).await {
        ServerMessage::FullState(doc) => assert!(!doc.hardware_online),
        other => panic!("expected FullState after hardware loss, got {:?}", other),
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn malformed_frames_leave_connection_open() {
    let handle = start_engine().await;

    let mut app = connect(&handle).await;
    assert!(matches!(
        next_message(&mut app).await,
        ServerMessage::FullState(_)
    ));

    // Garbage, an unknown tag, and an unknown switch id: all dropped.
    send_json(&mut app, "{{{{ not json").await;
    send_json(&mut app, r#"{"type":"FORMAT_DISK","data":{}}"#).await;
    send_json(
        &mut app,
        r#"{"type":"TOGGLE_SWITCH","data":{"switchId":"switch9","value":true}}"#,
    )
    .await;

    // The connection still works: a rename comes back as a state broadcast.
    send_json(
        &mut app,
        r#"{"type":"RENAME","data":{"id":"name2","newName":"Fan"}}"#,
    )
    .await;
    match next_message(&mut app).await {
        ServerMessage::StateChanged(doc) => {
            assert_eq!(doc.names[&relay_core::LabelId::Name2], "Fan");
        }
        other => panic!("expected StateChanged, got {:?}", other),
    }

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn http_facade_shares_the_mutation_path() {
    let handle = start_engine().await;
    let base = format!("http://{}", handle.local_addr());
    let http = reqwest::Client::new();

    // Read facade
    let body = http
        .get(format!("{}/api/state", base))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    let doc: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["isHardwareOnline"], serde_json::Value::Bool(false));

    // Write facade skips the liveness gate for a plain switch...
    let response = http
        .post(format!("{}/api/toggle", base))
        .header("content-type", "application/json")
        .body(r#"{"switchId":"switch1","value":true}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = serde_json::from_str(&response.text().await.unwrap()).unwrap();
    assert_eq!(body["success"], serde_json::Value::Bool(true));
    assert_eq!(body["state"]["switches"]["switch1"], serde_json::Value::Bool(true));

    // ...but the physical interlock still applies.
    let response = http
        .post(format!("{}/api/toggle", base))
        .header("content-type", "application/json")
        .body(r#"{"switchId":"switch3","value":true}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Malformed body answers 400.
    let response = http
        .post(format!("{}/api/toggle", base))
        .header("content-type", "application/json")
        .body(r#"{"switchId":"switch9","value":true}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    handle.shutdown().await.unwrap();
}
