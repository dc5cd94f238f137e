//! WebSocket end-to-end tests.
//!
//! Boots the production runtime on an ephemeral port and talks to it with a
//! real tokio-tungstenite client.

use std::time::Duration;

use electron_proto::{
    AutomatedDriverConfig, ChannelMessage, ClientMessage, ServerMessage, SessionRef,
};
use electron_server::{DriverConfig, Server, ServerRuntimeConfig};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(max_connections: usize) -> String {
    let config = ServerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_string(),
        driver: DriverConfig { max_connections, ..DriverConfig::default() },
    };
    let server = Server::bind(config).await.unwrap();
    let url = format!("ws://{}", server.local_addr().unwrap());
    tokio::spawn(server.run());
    url
}

async fn connect(url: &str) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

async fn send(client: &mut Client, message: &ClientMessage) {
    client.send(Message::Text(message.encode().unwrap())).await.unwrap();
}

async fn recv(client: &mut Client) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::decode(&text).unwrap();
        }
    }
}

fn session(id: &str) -> SessionRef {
    SessionRef { session_id: id.to_string() }
}

#[tokio::test]
async fn driver_update_reaches_rider() {
    let url = start_server(100).await;
    let mut driver = connect(&url).await;
    let mut rider = connect(&url).await;

    send(&mut driver, &ClientMessage::RegisterDriver(session("WIRE"))).await;
    let token = match recv(&mut driver).await {
        ServerMessage::DriverToken(grant) => grant.token,
        other => panic!("expected driverToken, got {other:?}"),
    };

    send(&mut rider, &ClientMessage::RegisterRider(session("WIRE"))).await;
    // Give the rider registration a moment to land before the update.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let update = ChannelMessage {
        session_id: Some("WIRE".to_string()),
        driver_token: Some(token),
        volume: 64.0,
        ..ChannelMessage::default()
    };
    send(&mut driver, &ClientMessage::Left(update)).await;

    match recv(&mut rider).await {
        ServerMessage::Left(msg) => {
            assert!(msg.driver_token.is_none());
            assert!((msg.volume - 64.0).abs() < f64::EPSILON);
        },
        other => panic!("expected left, got {other:?}"),
    }
}

#[tokio::test]
async fn malformed_frames_do_not_drop_connection() {
    let url = start_server(100).await;
    let mut client = connect(&url).await;

    client.send(Message::Text("not json".to_string())).await.unwrap();
    client.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    send(&mut client, &ClientMessage::RegisterRider(session("NOPE"))).await;

    assert_eq!(recv(&mut client).await, ServerMessage::RiderRejected);
}

#[tokio::test]
async fn automated_session_starts_over_the_wire() {
    let url = start_server(100).await;
    let mut client = connect(&url).await;

    send(&mut client, &ClientMessage::StartAutomatedSession(AutomatedDriverConfig::default()))
        .await;

    match recv(&mut client).await {
        ServerMessage::AutomatedSessionStarted(grant) => {
            assert!(grant.session_id.starts_with("AUTO"));
        },
        other => panic!("expected automatedSessionStarted, got {other:?}"),
    }
}

#[tokio::test]
async fn connection_over_limit_is_closed() {
    let url = start_server(1).await;
    let _first = connect(&url).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut second = connect(&url).await;

    let frame = tokio::time::timeout(Duration::from_secs(5), second.next()).await.unwrap();
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | None | Some(Err(_))));
}
