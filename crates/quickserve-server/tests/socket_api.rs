//! The socket surface, driven over a real WebSocket connection.

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn request(socket: &mut Socket, envelope: Value) -> Value {
    socket
        .send(Message::text(envelope.to_string()))
        .await
        .unwrap();
    loop {
        match socket.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            _ => continue,
        }
    }
}

#[tokio::test]
async fn actions_share_the_pipeline() {
    let (addr, shutdown) = common::start("live").await;
    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();

    let user = request(
        &mut socket,
        json!({
            "action": "create_users",
            "body": {"email": "ada@example.com", "password": "hunter2"}
        }),
    )
    .await;
    assert_eq!(user["email"], "ada@example.com");
    assert!(user.get("password").is_none());

    let denied = request(
        &mut socket,
        json!({"action": "create_posts", "body": {"title": "Hi"}}),
    )
    .await;
    assert_eq!(denied["status"], 403);

    let login = request(
        &mut socket,
        json!({
            "action": "system_auth_jwt",
            "body": {"email": "ada@example.com", "password": "hunter2"}
        }),
    )
    .await;
    let token = login["auth"]["accessToken"].as_str().unwrap();

    let post = request(
        &mut socket,
        json!({"action": "create_posts", "params": {"token": token}, "body": {"title": "Hi"}}),
    )
    .await;
    assert_eq!(post["title"], "Hi");

    let posts = request(&mut socket, json!({"action": "list_posts"})).await;
    assert_eq!(posts.as_array().unwrap().len(), 1);

    shutdown.trigger();
}

#[tokio::test]
async fn bad_frames_and_unknown_actions() {
    let (addr, shutdown) = common::start("live").await;
    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .unwrap();

    socket.send(Message::text("not json")).await.unwrap();
    let reply = loop {
        if let Message::Text(text) = socket.next().await.unwrap().unwrap() {
            break serde_json::from_str::<Value>(text.as_str()).unwrap();
        }
    };
    assert_eq!(reply["status"], 400);

    let unknown = request(&mut socket, json!({"action": "dance"})).await;
    assert_eq!(unknown["status"], 404);
    assert_eq!(unknown["code"], "NOT_FOUND");

    shutdown.trigger();
}
