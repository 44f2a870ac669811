use super::message::{status_for, IngressResponse};
use super::{router, serve_websocket};
use crate::broker::message::NewMessage;
use crate::broker::{Relay, SubscriberRegistry};
use crate::config::{RelaySettings, Settings};
use crate::persistence::{MessageStore, SequenceId, SledStore};
use crate::utils::error::{Rejection, StoreError};
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tower::ServiceExt;
use tungstenite::protocol::Message as WsMessage;

struct BrokenStore;

impl MessageStore for BrokenStore {
    fn append(&self, _message: &NewMessage) -> Result<SequenceId, StoreError> {
        Err(StoreError::Corrupt("unreadable".to_string()))
    }
}

fn relay(store: Arc<dyn MessageStore>) -> Arc<Relay> {
    let registry = Arc::new(SubscriberRegistry::new(Duration::from_millis(100)));
    Arc::new(Relay::new(store, registry))
}

async fn call(
    relay: Arc<Relay>,
    method: Method,
    uri: &str,
    body: &str,
) -> (StatusCode, IngressResponse) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_owned()))
        .unwrap();
    let response = router(relay).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn hello_body() -> String {
    json!({
        "sender": "device-1",
        "text": "hello",
        "sentAt": 1000,
        "receivedAt": 1005,
        "channelTag": "simA"
    })
    .to_string()
}

#[test]
fn test_status_mapping() {
    assert_eq!(status_for(Rejection::MalformedPayload), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(Rejection::MissingFields), StatusCode::BAD_REQUEST);
    assert_eq!(
        status_for(Rejection::PersistenceFailure),
        StatusCode::INTERNAL_SERVER_ERROR
    );
}

#[tokio::test]
async fn test_post_send_accepts() {
    let relay = relay(Arc::new(SledStore::temporary().unwrap()));
    let (status, body) = call(relay, Method::POST, "/send", &hello_body()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, IngressResponse::accepted(1));
}

#[tokio::test]
async fn test_post_send_missing_fields() {
    let relay = relay(Arc::new(SledStore::temporary().unwrap()));
    let (status, body) = call(relay, Method::POST, "/send", r#"{"text":"hello"}"#).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        IngressResponse::Error {
            error: "missing required fields".to_string()
        }
    );
}

#[tokio::test]
async fn test_post_send_malformed() {
    let relay = relay(Arc::new(SledStore::temporary().unwrap()));
    let (status, body) = call(relay, Method::POST, "/send", "hello there").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, IngressResponse::rejected(Rejection::MalformedPayload));
}

#[tokio::test]
async fn test_post_send_storage_failure() {
    let relay = relay(Arc::new(BrokenStore));
    let (status, body) = call(relay, Method::POST, "/send", &hello_body()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        IngressResponse::Error {
            error: "storage failure".to_string()
        }
    );
}

#[tokio::test]
async fn test_unknown_route_and_method_are_not_found() {
    let relay = relay(Arc::new(SledStore::temporary().unwrap()));

    let (status, body) = call(relay.clone(), Method::GET, "/send", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, IngressResponse::not_found());

    let (status, _) = call(relay, Method::POST, "/messages", &hello_body()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_websocket_subscriber_lifecycle() {
    let registry = Arc::new(SubscriberRegistry::new(Duration::from_millis(200)));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    registry.clone().spawn_event_loop(events_rx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let settings = Settings::default().relay;
    tokio::spawn(serve_websocket(listener, events_tx, settings));

    let (mut ws, _) = connect_async(format!("ws://{addr}"))
        .await
        .expect("WebSocket handshake failed");

    let greeting = ws.next().await.unwrap().unwrap();
    assert_eq!(greeting.to_text().unwrap(), "Connection Established");

    wait_for(|| registry.len() == 1).await;
    let report = registry.broadcast("hello").await;
    assert_eq!(report.delivered, 1);
    let frame = ws.next().await.unwrap().unwrap();
    assert_eq!(frame.to_text().unwrap(), "hello");

    // subscriber-originated text is accepted and ignored
    ws.send(WsMessage::text("status ok")).await.unwrap();

    ws.close(None).await.unwrap();
    wait_for(|| registry.is_empty()).await;
}

async fn start_websocket(settings: RelaySettings) -> (Arc<SubscriberRegistry>, String) {
    let registry = Arc::new(SubscriberRegistry::new(Duration::from_millis(200)));
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    registry.clone().spawn_event_loop(events_rx);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_websocket(listener, events_tx, settings));
    (registry, format!("ws://{addr}"))
}

async fn expect_close<S>(ws: &mut S)
where
    S: StreamExt<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
{
    let next = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("socket was not closed");
    match next {
        Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => {}
        Some(Ok(other)) => panic!("expected close, got {other:?}"),
    }
}

#[tokio::test]
async fn test_websocket_subscriber_limit() {
    let mut settings = Settings::default().relay;
    settings.max_subscribers = 0;
    let (registry, url) = start_websocket(settings).await;

    let (mut ws, _) = connect_async(&url).await.expect("WebSocket handshake failed");

    // no greeting, just a close
    expect_close(&mut ws).await;
    assert!(registry.is_empty());
}

#[tokio::test]
async fn test_websocket_subscriber_limit_counts_live_connections() {
    let mut settings = Settings::default().relay;
    settings.max_subscribers = 1;
    let (registry, url) = start_websocket(settings).await;

    // handshake both before either is registered
    let ((first, _), (second, _)) = tokio::join!(
        async { connect_async(&url).await.expect("first handshake") },
        async { connect_async(&url).await.expect("second handshake") },
    );
    let mut admitted = Vec::new();
    for mut ws in [first, second] {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("no frame from relay");
        match frame {
            Some(Ok(WsMessage::Text(text))) => {
                assert_eq!(text.as_str(), "Connection Established");
                admitted.push(ws);
            }
            Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => {}
            Some(Ok(other)) => panic!("unexpected frame {other:?}"),
        }
    }
    assert_eq!(admitted.len(), 1);
    wait_for(|| registry.len() == 1).await;

    // the slot is released once the admitted subscriber leaves
    let mut ws = admitted.pop().unwrap();
    ws.close(None).await.unwrap();
    wait_for(|| registry.is_empty()).await;

    let (mut third, _) = connect_async(&url).await.expect("third handshake");
    let greeting = third.next().await.unwrap().unwrap();
    assert_eq!(greeting.to_text().unwrap(), "Connection Established");
}

#[tokio::test]
async fn test_evicted_subscriber_socket_is_closed() {
    let (registry, url) = start_websocket(Settings::default().relay).await;
    let (mut ws, _) = connect_async(&url).await.expect("WebSocket handshake failed");
    let greeting = ws.next().await.unwrap().unwrap();
    assert_eq!(greeting.to_text().unwrap(), "Connection Established");
    wait_for(|| registry.len() == 1).await;

    let id = registry.ids().pop().unwrap();
    registry.unregister(&id);

    expect_close(&mut ws).await;
    assert!(!registry.contains(&id));
    let report = registry.broadcast("late").await;
    assert_eq!(report.attempted, 0);
}

async fn wait_for(condition: impl Fn() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 1s");
}
