//! Loopback tests for the RPC layer: a scripted WebSocket server on an
//! ephemeral port answering real encoded frames.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use majrpc_client::{Notification, NotificationRouter, RpcClient, RpcError};
use majrpc_protocol::{MessageCodec, ProtocolSchema, WireMessage};
use majrpc_transport::Connection;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

const WAIT: Duration = Duration::from_secs(2);

fn codec() -> MessageCodec {
    let schema = ProtocolSchema::from_value(json!({
        "messages": {
            "Ping": {
                "fields": [
                    { "name": "seq", "tag": 1, "type": "uint" }
                ]
            },
            "Pong": {
                "fields": [
                    { "name": "seq", "tag": 1, "type": "uint" },
                    { "name": "error", "tag": 15, "type": "message",
                      "message": "Error" }
                ]
            },
            "Error": {
                "fields": [
                    { "name": "code", "tag": 1, "type": "uint" },
                    { "name": "message", "tag": 2, "type": "string" }
                ]
            },
            "NotifyRoomMessage": {
                "fields": [
                    { "name": "content", "tag": 1, "type": "string" }
                ]
            }
        },
        "services": {
            "Lobby": {
                "methods": {
                    "ping": { "request": "Ping", "response": "Pong" }
                }
            }
        }
    }))
    .unwrap();
    MessageCodec::new(Arc::new(schema))
}

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn client(url: String, codec: MessageCodec) -> (Arc<Connection>, RpcClient) {
    let conn = Arc::new(Connection::new(url));
    conn.init().await.unwrap();
    let rpc = RpcClient::new(Arc::clone(&conn), codec);
    (conn, rpc)
}

#[tokio::test]
async fn responses_correlate_by_id_not_order() {
    let codec = codec();
    let server_codec = codec.clone();
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Collect both requests, then answer in reverse order, echoing
        // each request's seq back so the caller can tell them apart.
        let mut pending = Vec::new();
        while pending.len() < 2 {
            if let Some(Ok(Message::Binary(data))) = ws.next().await {
                let req = WireMessage::decode(&data).unwrap();
                let args = server_codec.decode_message("Ping", &req.payload).unwrap();
                pending.push((req.id.unwrap(), args["seq"].clone()));
            }
        }
        for (id, seq) in pending.into_iter().rev() {
            let frame = server_codec
                .encode_response(id, "Lobby", "ping", &json!({ "seq": seq }))
                .unwrap();
            ws.send(Message::Binary(frame.into())).await.unwrap();
        }
        while ws.next().await.is_some() {}
    });

    let (_conn, rpc) = client(url, codec).await;
    let (first, second) = tokio::join!(
        rpc.call("Lobby", "ping", json!({ "seq": 11 }), WAIT),
        rpc.call("Lobby", "ping", json!({ "seq": 22 }), WAIT),
    );
    assert_eq!(first.unwrap()["seq"], json!(11));
    assert_eq!(second.unwrap()["seq"], json!(22));
}

#[tokio::test]
async fn duplicate_response_is_ignored() {
    let codec = codec();
    let server_codec = codec.clone();
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(Message::Binary(data))) = ws.next().await {
            let req = WireMessage::decode(&data).unwrap();
            let args = server_codec.decode_message("Ping", &req.payload).unwrap();
            let frame = server_codec
                .encode_response(
                    req.id.unwrap(),
                    "Lobby",
                    "ping",
                    &json!({ "seq": args["seq"] }),
                )
                .unwrap();
            // Answer twice; the second copy must go nowhere.
            ws.send(Message::Binary(frame.clone().into())).await.unwrap();
            ws.send(Message::Binary(frame.into())).await.unwrap();
        }
    });

    let (_conn, rpc) = client(url, codec).await;
    let first = rpc.call("Lobby", "ping", json!({ "seq": 1 }), WAIT).await;
    assert_eq!(first.unwrap()["seq"], json!(1));
    // The client still works after swallowing the duplicate.
    let second = rpc.call("Lobby", "ping", json!({ "seq": 2 }), WAIT).await;
    assert_eq!(second.unwrap()["seq"], json!(2));
}

#[tokio::test]
async fn unanswered_call_times_out() {
    let codec = codec();
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Read and ignore everything.
        while ws.next().await.is_some() {}
    });

    let (_conn, rpc) = client(url, codec).await;
    let err = rpc
        .call("Lobby", "ping", json!({ "seq": 1 }), Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout(_)));
}

#[tokio::test]
async fn error_payload_becomes_a_remote_error() {
    let codec = codec();
    let server_codec = codec.clone();
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        if let Some(Ok(Message::Binary(data))) = ws.next().await {
            let req = WireMessage::decode(&data).unwrap();
            let frame = server_codec
                .encode_response(
                    req.id.unwrap(),
                    "Lobby",
                    "ping",
                    &json!({
                        "error": { "code": 1002, "message": "not signed in" }
                    }),
                )
                .unwrap();
            ws.send(Message::Binary(frame.into())).await.unwrap();
        }
        while ws.next().await.is_some() {}
    });

    let (_conn, rpc) = client(url, codec).await;
    let err = rpc
        .call("Lobby", "ping", json!({ "seq": 1 }), WAIT)
        .await
        .unwrap_err();
    match err {
        RpcError::Remote { code, message } => {
            assert_eq!(code, 1002);
            assert_eq!(message, "not signed in");
        }
        other => panic!("expected remote error, got {other}"),
    }
}

#[tokio::test]
async fn close_rejects_pending_and_later_calls() {
    let codec = codec();
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        // Close as soon as the first request arrives.
        let _ = ws.next().await;
        ws.close(None).await.unwrap();
    });

    let (_conn, rpc) = client(url, codec).await;
    let err = timeout(WAIT, rpc.call("Lobby", "ping", json!({ "seq": 1 }), WAIT))
        .await
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, RpcError::ConnectionClosed));

    // Fail fast from here on, without waiting for any deadline.
    let err = timeout(
        Duration::from_millis(200),
        rpc.call("Lobby", "ping", json!({ "seq": 2 }), WAIT),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert!(matches!(
        err,
        RpcError::ConnectionClosed | RpcError::Transport(_)
    ));
}

#[tokio::test]
async fn unknown_method_fails_before_hitting_the_wire() {
    let codec = codec();
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let (_conn, rpc) = client(url, codec).await;
    let err = rpc
        .call("Lobby", "fetchNothing", json!({}), WAIT)
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Protocol(_)));
}

#[tokio::test]
async fn notifications_fan_out_to_every_subscriber() {
    let codec = codec();
    let server_codec = codec.clone();
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let frame = server_codec
            .encode_notification(
                "NotifyRoomMessage",
                &json!({ "content": "hello" }),
            )
            .unwrap();
        ws.send(Message::Binary(frame.into())).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let conn = Arc::new(Connection::new(url));
    let router = NotificationRouter::new(&conn, codec);
    let mut first = router.subscribe();
    let mut second = router.subscribe();
    conn.init().await.unwrap();

    for rx in [&mut first, &mut second] {
        let Notification { name, data } =
            timeout(WAIT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(name, "NotifyRoomMessage");
        assert_eq!(data["content"], json!("hello"));
    }
}

#[tokio::test]
async fn close_completes_the_notification_stream() {
    let codec = codec();
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while ws.next().await.is_some() {}
    });

    let conn = Arc::new(Connection::new(url));
    let router = NotificationRouter::new(&conn, codec);
    let mut rx = router.subscribe();
    conn.init().await.unwrap();

    conn.close();
    // The stream ends rather than blocking forever.
    let end = timeout(WAIT, rx.recv()).await.unwrap();
    assert!(matches!(end, Err(broadcast::error::RecvError::Closed)));

    // Subscriptions taken after close complete immediately too.
    let mut late = router.subscribe();
    let end = timeout(WAIT, late.recv()).await.unwrap();
    assert!(matches!(end, Err(broadcast::error::RecvError::Closed)));
}
