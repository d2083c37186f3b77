use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tracing::{debug, info};

use parley_types::events::{ALIVE, WsEvent};

use crate::registry::{OutboundFrame, Registry};

/// A channel with no inbound frame (including keepalives) for this long is
/// treated as dead and closed.
pub const READ_TIMEOUT: Duration = Duration::from_secs(20);

const CLOSE_GOING_AWAY: u16 = 1001;
const CLOSE_UNSUPPORTED_DATA: u16 = 1003;
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// Drive one pre-authenticated WebSocket until it closes. The session token
/// was already validated at the HTTP upgrade layer; the channel is registered
/// under the (username, token) pair so session revocation can find it.
pub async fn serve(socket: WebSocket, registry: Registry, username: String, token: String) {
    let (mut sink, mut stream) = socket.split();

    let (handle, mut rx) = registry.register(&username, &token).await;
    info!("User '{}' connected to chat gateway", username);

    // Registration is confirmed with a bare "OK" before any events flow.
    if sink
        .send(Message::Text(serde_json::to_string("OK").unwrap().into()))
        .await
        .is_err()
    {
        registry.deregister(&username, &token, handle.id()).await;
        return;
    }

    // Write task: drains the outbound queue. A Close frame (our own read loop
    // or a forced disconnect from the registry) ends it.
    let send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Event(event) => {
                    let text = serde_json::to_string(&event).unwrap();
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close { code, reason } => {
                    let _ = sink
                        .send(Message::Close(Some(CloseFrame {
                            code,
                            reason: reason.into(),
                        })))
                        .await;
                    break;
                }
            }
        }
    });

    // Read loop: clients only send keepalives; everything else closes the
    // channel with a protocol error.
    loop {
        let frame = match tokio::time::timeout(READ_TIMEOUT, stream.next()).await {
            Err(_) => {
                debug!("User '{}' idle past {:?}, closing channel", username, READ_TIMEOUT);
                handle.close(CLOSE_GOING_AWAY, "IDLE_TIMEOUT");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("Transport error on channel of user '{}': {}", username, e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => {
                let Ok(value) = serde_json::from_str::<Value>(&text) else {
                    handle.close(CLOSE_UNSUPPORTED_DATA, "INVALID_JSON");
                    break;
                };
                match serde_json::from_value::<WsEvent>(value) {
                    Ok(incoming) if incoming.data.is_object() => {
                        if incoming.message == "keepalive" {
                            handle.send(WsEvent::empty(ALIVE));
                        } else {
                            handle.close(CLOSE_POLICY_VIOLATION, "SEND_UNSUPPORTED");
                            break;
                        }
                    }
                    _ => {
                        handle.close(CLOSE_POLICY_VIOLATION, "INVALID_DATA");
                        break;
                    }
                }
            }
            Message::Binary(_) => {
                handle.close(CLOSE_POLICY_VIOLATION, "SEND_UNSUPPORTED");
                break;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Drop every sender for this channel so the write task sees the queue
    // end, then let it flush any final close frame.
    let connected_for = Utc::now() - handle.connected_at();
    registry.deregister(&username, &token, handle.id()).await;
    drop(handle);
    let _ = send_task.await;

    info!(
        "User '{}' disconnected from chat gateway after {}s",
        username,
        connected_for.num_seconds()
    );
}
