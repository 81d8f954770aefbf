use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use super::api::AppState;
use super::models::*;

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

/// Board change notifications. Sent only after the change has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    ProjectCreated {
        project: Project,
    },
    ColumnCreated {
        column: Column,
    },
    ColumnMoved {
        column: Column,
    },
    CardCreated {
        card: Card,
    },
    CardUpdated {
        card: Card,
    },
    CardMoved {
        card_id: i64,
        from_column_id: i64,
        from_position: i32,
        to_column_id: i64,
        position: i32,
    },
    CardArchived {
        card: Card,
    },
    CardRestored {
        card: Card,
    },
    CardDeleted {
        card_id: i64,
        column_id: i64,
    },
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, receiver) = socket.split();
    let rx = state.ws_tx.subscribe();
    tracing::debug!("WebSocket client connected");
    run_socket_loop(sender, receiver, rx).await;
    tracing::debug!("WebSocket client disconnected");
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Forwards broadcast events, reads client frames and sends a Ping every
/// [`PING_INTERVAL`]. If no Pong arrives within [`PONG_TIMEOUT`] the
/// connection is considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    tracing::debug!("WebSocket pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Clients refetch the board when they notice a gap.
                        tracing::warn!(skipped, "WebSocket client lagged behind broadcast");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Serialize and broadcast a WsMessage to all connected WebSocket clients.
/// Returns silently even if no clients are connected.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WsMessage");
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> Card {
        Card {
            id: 1,
            column_id: 2,
            title: "Test".to_string(),
            description: "Desc".to_string(),
            position: 0,
            archived: false,
            created_at: "2024-01-01".to_string(),
            updated_at: "2024-01-01".to_string(),
        }
    }

    #[test]
    fn test_card_created_serialization() {
        let msg = WsMessage::CardCreated { card: card() };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"CardCreated\""));
        assert!(json.contains("\"data\""));
        assert!(json.contains("\"title\":\"Test\""));
    }

    #[test]
    fn test_card_moved_roundtrip() {
        let msg = WsMessage::CardMoved {
            card_id: 10,
            from_column_id: 1,
            from_position: 0,
            to_column_id: 2,
            position: 3,
        };
        let json = serde_json::to_string(&msg).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "CardMoved");
        assert_eq!(parsed["data"]["to_column_id"], 2);

        match serde_json::from_str::<WsMessage>(&json).unwrap() {
            WsMessage::CardMoved {
                card_id, position, ..
            } => {
                assert_eq!(card_id, 10);
                assert_eq!(position, 3);
            }
            _ => panic!("Expected CardMoved variant"),
        }
    }

    #[test]
    fn test_column_moved_serialization() {
        let msg = WsMessage::ColumnMoved {
            column: Column {
                id: 4,
                project_id: 1,
                name: "Done".to_string(),
                position: 0,
                created_at: "2024-01-01".to_string(),
            },
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"ColumnMoved\""));
        assert!(json.contains("\"name\":\"Done\""));
    }

    #[tokio::test]
    async fn test_broadcast_channel_delivers_to_subscribers() {
        let (tx, _) = tokio::sync::broadcast::channel::<String>(16);
        let mut rx1 = tx.subscribe();
        let mut rx2 = tx.subscribe();

        broadcast_message(&tx, &WsMessage::CardDeleted { card_id: 1, column_id: 2 });

        let received1 = rx1.recv().await.unwrap();
        let received2 = rx2.recv().await.unwrap();
        assert!(received1.contains("CardDeleted"));
        assert_eq!(received1, received2);
    }

    #[tokio::test]
    async fn test_broadcast_no_receivers_does_not_panic() {
        let (tx, _) = tokio::sync::broadcast::channel::<String>(16);
        broadcast_message(&tx, &WsMessage::CardArchived { card: card() });
    }

    #[test]
    fn test_keepalive_constants() {
        assert!(PONG_TIMEOUT > PING_INTERVAL);
    }
}
