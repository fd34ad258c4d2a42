//! Admin alert websocket.

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;

use tradepost_core::UserId;

use crate::middleware::RequireAdmin;
use crate::services::AlertEvent;
use crate::state::AppState;

/// Build the `/admin-alerts` router.
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(connect))
}

/// `GET /admin-alerts`
///
/// Upgrades an admin session to a websocket that streams [`AlertEvent`]s.
pub async fn connect(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_alerts(socket, state, admin.id))
}

/// What to send back for a client frame, if anything.
fn reply_to(message: &Message) -> Option<Message> {
    match message {
        Message::Text(text) if text.as_str().trim() == "ping" => Some(Message::Text("pong".into())),
        _ => None,
    }
}

fn encode(event: &AlertEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode admin alert");
            None
        }
    }
}

#[tracing::instrument(skip(socket, state))]
async fn stream_alerts(socket: WebSocket, state: AppState, admin_id: UserId) {
    let mut alerts = state.alerts().subscribe();
    let (mut sink, mut stream) = socket.split();
    tracing::info!(
        receivers = state.alerts().receiver_count(),
        "Admin alert socket connected"
    );

    loop {
        tokio::select! {
            received = alerts.recv() => match received {
                Ok(event) => {
                    let Some(frame) = encode(&event) else { continue };
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Admin alert socket lagging, alerts dropped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(message)) => {
                    if let Some(reply) = reply_to(&message)
                        && sink.send(reply).await.is_err()
                    {
                        break;
                    }
                }
            },
        }
    }

    tracing::info!("Admin alert socket closed");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use tradepost_core::OrderId;

    #[test]
    fn test_ping_gets_pong() {
        let reply = reply_to(&Message::Text("ping".into())).unwrap();
        assert_eq!(reply, Message::Text("pong".into()));
    }

    #[test]
    fn test_other_text_ignored() {
        assert!(reply_to(&Message::Text("hello".into())).is_none());
        assert!(reply_to(&Message::Binary(vec![1, 2].into())).is_none());
    }

    #[test]
    fn test_alert_frame_shape() {
        let order_id = OrderId::new();
        let frame = encode(&AlertEvent::NewOrder {
            message: "New order placed".to_string(),
            order_id,
            total: Decimal::new(2500, 2),
        })
        .unwrap();

        let Message::Text(text) = frame else {
            panic!("expected a text frame");
        };
        let json: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(json["event"], "newOrder");
        assert_eq!(json["data"]["orderId"], order_id.to_string());
    }
}
