//! Operator alert stream.
//!
//! Each WebSocket session subscribes to the alert hub and receives every
//! high-severity alert as a JSON text frame. Slow sessions skip what they
//! missed rather than holding back the hub.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::audit::Alert;
use crate::http::server::AppState;

pub async fn alerts_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let alerts = state.alerts.subscribe();
    ws.on_upgrade(move |socket| stream_alerts(socket, alerts))
}

async fn stream_alerts(socket: WebSocket, mut alerts: broadcast::Receiver<Alert>) {
    let (mut sender, mut receiver) = socket.split();
    tracing::info!("Operator alert session opened");

    loop {
        tokio::select! {
            alert = alerts.recv() => match alert {
                Ok(alert) => {
                    let text = match serde_json::to_string(&alert) {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to encode alert");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Operator session lagging, alerts skipped");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    tracing::info!("Operator alert session closed");
}
