// WebSocket stream of monitor events

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};

use super::AppState;
use crate::coordinator::MonitorEvent;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Subscribes before the upgrade so no event between handshake and first poll is missed.
pub(super) async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let events = state.monitor.subscribe();
    ws.on_upgrade(move |socket| async move {
        match forward_events(socket, events).await {
            Ok(reason) => tracing::info!(reason, "event stream client disconnected"),
            Err(e) => tracing::info!(error = %e, "event stream error"),
        }
    })
}

async fn forward_events(
    mut socket: WebSocket,
    mut events: broadcast::Receiver<MonitorEvent>,
) -> anyhow::Result<&'static str> {
    tracing::info!("client connected to event stream");
    let mut keepalive = interval(WS_PING_INTERVAL);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        let message = tokio::select! {
            received = events.recv() => match received {
                Ok(event) => Message::Text(serde_json::to_string(&event)?.into()),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream client lagged; events dropped");
                    continue;
                }
                Err(RecvError::Closed) => return Ok("monitor closed"),
            },
            _ = keepalive.tick() => Message::Ping(Bytes::new()),
        };
        if !send_timed(&mut socket, message).await {
            return Ok("send failed or timed out");
        }
    }
}

async fn send_timed(socket: &mut WebSocket, message: Message) -> bool {
    matches!(timeout(WS_SEND_TIMEOUT, socket.send(message)).await, Ok(Ok(())))
}
