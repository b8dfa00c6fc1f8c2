//! WebSocket stream of engine events
//!
//! `GET /api/v1/events` upgrades to a WebSocket that receives every
//! `EngineEvent` as tagged JSON. `?subject_id=...` restricts the stream to
//! one subject; registry warnings are always delivered.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use safety_tracking::EngineEvent;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct StreamFilter {
    pub subject_id: Option<String>,
}

impl StreamFilter {
    fn accepts(&self, event: &EngineEvent) -> bool {
        match (&self.subject_id, event.subject_id()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }
}

pub async fn events_ws(
    State(state): State<AppState>,
    Query(filter): Query<StreamFilter>,
    ws: WebSocketUpgrade,
) -> Response {
    let events = state.engine.subscribe();
    ws.on_upgrade(move |socket| forward_events(socket, events, filter))
}

async fn forward_events(
    socket: WebSocket,
    mut events: broadcast::Receiver<EngineEvent>,
    filter: StreamFilter,
) {
    let (mut sender, mut receiver) = socket.split();
    debug!(?filter, "Event stream opened");

    loop {
        tokio::select! {
            result = events.recv() => match result {
                Ok(event) if filter.accepts(&event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream client lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!("Event stream closed");
}
