//! services/api/src/web/live_task.rs
//!
//! Background tasks of an open page: the realtime subscription pump, the
//! one-second generation ticker and the event forwarder to the socket.

use crate::web::protocol::ServerMessage;
use axum::extract::ws::{Message, WebSocket};
use futures::{stream::SplitSink, SinkExt};
use learning_space_core::realtime::{RealtimeSubscription, SubscriptionUpdate};
use learning_space_core::{EventReceiver, SpaceController};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Serializes and sends one message. Returns false once the socket is gone.
pub async fn send_message(ws_sender: &WsSender, message: &ServerMessage) -> bool {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return true;
        }
    };
    ws_sender.lock().await.send(Message::Text(json.into())).await.is_ok()
}

/// Feeds realtime status changes and row updates into the controller.
pub async fn realtime_process(
    controller: Arc<SpaceController>,
    mut subscription: RealtimeSubscription,
    token: CancellationToken,
) {
    controller.set_connection(subscription.state()).await;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            update = subscription.next_update() => match update {
                Some(SubscriptionUpdate::Connection(state)) => controller.set_connection(state).await,
                Some(SubscriptionUpdate::Delta(delta)) => {
                    debug!(space_id = %delta.space_id, version = ?delta.version, "Applying realtime delta");
                    controller.apply_delta(delta).await;
                }
                None => break,
            }
        }
    }
    subscription.close();
}

/// Advances every pending generation timer once per second.
pub async fn ticker_process(controller: Arc<SpaceController>, token: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    // The first tick of an interval completes immediately.
    interval.tick().await;
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => controller.tick().await,
        }
    }
}

/// Forwards session events to the socket until the connection closes.
pub async fn forward_events(mut events: EventReceiver, ws_sender: WsSender, token: CancellationToken) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => {
                    if !send_message(&ws_sender, &ServerMessage::from(event)).await {
                        info!("Socket closed while forwarding events");
                        token.cancel();
                        break;
                    }
                }
                None => break,
            }
        }
    }
}

/// Stops the page's background tasks. Gateway requests already sent keep
/// running to completion; their events land on a closed channel.
pub fn release_tasks(background: Vec<JoinHandle<()>>, requests: Vec<JoinHandle<()>>) {
    for handle in background {
        handle.abort();
    }
    let pending = requests.iter().filter(|handle| !handle.is_finished()).count();
    if pending > 0 {
        debug!(pending, "Leaving in-flight requests to finish after disconnect");
    }
}
