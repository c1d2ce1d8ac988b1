//! crates/learning_space_core/src/realtime.rs
//!
//! The client side of the change feed: one subscription per learning-space row,
//! a connection status, and a single most-recent-wins slot for row updates.

use crate::ports::ChangeFeed;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

const CHANNEL_ERROR_DETAILS: &str =
    "Channel subscription failed. Check that the change feed is enabled for learning_space.";
const TIMED_OUT_DETAILS: &str = "Connection timed out. Refresh the page to reconnect.";
const FEED_CLOSED_DETAILS: &str = "The change feed closed the subscription.";

/// The new values of the columns touched by one committed UPDATE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeDelta {
    pub space_id: Uuid,
    /// Row version after the update, when the feed provides one.
    #[serde(default)]
    pub version: Option<i64>,
    pub fields: Map<String, Value>,
}

/// Events a change feed stream yields.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    /// The subscription is acknowledged; updates will follow.
    Subscribed,
    ChannelError(Option<String>),
    TimedOut,
    Update(RealtimeDelta),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    /// Human-readable diagnostic, set only in the error state.
    pub details: Option<String>,
}

impl ConnectionState {
    pub fn connecting() -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            details: None,
        }
    }

    pub fn connected() -> Self {
        Self {
            status: ConnectionStatus::Connected,
            details: None,
        }
    }

    pub fn error(details: impl Into<String>) -> Self {
        Self {
            status: ConnectionStatus::Error,
            details: Some(details.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ConnectionStatus::Error
    }
}

/// What a subscription reports to its listener.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionUpdate {
    Connection(ConnectionState),
    Delta(RealtimeDelta),
}

pub fn channel_name(space_id: Uuid) -> String {
    format!("ls-updates:{}", space_id)
}

/// A live subscription to one row. Dropping it releases the subscription.
pub struct RealtimeSubscription {
    space_id: Uuid,
    state_rx: watch::Receiver<ConnectionState>,
    delta_rx: watch::Receiver<Option<RealtimeDelta>>,
    state_closed: bool,
    delta_closed: bool,
    token: CancellationToken,
}

impl RealtimeSubscription {
    /// Subscribes to UPDATE events for `space_id`.
    ///
    /// A failure to subscribe is not returned: it puts the subscription in the
    /// error state so the caller can keep working from its snapshot.
    pub async fn open(feed: Arc<dyn ChangeFeed>, space_id: Uuid) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::connecting());
        let (delta_tx, delta_rx) = watch::channel(None);
        let token = CancellationToken::new();
        let channel = channel_name(space_id);

        info!(%channel, "Initializing realtime channel");
        match feed.subscribe(space_id).await {
            Ok(stream) => {
                tokio::spawn(pump(stream, state_tx, delta_tx, token.clone(), space_id));
            }
            Err(e) => {
                error!(%channel, "Realtime subscription failed: {}", e);
                state_tx.send_replace(ConnectionState::error(e.to_string()));
            }
        }

        Self {
            space_id,
            state_rx,
            delta_rx,
            state_closed: false,
            delta_closed: false,
            token,
        }
    }

    pub fn space_id(&self) -> Uuid {
        self.space_id
    }

    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Waits for the next status change or row update.
    ///
    /// Updates that arrive while nobody is waiting are not queued: only the
    /// newest one is delivered. Returns `None` once the subscription has ended.
    pub async fn next_update(&mut self) -> Option<SubscriptionUpdate> {
        loop {
            tokio::select! {
                biased;
                changed = self.state_rx.changed(), if !self.state_closed => match changed {
                    Ok(()) => {
                        let state = self.state_rx.borrow_and_update().clone();
                        return Some(SubscriptionUpdate::Connection(state));
                    }
                    Err(_) => self.state_closed = true,
                },
                changed = self.delta_rx.changed(), if !self.delta_closed => match changed {
                    Ok(()) => {
                        if let Some(delta) = self.delta_rx.borrow_and_update().clone() {
                            return Some(SubscriptionUpdate::Delta(delta));
                        }
                    }
                    Err(_) => self.delta_closed = true,
                },
                else => return None,
            }
        }
    }

    /// Releases the subscription.
    pub fn close(self) {
        // Drop does the work.
    }
}

impl Drop for RealtimeSubscription {
    fn drop(&mut self) {
        info!(channel = %channel_name(self.space_id), "Unsubscribing from channel");
        self.token.cancel();
    }
}

async fn pump(
    mut stream: BoxStream<'static, FeedEvent>,
    state_tx: watch::Sender<ConnectionState>,
    delta_tx: watch::Sender<Option<RealtimeDelta>>,
    token: CancellationToken,
    space_id: Uuid,
) {
    let channel = channel_name(space_id);
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            event = stream.next() => match event {
                Some(FeedEvent::Subscribed) => {
                    info!(%channel, "Subscription acknowledged");
                    state_tx.send_replace(ConnectionState::connected());
                }
                Some(FeedEvent::ChannelError(details)) => {
                    let details = details.unwrap_or_else(|| CHANNEL_ERROR_DETAILS.to_string());
                    error!(%channel, "Realtime channel error: {}", details);
                    state_tx.send_replace(ConnectionState::error(details));
                }
                Some(FeedEvent::TimedOut) => {
                    warn!(%channel, "Realtime subscription timed out");
                    state_tx.send_replace(ConnectionState::error(TIMED_OUT_DETAILS));
                }
                Some(FeedEvent::Update(delta)) => {
                    if delta.space_id == space_id {
                        delta_tx.send_replace(Some(delta));
                    } else {
                        warn!(%channel, other = %delta.space_id, "Ignoring update for another row");
                    }
                }
                None => {
                    if !token.is_cancelled() {
                        warn!(%channel, "Change feed stream ended");
                        state_tx.send_replace(ConnectionState::error(FEED_CLOSED_DETAILS));
                    }
                    break;
                }
            }
        }
    }
}
