//! services/api/src/adapters/change_feed.rs
//!
//! Implements the `ChangeFeed` port on top of Postgres LISTEN/NOTIFY.
//!
//! The update trigger only sends the row id and its new version. The row is
//! re-read here, so every delta carries the full row; the reconciler lays only
//! the latest delta over the snapshot and relies on that.

use crate::adapters::db::DbAdapter;
use async_trait::async_trait;
use futures::stream::BoxStream;
use learning_space_core::ports::{ChangeFeed, LearningSpaceRepository, PortError, PortResult};
use learning_space_core::realtime::{FeedEvent, RealtimeDelta};
use serde::Deserialize;
use serde_json::Value;
use sqlx::postgres::PgListener;
use std::time::Duration;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// The Postgres channel the update trigger notifies.
pub const NOTIFY_CHANNEL: &str = "learning_space_changes";

/// The payload of one notification.
#[derive(Debug, Deserialize, PartialEq)]
pub struct RowChange {
    pub id: Uuid,
    pub version: i64,
}

pub struct PgChangeFeed {
    db: DbAdapter,
    subscribe_timeout: Duration,
}

impl PgChangeFeed {
    pub fn new(db: DbAdapter, subscribe_timeout: Duration) -> Self {
        Self {
            db,
            subscribe_timeout,
        }
    }
}

async fn listen(db: &DbAdapter) -> Result<PgListener, sqlx::Error> {
    let mut listener = PgListener::connect_with(db.pool()).await?;
    listener.listen(NOTIFY_CHANNEL).await?;
    Ok(listener)
}

/// Reads the row and turns it into the field map of a delta.
async fn row_fields(db: &DbAdapter, change: &RowChange) -> PortResult<serde_json::Map<String, Value>> {
    let space = db.get(change.id).await?;
    match serde_json::to_value(space) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err(PortError::Unexpected("row did not serialize to an object".to_string())),
        Err(e) => Err(PortError::Unexpected(e.to_string())),
    }
}

#[async_trait]
impl ChangeFeed for PgChangeFeed {
    async fn subscribe(&self, space_id: Uuid) -> PortResult<BoxStream<'static, FeedEvent>> {
        let db = self.db.clone();
        let subscribe_timeout = self.subscribe_timeout;

        let stream = async_stream::stream! {
            let mut listener = match tokio::time::timeout(subscribe_timeout, listen(&db)).await {
                Ok(Ok(listener)) => listener,
                Ok(Err(e)) => {
                    error!(%space_id, "LISTEN failed: {}", e);
                    yield FeedEvent::ChannelError(Some(e.to_string()));
                    return;
                }
                Err(_) => {
                    yield FeedEvent::TimedOut;
                    return;
                }
            };
            yield FeedEvent::Subscribed;

            loop {
                let notification = match listener.try_recv().await {
                    Ok(Some(notification)) => notification,
                    Ok(None) => {
                        // The connection dropped; the listener reconnects on the next call.
                        warn!(%space_id, "Listener connection lost; reconnecting");
                        continue;
                    }
                    Err(e) => {
                        error!(%space_id, "Listener failed: {}", e);
                        yield FeedEvent::ChannelError(Some(e.to_string()));
                        break;
                    }
                };

                let change = match serde_json::from_str::<RowChange>(notification.payload()) {
                    Ok(change) => change,
                    Err(e) => {
                        warn!("Ignoring malformed notification: {}", e);
                        continue;
                    }
                };
                if change.id != space_id {
                    continue;
                }
                debug!(%space_id, version = change.version, "Row updated");

                match row_fields(&db, &change).await {
                    Ok(fields) => {
                        yield FeedEvent::Update(RealtimeDelta {
                            space_id,
                            version: Some(change.version),
                            fields,
                        });
                    }
                    Err(PortError::NotFound(_)) => {
                        debug!(%space_id, "Row deleted after notification");
                    }
                    Err(e) => warn!(%space_id, "Could not re-read updated row: {}", e),
                }
            }
        };
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_payload_decodes() {
        let id = Uuid::new_v4();
        let payload = format!(r#"{{"id":"{}","version":4}}"#, id);

        let change: RowChange = serde_json::from_str(&payload).unwrap();

        assert_eq!(change, RowChange { id, version: 4 });
    }

    #[test]
    fn notification_without_version_is_rejected() {
        let payload = format!(r#"{{"id":"{}"}}"#, Uuid::new_v4());

        assert!(serde_json::from_str::<RowChange>(&payload).is_err());
    }
}
