//! crates/learning_space_core/src/controller.rs
//!
//! Drives a `LearningSpaceSession` against the gateway.
//!
//! The session lock is never held across a gateway call, so several widgets
//! can have requests in flight at once. Every state change is published on
//! the event channel handed out by `SpaceController::new`.

use crate::domain::{ContentKind, Language, LearningSpace, SpaceUpdate};
use crate::gateway::{ActionResult, RemoteActionGateway};
use crate::realtime::{ConnectionState, RealtimeDelta};
use crate::session::{LearningSpaceSession, Notice, SessionEvent};
use crate::widget::{GenerationOutcome, WidgetPhase};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

pub struct SpaceController {
    gateway: Arc<RemoteActionGateway>,
    session: Mutex<LearningSpaceSession>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SpaceController {
    pub fn new(
        gateway: Arc<RemoteActionGateway>,
        snapshot: LearningSpace,
        user_id: impl Into<String>,
    ) -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            gateway,
            session: Mutex::new(LearningSpaceSession::new(snapshot, user_id)),
            events,
        };
        (controller, receiver)
    }

    /// Loads the snapshot for a page. Fails when the space is missing or not owned by `user_id`.
    pub async fn open(
        gateway: Arc<RemoteActionGateway>,
        space_id: Uuid,
        user_id: &str,
    ) -> Result<(Self, EventReceiver), String> {
        let snapshot = gateway.get_owned_space(space_id, user_id).await.into_result()?;
        Ok(Self::new(gateway, snapshot, user_id))
    }

    fn publish(&self, events: Vec<SessionEvent>) {
        for event in events {
            // A closed receiver means the page is gone; nothing left to update.
            let _ = self.events.send(event);
        }
    }

    pub async fn space_id(&self) -> Uuid {
        self.session.lock().await.space_id()
    }

    pub async fn rendered(&self) -> LearningSpace {
        self.session.lock().await.rendered().clone()
    }

    pub async fn phase(&self, kind: ContentKind) -> WidgetPhase {
        self.session.lock().await.widget(kind).phase()
    }

    /// Publishes everything a freshly attached view needs.
    pub async fn publish_full_state(&self) {
        let session = self.session.lock().await;
        self.publish(session.full_state());
    }

    /// Generates (or regenerates) one content kind.
    pub async fn generate(&self, kind: ContentKind) {
        let pending = {
            let mut session = self.session.lock().await;
            let (pending, events) = session.begin_generation(kind);
            self.publish(events);
            pending
        };
        let Some(pending) = pending else {
            return;
        };

        let result = self.gateway.generate(kind, &pending.request).await;

        let mut session = self.session.lock().await;
        let events = session.finish_generation(pending.ticket, result);
        self.publish(events);
    }

    /// A user-initiated retry; allowed once the pending request is retry-eligible.
    pub async fn retry(&self, kind: ContentKind) {
        info!(%kind, "Retrying generation");
        self.generate(kind).await;
    }

    /// Switches the content language.
    ///
    /// Two phases: every content column is cleared (locally and in the row)
    /// and the language stored, and only then is the workflow invoked.
    pub async fn change_language(&self, language: Language) {
        let (previous, space_id) = {
            let mut session = self.session.lock().await;
            let (previous, events) = session.begin_language_change(language);
            self.publish(events);
            (previous, session.space_id())
        };
        let Some(previous) = previous else {
            return;
        };

        let mut update = SpaceUpdate::clear_content();
        update.language = Some(language);
        if let Err(message) = self.gateway.update_space(space_id, &update).await.into_result() {
            warn!(%space_id, "Could not clear content for language switch: {}", message);
            let mut session = self.session.lock().await;
            let events = session.revert_language(previous);
            self.publish(events);
            return;
        }

        let pending = {
            let mut session = self.session.lock().await;
            let (pending, events) = session.begin_regeneration();
            self.publish(events);
            pending
        };

        let result = self.gateway.invoke_workflow(&pending.request).await.into_result();

        let mut session = self.session.lock().await;
        match result {
            Ok(_) => {
                let (_, events) = session
                    .settle_generation(pending.ticket, ActionResult::Success(GenerationOutcome::Accepted));
                self.publish(events);
                self.publish(vec![SessionEvent::Notice(Notice::success(
                    "Regeneration started",
                    Some(format!("Your learning space is being updated to {}.", language)),
                ))]);
            }
            Err(message) => {
                warn!(%space_id, "Regeneration did not start: {}", message);
                let (_, mut events) = session.settle_generation(pending.ticket, ActionResult::Error(message));
                events.extend(session.revert_language(previous));
                self.publish(events);
            }
        }
    }

    /// Re-fetches the row and drops any retained delta.
    pub async fn refresh(&self) {
        let space_id = self.space_id().await;
        match self.gateway.get_space(space_id).await.into_result() {
            Ok(snapshot) => {
                let mut session = self.session.lock().await;
                let events = session.reset(snapshot);
                self.publish(events);
            }
            Err(message) => {
                self.publish(vec![SessionEvent::Notice(Notice::error(
                    "Could not refresh learning space",
                    Some(message),
                ))]);
            }
        }
    }

    pub async fn apply_delta(&self, delta: RealtimeDelta) {
        let mut session = self.session.lock().await;
        let events = session.apply_delta(delta);
        self.publish(events);
    }

    pub async fn set_connection(&self, state: ConnectionState) {
        let mut session = self.session.lock().await;
        let events = session.set_connection(state);
        self.publish(events);
    }

    /// Advances the timers of all pending requests by one second.
    pub async fn tick(&self) {
        let mut session = self.session.lock().await;
        let events = session.tick();
        self.publish(events);
    }
}
