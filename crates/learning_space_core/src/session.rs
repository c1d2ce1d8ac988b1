//! crates/learning_space_core/src/session.rs
//!
//! The state of one open learning-space page: the reconciled model, the six
//! content widgets and the realtime connection status. All methods are
//! synchronous and return the events a view needs to redraw.

use crate::domain::{Content, ContentKind, Language, LearningSpace, SpaceUpdate};
use crate::gateway::ActionResult;
use crate::merge::{ReconcileOutcome, Reconciler};
use crate::ports::WorkflowRequest;
use crate::realtime::{ConnectionState, RealtimeDelta};
use crate::timer::GenerationStatus;
use crate::widget::{Completion, ContentWidget, GenerationOutcome, RequestTicket, WidgetPhase};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Error,
}

/// A transient message for the user (a toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub description: Option<String>,
}

impl Notice {
    pub fn info(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            description,
        }
    }

    pub fn success(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.into(),
            description,
        }
    }

    pub fn error(title: impl Into<String>, description: Option<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            description,
        }
    }
}

/// Something the view has to reflect.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SpaceUpdated(LearningSpace),
    WidgetChanged {
        kind: ContentKind,
        phase: WidgetPhase,
        content: Option<Content>,
        error: Option<String>,
    },
    GenerationStatus {
        kind: ContentKind,
        status: GenerationStatus,
        elapsed_secs: u64,
    },
    Connection(ConnectionState),
    LanguageChanged(Language),
    Notice(Notice),
}

/// A request the caller should now send through the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingGeneration {
    pub ticket: RequestTicket,
    pub request: WorkflowRequest,
}

pub struct LearningSpaceSession {
    user_id: String,
    reconciler: Reconciler,
    widgets: Vec<ContentWidget>,
    connection: ConnectionState,
}

impl LearningSpaceSession {
    pub fn new(snapshot: LearningSpace, user_id: impl Into<String>) -> Self {
        let widgets = ContentKind::ALL
            .iter()
            .map(|kind| ContentWidget::new(*kind, snapshot.content(*kind)))
            .collect();
        Self {
            user_id: user_id.into(),
            reconciler: Reconciler::new(snapshot),
            widgets,
            connection: ConnectionState::connecting(),
        }
    }

    pub fn space_id(&self) -> uuid::Uuid {
        self.reconciler.snapshot().id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn language(&self) -> Language {
        self.rendered().language
    }

    pub fn rendered(&self) -> &LearningSpace {
        self.reconciler.rendered()
    }

    pub fn connection(&self) -> &ConnectionState {
        &self.connection
    }

    pub fn widget(&self, kind: ContentKind) -> &ContentWidget {
        &self.widgets[Self::slot(kind)]
    }

    fn widget_mut(&mut self, kind: ContentKind) -> &mut ContentWidget {
        &mut self.widgets[Self::slot(kind)]
    }

    fn slot(kind: ContentKind) -> usize {
        ContentKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or_default()
    }

    pub fn workflow_request(&self) -> WorkflowRequest {
        WorkflowRequest {
            learning_space_id: self.space_id(),
            user_id: self.user_id.clone(),
            language: self.language(),
        }
    }

    /// Every event needed to draw the page from scratch.
    pub fn full_state(&self) -> Vec<SessionEvent> {
        let mut events = vec![
            SessionEvent::SpaceUpdated(self.rendered().clone()),
            SessionEvent::Connection(self.connection.clone()),
        ];
        events.extend(ContentKind::ALL.iter().map(|kind| self.widget_event(*kind)));
        events
    }

    fn widget_event(&self, kind: ContentKind) -> SessionEvent {
        let widget = self.widget(kind);
        SessionEvent::WidgetChanged {
            kind,
            phase: widget.phase(),
            content: widget.content().cloned(),
            error: widget.last_error().map(str::to_string),
        }
    }

    // --- Generation ---

    /// Marks `kind` as generating. Refused (with a notice) while a request is
    /// pending and not yet retry-eligible.
    pub fn begin_generation(&mut self, kind: ContentKind) -> (Option<PendingGeneration>, Vec<SessionEvent>) {
        match self.widget_mut(kind).begin() {
            Ok(ticket) => {
                debug!(%kind, seq = ticket.seq, "Generation started");
                let pending = PendingGeneration {
                    ticket,
                    request: self.workflow_request(),
                };
                (Some(pending), vec![self.widget_event(kind)])
            }
            Err(e) => (None, vec![SessionEvent::Notice(Notice::info(e.to_string(), None))]),
        }
    }

    /// Applies a gateway result and adds the user notices for it.
    pub fn finish_generation(
        &mut self,
        ticket: RequestTicket,
        result: ActionResult<GenerationOutcome>,
    ) -> Vec<SessionEvent> {
        let kind = ticket.kind;
        let (completion, mut events) = self.settle_generation(ticket, result);
        match completion {
            Completion::Ready => events.push(SessionEvent::Notice(Notice::success(
                format!("{} generated successfully!", kind.title()),
                None,
            ))),
            Completion::Failed(message) => events.push(SessionEvent::Notice(Notice::error(
                format!("{} Generation Failed", kind.title()),
                Some(message),
            ))),
            Completion::AwaitingFeed | Completion::Stale => {}
        }
        events
    }

    /// Applies a gateway result without user notices.
    pub fn settle_generation(
        &mut self,
        ticket: RequestTicket,
        result: ActionResult<GenerationOutcome>,
    ) -> (Completion, Vec<SessionEvent>) {
        let kind = ticket.kind;
        let completion = self.widget_mut(kind).complete(ticket, result.into_result());
        let mut events = Vec::new();
        match &completion {
            Completion::Ready => {
                info!(%kind, "Generation finished with content");
                let content = self.widget(kind).content().cloned();
                self.reconciler
                    .apply_local(&SpaceUpdate::default().with_content(kind, content));
                events.push(SessionEvent::SpaceUpdated(self.rendered().clone()));
                events.push(self.widget_event(kind));
            }
            Completion::Failed(message) => {
                info!(%kind, "Generation failed: {}", message);
                events.push(self.widget_event(kind));
            }
            Completion::AwaitingFeed => debug!(%kind, "Generation accepted; waiting for the feed"),
            Completion::Stale => debug!(%kind, seq = ticket.seq, "Ignoring superseded response"),
        }
        (completion, events)
    }

    /// One second passes for every pending request.
    pub fn tick(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        for widget in &mut self.widgets {
            if let Some(status) = widget.tick() {
                events.push(SessionEvent::GenerationStatus {
                    kind: widget.kind(),
                    status,
                    elapsed_secs: widget.timer().elapsed_secs(),
                });
            }
        }
        events
    }

    // --- Realtime ---

    pub fn apply_delta(&mut self, delta: RealtimeDelta) -> Vec<SessionEvent> {
        match self.reconciler.apply(delta) {
            ReconcileOutcome::Applied => {
                let mut events = vec![SessionEvent::SpaceUpdated(self.rendered().clone())];
                events.extend(self.sync_widgets());
                events
            }
            outcome => {
                debug!(?outcome, "Delta not applied");
                Vec::new()
            }
        }
    }

    pub fn set_connection(&mut self, state: ConnectionState) -> Vec<SessionEvent> {
        if state == self.connection {
            return Vec::new();
        }
        self.connection = state.clone();
        vec![SessionEvent::Connection(state)]
    }

    /// Applies a write made by this client to the rendered model.
    pub fn apply_local(&mut self, update: &SpaceUpdate) -> Vec<SessionEvent> {
        self.reconciler.apply_local(update);
        let mut events = vec![SessionEvent::SpaceUpdated(self.rendered().clone())];
        events.extend(self.sync_widgets());
        events
    }

    /// Replaces the snapshot with a freshly fetched row.
    pub fn reset(&mut self, snapshot: LearningSpace) -> Vec<SessionEvent> {
        self.reconciler.reset(snapshot);
        let mut events = vec![SessionEvent::SpaceUpdated(self.rendered().clone())];
        events.extend(self.sync_widgets());
        events
    }

    fn sync_widgets(&mut self) -> Vec<SessionEvent> {
        let mut changed = Vec::new();
        for kind in ContentKind::ALL {
            let content = self.rendered().content(kind);
            if self.widget_mut(kind).observe(content) {
                changed.push(kind);
            }
        }
        changed.into_iter().map(|kind| self.widget_event(kind)).collect()
    }

    // --- Language ---

    /// First phase of a language switch: select the language and clear all
    /// content locally. Returns the previous language, or `None` when the
    /// language is already selected.
    ///
    /// Every pending request belongs to the old language and is dropped; its
    /// response is ignored when it arrives.
    pub fn begin_language_change(&mut self, language: Language) -> (Option<Language>, Vec<SessionEvent>) {
        let previous = self.language();
        if previous == language {
            return (None, Vec::new());
        }
        info!(space_id = %self.space_id(), from = %previous, to = %language, "Switching language");

        let abandoned: Vec<ContentKind> = self
            .widgets
            .iter_mut()
            .filter_map(|widget| widget.abandon().then(|| widget.kind()))
            .collect();
        if !abandoned.is_empty() {
            debug!(?abandoned, "Dropped requests pending in the old language");
        }

        let mut update = SpaceUpdate::clear_content();
        update.language = Some(language);
        let mut events = vec![
            SessionEvent::LanguageChanged(language),
            SessionEvent::Notice(Notice::info(
                format!("Regenerating content in {}...", language),
                Some("This may take a minute. Existing content will be overwritten.".to_string()),
            )),
        ];
        let cleared = self.apply_local(&update);
        let redrawn: Vec<ContentKind> = cleared
            .iter()
            .filter_map(|event| match event {
                SessionEvent::WidgetChanged { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        events.extend(cleared);
        // Widgets that were generating without content did not change content,
        // so they need their own redraw.
        events.extend(
            abandoned
                .into_iter()
                .filter(|kind| !redrawn.contains(kind))
                .map(|kind| self.widget_event(kind)),
        );
        (Some(previous), events)
    }

    /// Puts the previously selected language back after a failed switch.
    pub fn revert_language(&mut self, previous: Language) -> Vec<SessionEvent> {
        let mut events = vec![SessionEvent::LanguageChanged(previous)];
        events.extend(self.apply_local(&SpaceUpdate::language(previous)));
        events.push(SessionEvent::Notice(Notice::error(
            "Failed to start regeneration",
            Some("Please try again later.".to_string()),
        )));
        events
    }

    /// Starts the workflow request of a language switch, superseding any
    /// summary request that was pending in the old language.
    pub fn begin_regeneration(&mut self) -> (PendingGeneration, Vec<SessionEvent>) {
        let ticket = self.widget_mut(ContentKind::Summary).supersede();
        let pending = PendingGeneration {
            ticket,
            request: self.workflow_request(),
        };
        (pending, vec![self.widget_event(ContentKind::Summary)])
    }
}
