//! crates/learning_space_core/src/widget.rs
//!
//! The per-widget generation state machine shared by all six content widgets.
//!
//! The in-flight request is tracked explicitly; absence of content alone never
//! implies that something is being generated.

use crate::domain::{Content, ContentKind};
use crate::timer::{GenerationStatus, GenerationTimer};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidgetPhase {
    /// No content, nothing in flight: show the generate action.
    Empty,
    Generating,
    Ready,
    /// Content is shown while a new request is in flight.
    Regenerating,
}

/// Identifies one generation request. Only the newest ticket of a widget may
/// change its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub kind: ContentKind,
    pub seq: u64,
}

/// How the agent answered a generation request.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    /// The response carried the finished content.
    Delivered(Content),
    /// The agent accepted the work and will write the result to the row.
    Accepted,
}

/// The effect of completing a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Ready,
    /// Still generating until the change feed delivers the content.
    AwaitingFeed,
    Failed(String),
    /// The ticket was superseded by a newer request; nothing changed.
    Stale,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WidgetError {
    #[error("{kind} generation is already in progress")]
    AlreadyInFlight { kind: ContentKind },
}

#[derive(Debug, Clone)]
pub struct ContentWidget {
    kind: ContentKind,
    content: Option<Content>,
    in_flight: Option<u64>,
    next_seq: u64,
    timer: GenerationTimer,
    last_error: Option<String>,
}

impl ContentWidget {
    pub fn new(kind: ContentKind, content: Option<Content>) -> Self {
        Self {
            kind,
            content: content.filter(|c| c.kind() == kind),
            in_flight: None,
            next_seq: 0,
            timer: GenerationTimer::new(),
            last_error: None,
        }
    }

    pub fn kind(&self) -> ContentKind {
        self.kind
    }

    pub fn content(&self) -> Option<&Content> {
        self.content.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn timer(&self) -> &GenerationTimer {
        &self.timer
    }

    pub fn phase(&self) -> WidgetPhase {
        match (self.content.is_some(), self.in_flight.is_some()) {
            (false, false) => WidgetPhase::Empty,
            (false, true) => WidgetPhase::Generating,
            (true, false) => WidgetPhase::Ready,
            (true, true) => WidgetPhase::Regenerating,
        }
    }

    /// Issues a new request.
    ///
    /// While a request is pending a new one is refused until the pending one
    /// becomes retry-eligible; a retry supersedes the pending ticket and
    /// restarts the timer. The superseded request is not cancelled upstream.
    pub fn begin(&mut self) -> Result<RequestTicket, WidgetError> {
        if self.in_flight.is_some() && self.timer.status() != GenerationStatus::RetryEligible {
            return Err(WidgetError::AlreadyInFlight { kind: self.kind });
        }
        Ok(self.supersede())
    }

    /// Issues a new request unconditionally, superseding any pending one.
    pub fn supersede(&mut self) -> RequestTicket {
        self.next_seq += 1;
        self.in_flight = Some(self.next_seq);
        self.timer.start();
        self.last_error = None;
        RequestTicket {
            kind: self.kind,
            seq: self.next_seq,
        }
    }

    /// Drops the pending request, if any. Its response will arrive as stale.
    /// Returns whether a request was pending.
    pub fn abandon(&mut self) -> bool {
        if self.in_flight.is_none() {
            return false;
        }
        self.settle();
        true
    }

    /// Applies the result of the request identified by `ticket`.
    pub fn complete(
        &mut self,
        ticket: RequestTicket,
        result: Result<GenerationOutcome, String>,
    ) -> Completion {
        if ticket.kind != self.kind || self.in_flight != Some(ticket.seq) {
            return Completion::Stale;
        }
        match result {
            Ok(GenerationOutcome::Delivered(content)) if content.kind() == self.kind => {
                self.content = Some(content);
                self.settle();
                Completion::Ready
            }
            Ok(GenerationOutcome::Delivered(content)) => {
                let message = format!(
                    "Failed to generate {}: agent returned {} content",
                    self.kind.label(),
                    content.kind().label()
                );
                self.last_error = Some(message.clone());
                self.settle();
                Completion::Failed(message)
            }
            Ok(GenerationOutcome::Accepted) => Completion::AwaitingFeed,
            Err(message) => {
                self.last_error = Some(message.clone());
                self.settle();
                Completion::Failed(message)
            }
        }
    }

    /// Folds the value the rendered model holds for this widget.
    ///
    /// New content settles a pending request. Returns whether anything changed.
    pub fn observe(&mut self, content: Option<Content>) -> bool {
        let content = content.filter(|c| c.kind() == self.kind);
        if content == self.content {
            return false;
        }
        let delivered = content.is_some();
        self.content = content;
        if delivered && self.in_flight.is_some() {
            self.settle();
        }
        true
    }

    /// Advances the pending request's timer by one second.
    pub fn tick(&mut self) -> Option<GenerationStatus> {
        if self.in_flight.is_none() {
            return None;
        }
        self.timer.tick()
    }

    fn settle(&mut self) {
        self.in_flight = None;
        self.timer.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QuizData, SummaryNotes};

    fn quiz(title: &str) -> Content {
        Content::Quiz(QuizData {
            title: title.into(),
            questions: vec![],
        })
    }

    #[test]
    fn empty_widget_without_request_is_empty() {
        let widget = ContentWidget::new(ContentKind::Quiz, None);
        assert_eq!(widget.phase(), WidgetPhase::Empty);
        assert!(!widget.is_in_flight());
    }

    #[test]
    fn delivered_content_makes_widget_ready() {
        let mut widget = ContentWidget::new(ContentKind::Quiz, None);
        let ticket = widget.begin().unwrap();
        assert_eq!(widget.phase(), WidgetPhase::Generating);

        let completion = widget.complete(ticket, Ok(GenerationOutcome::Delivered(quiz("T"))));

        assert_eq!(completion, Completion::Ready);
        assert_eq!(widget.phase(), WidgetPhase::Ready);
        assert_eq!(widget.content(), Some(&quiz("T")));
        assert!(!widget.timer().is_running());
    }

    #[test]
    fn failure_returns_to_previous_phase_with_error() {
        let mut empty = ContentWidget::new(ContentKind::Quiz, None);
        let ticket = empty.begin().unwrap();
        empty.complete(ticket, Err("boom".into()));
        assert_eq!(empty.phase(), WidgetPhase::Empty);
        assert_eq!(empty.last_error(), Some("boom"));

        let mut ready = ContentWidget::new(ContentKind::Quiz, Some(quiz("old")));
        let ticket = ready.begin().unwrap();
        assert_eq!(ready.phase(), WidgetPhase::Regenerating);
        ready.complete(ticket, Err("boom".into()));
        assert_eq!(ready.phase(), WidgetPhase::Ready);
        assert_eq!(ready.content(), Some(&quiz("old")));
    }

    #[test]
    fn second_request_is_refused_until_retry_eligible() {
        let mut widget = ContentWidget::new(ContentKind::Quiz, None);
        let first = widget.begin().unwrap();
        assert_eq!(
            widget.begin(),
            Err(WidgetError::AlreadyInFlight {
                kind: ContentKind::Quiz
            })
        );

        for _ in 0..45 {
            widget.tick();
        }
        let retry = widget.begin().unwrap();
        assert_ne!(first, retry);
        assert_eq!(widget.timer().elapsed_secs(), 0);

        // The superseded response resolves last and must not win.
        assert_eq!(
            widget.complete(retry, Ok(GenerationOutcome::Delivered(quiz("fresh")))),
            Completion::Ready
        );
        assert_eq!(
            widget.complete(first, Ok(GenerationOutcome::Delivered(quiz("stale")))),
            Completion::Stale
        );
        assert_eq!(widget.content(), Some(&quiz("fresh")));
    }

    #[test]
    fn accepted_request_waits_for_the_feed() {
        let mut widget = ContentWidget::new(ContentKind::Summary, None);
        let ticket = widget.begin().unwrap();
        assert_eq!(
            widget.complete(ticket, Ok(GenerationOutcome::Accepted)),
            Completion::AwaitingFeed
        );
        assert_eq!(widget.phase(), WidgetPhase::Generating);

        let changed = widget.observe(Some(Content::Summary(SummaryNotes::Text("X".into()))));

        assert!(changed);
        assert_eq!(widget.phase(), WidgetPhase::Ready);
    }

    #[test]
    fn unchanged_content_from_feed_keeps_regeneration_pending() {
        let mut widget = ContentWidget::new(ContentKind::Quiz, Some(quiz("old")));
        widget.begin().unwrap();

        assert!(!widget.observe(Some(quiz("old"))));
        assert_eq!(widget.phase(), WidgetPhase::Regenerating);
    }

    #[test]
    fn abandoned_request_resolves_as_stale() {
        let mut widget = ContentWidget::new(ContentKind::Quiz, None);
        let ticket = widget.begin().unwrap();

        assert!(widget.abandon());
        assert!(!widget.abandon());
        assert_eq!(widget.phase(), WidgetPhase::Empty);
        assert!(!widget.timer().is_running());
        assert_eq!(
            widget.complete(ticket, Ok(GenerationOutcome::Delivered(quiz("late")))),
            Completion::Stale
        );
        assert_eq!(widget.content(), None);

        // A fresh request after abandoning still works.
        let next = widget.begin().unwrap();
        assert_ne!(next, ticket);
    }

    #[test]
    fn wrong_kind_content_is_rejected() {
        let mut widget = ContentWidget::new(ContentKind::Mindmap, None);
        let ticket = widget.begin().unwrap();
        let completion = widget.complete(ticket, Ok(GenerationOutcome::Delivered(quiz("T"))));
        assert!(matches!(completion, Completion::Failed(_)));
        assert_eq!(widget.phase(), WidgetPhase::Empty);
    }
}
