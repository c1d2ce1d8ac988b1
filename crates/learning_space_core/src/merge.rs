//! crates/learning_space_core/src/merge.rs
//!
//! Folds the most recent realtime delta over the snapshot loaded with the page.

use crate::domain::{LearningSpace, SpaceUpdate};
use crate::realtime::RealtimeDelta;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Shallow merge: every key of `overlay` replaces the key of the same name in `base`.
pub fn shallow_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Renders `snapshot` with the fields of `delta` laid over it.
///
/// A delta field that does not decode into its column type is skipped so a
/// single malformed value never hides the rest of the update.
pub fn merge_space(snapshot: &LearningSpace, delta: &RealtimeDelta) -> LearningSpace {
    let base = match serde_json::to_value(snapshot) {
        Ok(Value::Object(map)) => map,
        _ => return snapshot.clone(),
    };

    let merged = shallow_merge(&base, &delta.fields);
    if let Ok(space) = serde_json::from_value::<LearningSpace>(Value::Object(merged)) {
        return space;
    }

    let mut accepted = base;
    for (key, value) in &delta.fields {
        let mut candidate = accepted.clone();
        candidate.insert(key.clone(), value.clone());
        if serde_json::from_value::<LearningSpace>(Value::Object(candidate.clone())).is_ok() {
            accepted = candidate;
        } else {
            warn!(field = %key, space_id = %snapshot.id, "Dropping realtime field that does not decode");
        }
    }
    serde_json::from_value(Value::Object(accepted)).unwrap_or_else(|_| snapshot.clone())
}

/// What happened to a delta handed to the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied,
    /// The delta carried a version at or below one already rendered.
    Stale,
    /// The delta belongs to a different row.
    ForeignRow,
}

/// Holds the page snapshot and the latest delta, and the model rendered from them.
#[derive(Debug, Clone)]
pub struct Reconciler {
    snapshot: LearningSpace,
    latest: Option<RealtimeDelta>,
    rendered: LearningSpace,
    last_version: i64,
}

impl Reconciler {
    pub fn new(snapshot: LearningSpace) -> Self {
        Self {
            last_version: snapshot.version,
            rendered: snapshot.clone(),
            snapshot,
            latest: None,
        }
    }

    pub fn snapshot(&self) -> &LearningSpace {
        &self.snapshot
    }

    pub fn latest(&self) -> Option<&RealtimeDelta> {
        self.latest.as_ref()
    }

    pub fn rendered(&self) -> &LearningSpace {
        &self.rendered
    }

    /// Replaces the latest delta and recomputes the rendered model.
    pub fn apply(&mut self, delta: RealtimeDelta) -> ReconcileOutcome {
        if delta.space_id != self.snapshot.id {
            return ReconcileOutcome::ForeignRow;
        }
        if let Some(version) = delta.version {
            if version <= self.last_version {
                debug!(version, last = self.last_version, "Discarding out-of-order delta");
                return ReconcileOutcome::Stale;
            }
            self.last_version = version;
        }
        self.rendered = merge_space(&self.snapshot, &delta);
        self.latest = Some(delta);
        ReconcileOutcome::Applied
    }

    /// Applies a write this client made itself, before the feed echoes it back.
    ///
    /// The written columns are also removed from the retained delta so an older
    /// server value cannot shadow them.
    pub fn apply_local(&mut self, update: &SpaceUpdate) {
        update.apply_to(&mut self.snapshot);
        if let Some(latest) = self.latest.as_mut() {
            for column in update.columns() {
                latest.fields.remove(column);
            }
        }
        self.rendered = match &self.latest {
            Some(delta) => merge_space(&self.snapshot, delta),
            None => self.snapshot.clone(),
        };
    }

    /// Starts over from a freshly fetched snapshot; retained deltas are dropped.
    pub fn reset(&mut self, snapshot: LearningSpace) {
        *self = Reconciler::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ContentKind, Language, SummaryNotes};
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn space() -> LearningSpace {
        LearningSpace {
            id: Uuid::new_v4(),
            user_id: "user_1".into(),
            topic: "Tides".into(),
            language: Language::English,
            pdf_source: None,
            audio_source: None,
            summary_notes: None,
            flashcards: None,
            quiz: None,
            recommendations: None,
            audio_overview: None,
            audio_script: None,
            mindmap: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn delta(space: &LearningSpace, version: Option<i64>, fields: Value) -> RealtimeDelta {
        RealtimeDelta {
            space_id: space.id,
            version,
            fields: fields.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn delta_fields_overwrite_and_absent_fields_are_kept() {
        let base = json!({"a": 1, "b": 2});
        let overlay = json!({"b": 3});
        let merged = shallow_merge(base.as_object().unwrap(), overlay.as_object().unwrap());
        assert_eq!(Value::Object(merged), json!({"a": 1, "b": 3}));
    }

    #[test]
    fn pushed_summary_replaces_null_snapshot_value() {
        let snapshot = space();
        let mut reconciler = Reconciler::new(snapshot.clone());

        let outcome = reconciler.apply(delta(&snapshot, Some(2), json!({"summary_notes": "X"})));

        assert_eq!(outcome, ReconcileOutcome::Applied);
        assert_eq!(
            reconciler.rendered().summary_notes,
            Some(SummaryNotes::Text("X".into()))
        );
        assert_eq!(reconciler.rendered().topic, "Tides");
        assert_eq!(reconciler.snapshot().summary_notes, None);
    }

    #[test]
    fn only_the_latest_delta_is_laid_over_the_snapshot() {
        let snapshot = space();
        let mut reconciler = Reconciler::new(snapshot.clone());
        reconciler.apply(delta(&snapshot, Some(2), json!({"mindmap": "m1", "topic": "Waves"})));
        reconciler.apply(delta(&snapshot, Some(3), json!({"mindmap": "m2"})));

        assert_eq!(reconciler.rendered().mindmap.as_deref(), Some("m2"));
        assert_eq!(reconciler.rendered().topic, "Tides");
    }

    #[test]
    fn out_of_order_and_foreign_deltas_are_discarded() {
        let snapshot = space();
        let mut reconciler = Reconciler::new(snapshot.clone());
        reconciler.apply(delta(&snapshot, Some(5), json!({"mindmap": "new"})));

        let stale = reconciler.apply(delta(&snapshot, Some(4), json!({"mindmap": "old"})));
        assert_eq!(stale, ReconcileOutcome::Stale);
        assert_eq!(reconciler.rendered().mindmap.as_deref(), Some("new"));

        let mut other = delta(&snapshot, Some(9), json!({"mindmap": "x"}));
        other.space_id = Uuid::new_v4();
        assert_eq!(reconciler.apply(other), ReconcileOutcome::ForeignRow);
    }

    #[test]
    fn malformed_field_is_skipped_without_losing_the_rest() {
        let snapshot = space();
        let mut reconciler = Reconciler::new(snapshot.clone());
        reconciler.apply(delta(
            &snapshot,
            None,
            json!({"quiz": {"unexpected": true}, "audio_overview": "https://cdn/a.mp3"}),
        ));

        assert_eq!(reconciler.rendered().quiz, None);
        assert_eq!(
            reconciler.rendered().audio_overview.as_deref(),
            Some("https://cdn/a.mp3")
        );
    }

    #[test]
    fn local_clear_is_not_shadowed_by_retained_delta() {
        let snapshot = space();
        let mut reconciler = Reconciler::new(snapshot.clone());
        reconciler.apply(delta(&snapshot, Some(2), json!({"summary_notes": "old language"})));

        reconciler.apply_local(&SpaceUpdate::clear_content());

        for kind in ContentKind::ALL {
            assert!(reconciler.rendered().content(kind).is_none());
        }
    }

    #[test]
    fn reset_drops_retained_delta() {
        let snapshot = space();
        let mut reconciler = Reconciler::new(snapshot.clone());
        reconciler.apply(delta(&snapshot, Some(2), json!({"mindmap": "m"})));

        let mut fresh = snapshot.clone();
        fresh.version = 7;
        reconciler.reset(fresh);

        assert!(reconciler.latest().is_none());
        assert_eq!(reconciler.rendered().mindmap, None);
        let replay = reconciler.apply(delta(&snapshot, Some(6), json!({"mindmap": "m"})));
        assert_eq!(replay, ReconcileOutcome::Stale);
    }
}
