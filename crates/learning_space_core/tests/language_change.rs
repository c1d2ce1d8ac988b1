mod common;

use common::{FakeAgent, Harness};
use learning_space_core::{
    ContentKind, Flashcard, Language, NoticeLevel, PortError, QuizData, RealtimeDelta,
    SessionEvent, SpaceController, SummaryNotes, WidgetPhase,
};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Semaphore;

fn populated_space() -> learning_space_core::LearningSpace {
    let mut space = common::space("user_1");
    space.summary_notes = Some(SummaryNotes::Text("# Notes".into()));
    space.flashcards = Some(vec![Flashcard {
        front: "front".into(),
        back: "back".into(),
    }]);
    space.quiz = Some(QuizData {
        title: "Quiz".into(),
        questions: vec![],
    });
    space.mindmap = Some("https://cdn.test/mindmap.png".into());
    space.audio_overview = Some("https://cdn.test/audio.mp3".into());
    space.audio_script = Some("Welcome".into());
    space.recommendations = Some(vec![]);
    space
}

fn drain(events: &mut learning_space_core::EventReceiver) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

#[tokio::test]
async fn content_is_cleared_before_the_workflow_is_invoked() {
    let harness = Harness::new(FakeAgent::accepting);
    let space = populated_space();
    harness.repository.insert(space.clone());
    let (controller, mut events) =
        SpaceController::open(harness.gateway.clone(), space.id, "user_1")
            .await
            .unwrap();

    controller.change_language(Language::Hindi).await;

    let invocations = harness.agent.invocations.lock().unwrap().clone();
    assert_eq!(invocations.len(), 1);
    let (request, row_at_invoke) = &invocations[0];
    assert_eq!(request.language, Language::Hindi);
    let row_at_invoke = row_at_invoke.as_ref().unwrap();
    assert_eq!(row_at_invoke.language, Language::Hindi);
    assert!(!row_at_invoke.has_any_content());
    assert!(row_at_invoke.audio_script.is_none());

    for kind in ContentKind::ALL {
        let expected = if kind == ContentKind::Summary {
            WidgetPhase::Generating
        } else {
            WidgetPhase::Empty
        };
        assert_eq!(controller.phase(kind).await, expected, "{}", kind);
    }

    let events = drain(&mut events);
    assert!(events.contains(&SessionEvent::LanguageChanged(Language::Hindi)));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::Notice(n) if n.level == NoticeLevel::Success && n.title == "Regeneration started"
    )));
}

#[tokio::test]
async fn regenerated_summary_arrives_through_the_feed() {
    let harness = Harness::new(FakeAgent::accepting);
    let space = populated_space();
    harness.repository.insert(space.clone());
    let (controller, _events) =
        SpaceController::open(harness.gateway.clone(), space.id, "user_1")
            .await
            .unwrap();

    controller.change_language(Language::Tamil).await;
    let row = harness.repository.row(space.id).unwrap();
    let mut fields = serde_json::to_value(&row)
        .unwrap()
        .as_object()
        .cloned()
        .unwrap();
    fields.insert("summary_notes".into(), json!("# குறிப்புகள்"));
    controller
        .apply_delta(RealtimeDelta {
            space_id: space.id,
            version: Some(row.version + 1),
            fields,
        })
        .await;

    assert_eq!(controller.phase(ContentKind::Summary).await, WidgetPhase::Ready);
    let rendered = controller.rendered().await;
    assert_eq!(rendered.language, Language::Tamil);
    assert!(rendered.quiz.is_none());
}

#[tokio::test]
async fn failed_clear_reverts_the_language_without_invoking() {
    let harness = Harness::new(FakeAgent::accepting);
    let space = populated_space();
    harness.repository.insert(space.clone());
    harness.repository.fail_updates.store(true, Ordering::SeqCst);
    let (controller, mut events) =
        SpaceController::open(harness.gateway.clone(), space.id, "user_1")
            .await
            .unwrap();

    controller.change_language(Language::Bengali).await;

    assert_eq!(harness.agent.invocation_count(), 0);
    assert_eq!(controller.rendered().await.language, Language::English);
    assert_eq!(
        harness.repository.row(space.id).unwrap().language,
        Language::English
    );
    let events = drain(&mut events);
    assert_eq!(
        events.iter().rev().find_map(|e| match e {
            SessionEvent::Notice(n) => Some(n.title.clone()),
            _ => None,
        }),
        Some("Failed to start regeneration".to_string())
    );
}

#[tokio::test]
async fn failed_invoke_reverts_the_selection() {
    let harness = Harness::new(|repo| {
        FakeAgent::new(
            repo,
            Box::new(|_| {
                Err(PortError::Upstream {
                    status: 502,
                    body: "Bad Gateway".into(),
                })
            }),
        )
    });
    let space = populated_space();
    harness.repository.insert(space.clone());
    let (controller, _events) =
        SpaceController::open(harness.gateway.clone(), space.id, "user_1")
            .await
            .unwrap();

    controller.change_language(Language::Urdu).await;

    assert_eq!(harness.agent.invocation_count(), 1);
    assert_eq!(controller.rendered().await.language, Language::English);
    assert_eq!(controller.phase(ContentKind::Summary).await, WidgetPhase::Empty);
}

#[tokio::test]
async fn selecting_the_current_language_does_nothing() {
    let harness = Harness::new(FakeAgent::accepting);
    let space = populated_space();
    harness.repository.insert(space.clone());
    let (controller, mut events) =
        SpaceController::open(harness.gateway.clone(), space.id, "user_1")
            .await
            .unwrap();

    controller.change_language(Language::English).await;

    assert_eq!(harness.agent.invocation_count(), 0);
    assert!(drain(&mut events).is_empty());
    assert!(controller.rendered().await.has_any_content());
}

#[tokio::test]
async fn quiz_answered_after_the_switch_is_not_shown() {
    let gate = Arc::new(Semaphore::new(0));
    let harness = {
        let gate = gate.clone();
        Harness::new(move |repo| {
            FakeAgent::new(
                repo,
                Box::new(|kind| match kind {
                    ContentKind::Quiz => Ok(common::success(Some((
                        "quiz",
                        json!({"title": "English quiz", "questions": []}),
                    )))),
                    _ => Ok(common::success(None)),
                }),
            )
            .gated(gate)
        })
    };
    let space = common::space("user_1");
    harness.repository.insert(space.clone());
    let (controller, mut events) =
        SpaceController::open(harness.gateway.clone(), space.id, "user_1")
            .await
            .unwrap();
    let controller = Arc::new(controller);

    let pending = tokio::spawn({
        let controller = controller.clone();
        async move { controller.generate(ContentKind::Quiz).await }
    });
    while harness.agent.generations.lock().unwrap().is_empty() {
        tokio::task::yield_now().await;
    }

    controller.change_language(Language::Hindi).await;
    drain(&mut events);
    gate.add_permits(1);
    pending.await.unwrap();

    let late = drain(&mut events);
    assert!(
        !late.iter().any(|event| matches!(
            event,
            SessionEvent::WidgetChanged { kind: ContentKind::Quiz, phase: WidgetPhase::Ready, .. }
        )),
        "{late:?}"
    );
    assert!(controller.rendered().await.quiz.is_none());
    assert_eq!(controller.phase(ContentKind::Quiz).await, WidgetPhase::Empty);
}

#[tokio::test]
async fn language_switch_completes_after_the_page_goes_away() {
    let harness = Harness::new(FakeAgent::accepting);
    let space = populated_space();
    harness.repository.insert(space.clone());
    let (controller, events) =
        SpaceController::open(harness.gateway.clone(), space.id, "user_1")
            .await
            .unwrap();
    drop(events);

    controller.change_language(Language::Hindi).await;

    assert_eq!(harness.agent.invocation_count(), 1);
    let row = harness.repository.row(space.id).unwrap();
    assert_eq!(row.language, Language::Hindi);
    assert!(!row.has_any_content());
}
