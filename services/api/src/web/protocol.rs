//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API
//! server for an open learning-space page.

use learning_space_core::domain::{Content, ContentKind, Language, LearningSpace};
use learning_space_core::quiz::{AnswerKey, QuizView};
use learning_space_core::realtime::ConnectionStatus;
use learning_space_core::session::{NoticeLevel, SessionEvent};
use learning_space_core::timer::GenerationStatus;
use learning_space_core::widget::WidgetPhase;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Opens a page. This must be the first message sent on the connection.
    Init { space_id: Uuid },

    /// Generates (or regenerates) one content widget.
    Generate { kind: ContentKind },

    /// Retries a request that has been pending for too long.
    Retry { kind: ContentKind },

    /// Clears all content and regenerates it in another language.
    ChangeLanguage { language: Language },

    /// Reloads the row from the database.
    Refresh,

    QuizStart,
    QuizSelect { answer: AnswerKey },
    QuizSubmit,
    QuizNext,
    QuizPrevious,
    QuizHint,
    QuizRestart,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms successful page initialization.
    SessionInitialized { space_id: Uuid },

    /// The realtime channel status.
    ConnectionStatus {
        status: ConnectionStatus,
        details: Option<String>,
    },

    /// The rendered learning space changed.
    SpaceUpdated { space: Box<LearningSpace> },

    WidgetChanged {
        kind: ContentKind,
        phase: WidgetPhase,
        content: Option<Content>,
        error: Option<String>,
    },

    /// A pending request crossed a time threshold.
    GenerationStatus {
        kind: ContentKind,
        status: GenerationStatus,
        elapsed_secs: u64,
        hint: String,
    },

    LanguageChanged { language: Language },

    /// A toast for the user.
    Notice {
        level: NoticeLevel,
        title: String,
        description: Option<String>,
    },

    QuizState { quiz: Box<QuizView> },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}

impl From<SessionEvent> for ServerMessage {
    fn from(event: SessionEvent) -> Self {
        match event {
            SessionEvent::SpaceUpdated(space) => ServerMessage::SpaceUpdated {
                space: Box::new(space),
            },
            SessionEvent::WidgetChanged {
                kind,
                phase,
                content,
                error,
            } => ServerMessage::WidgetChanged {
                kind,
                phase,
                content,
                error,
            },
            SessionEvent::GenerationStatus {
                kind,
                status,
                elapsed_secs,
            } => ServerMessage::GenerationStatus {
                kind,
                status,
                elapsed_secs,
                hint: status.hint().to_string(),
            },
            SessionEvent::Connection(state) => ServerMessage::ConnectionStatus {
                status: state.status,
                details: state.details,
            },
            SessionEvent::LanguageChanged(language) => ServerMessage::LanguageChanged { language },
            SessionEvent::Notice(notice) => ServerMessage::Notice {
                level: notice.level,
                title: notice.title,
                description: notice.description,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use learning_space_core::realtime::ConnectionState;
    use serde_json::json;

    #[test]
    fn client_messages_are_tagged_by_type() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"change_language","language":"Tamil"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ChangeLanguage {
                language: Language::Tamil
            }
        );

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"retry","kind":"mindmap"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Retry {
                kind: ContentKind::Mindmap
            }
        );
    }

    #[test]
    fn generation_status_carries_its_hint() {
        let msg = ServerMessage::from(SessionEvent::GenerationStatus {
            kind: ContentKind::Audio,
            status: GenerationStatus::RetryEligible,
            elapsed_secs: 45,
        });

        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({
                "type": "generation_status",
                "kind": "audio",
                "status": "retry_eligible",
                "elapsed_secs": 45,
                "hint": "Stuck? You can try triggering it again."
            })
        );
    }

    #[test]
    fn connection_error_keeps_details() {
        let msg = ServerMessage::from(SessionEvent::Connection(ConnectionState::error("timed out")));
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"type": "connection_status", "status": "error", "details": "timed out"})
        );
    }
}
