//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! One connection is one open learning-space page.

use crate::web::{
    live_task::{forward_events, realtime_process, release_tasks, send_message, ticker_process, WsSender},
    middleware::UserId,
    protocol::{ClientMessage, ServerMessage},
    state::{AppState, PageState},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::stream::StreamExt;
use learning_space_core::quiz::{QuizError, QuizSession};
use learning_space_core::realtime::RealtimeSubscription;
use learning_space_core::SpaceController;
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle};
use tracing::{error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user_id: String) {
    info!("New WebSocket connection established for user: {}", user_id);

    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    // --- 1. Initialization Phase ---
    let space_id = match receiver.next().await {
        Some(Ok(Message::Text(init_json))) => match serde_json::from_str::<ClientMessage>(init_json.as_str()) {
            Ok(ClientMessage::Init { space_id }) => space_id,
            _ => {
                error!("First message was not a valid Init message.");
                let message = ServerMessage::Error {
                    message: "The first message must be init.".to_string(),
                };
                send_message(&ws_sender, &message).await;
                return;
            }
        },
        _ => {
            error!("Client disconnected before sending Init message.");
            return;
        }
    };

    info!(%space_id, "Initializing page");
    let (controller, events) =
        match SpaceController::open(app_state.gateway.clone(), space_id, &user_id).await {
            Ok(opened) => opened,
            Err(message) => {
                error!(%space_id, "Failed to open learning space: {}", message);
                send_message(&ws_sender, &ServerMessage::Error { message }).await;
                return;
            }
        };
    let mut page = PageState::new(user_id, controller);
    if !send_message(&ws_sender, &ServerMessage::SessionInitialized { space_id }).await {
        error!("Failed to send session initialized message.");
        return;
    }

    // --- 2. Background Tasks ---
    let token = page.cancellation_token.clone();
    let subscription = RealtimeSubscription::open(app_state.change_feed.clone(), space_id).await;
    let background: Vec<JoinHandle<()>> = vec![
        tokio::spawn(forward_events(events, ws_sender.clone(), token.clone())),
        tokio::spawn(realtime_process(page.controller.clone(), subscription, token.clone())),
        tokio::spawn(ticker_process(page.controller.clone(), token.clone())),
    ];
    page.controller.publish_full_state().await;

    // --- 3. Main Message Loop ---
    let mut requests: Vec<JoinHandle<()>> = Vec::new();
    loop {
        let msg = tokio::select! {
            _ = token.cancelled() => break,
            msg = receiver.next() => msg,
        };
        match msg {
            Some(Ok(Message::Text(text))) => {
                requests.retain(|handle| !handle.is_finished());
                if let Some(handle) = handle_text_message(text.as_str(), &mut page, &ws_sender).await {
                    requests.push(handle);
                }
            }
            Some(Ok(Message::Close(_))) => {
                info!("Client sent close message.");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket receive error: {}", e);
                break;
            }
            None => {
                info!("Client disconnected.");
                break;
            }
        }
    }

    // --- 4. Cleanup ---
    token.cancel();
    release_tasks(background, requests);
    info!(%space_id, "WebSocket connection closed.");
}

/// Handles one client message. Gateway work runs on a spawned task whose
/// handle is returned, so the loop keeps reading while requests are pending.
async fn handle_text_message(
    text: &str,
    page: &mut PageState,
    ws_sender: &WsSender,
) -> Option<JoinHandle<()>> {
    let client_msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(client_msg) => client_msg,
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            return None;
        }
    };

    let controller = page.controller.clone();
    match client_msg {
        ClientMessage::Generate { kind } => {
            info!(%kind, user_id = %page.user_id, "Generate requested");
            Some(tokio::spawn(async move { controller.generate(kind).await }))
        }
        ClientMessage::Retry { kind } => Some(tokio::spawn(async move { controller.retry(kind).await })),
        ClientMessage::ChangeLanguage { language } => {
            // The quiz being taken belongs to the old content.
            page.quiz = None;
            Some(tokio::spawn(async move { controller.change_language(language).await }))
        }
        ClientMessage::Refresh => Some(tokio::spawn(async move { controller.refresh().await })),
        ClientMessage::Init { .. } => {
            warn!("Received subsequent Init message, which is ignored.");
            None
        }
        quiz_msg => {
            let reply = match handle_quiz_message(quiz_msg, page).await {
                Ok(()) => match &page.quiz {
                    Some(quiz) => ServerMessage::QuizState {
                        quiz: Box::new(quiz.view()),
                    },
                    None => return None,
                },
                Err(message) => ServerMessage::Error { message },
            };
            send_message(ws_sender, &reply).await;
            None
        }
    }
}

async fn handle_quiz_message(msg: ClientMessage, page: &mut PageState) -> Result<(), String> {
    if let ClientMessage::QuizStart = msg {
        let quiz = page
            .controller
            .rendered()
            .await
            .quiz
            .ok_or_else(|| "No quiz has been generated yet.".to_string())?;
        page.quiz = Some(QuizSession::new(quiz).map_err(|e| e.to_string())?);
        return Ok(());
    }

    let quiz = page
        .quiz
        .as_mut()
        .ok_or_else(|| "Start the quiz first.".to_string())?;
    let result: Result<(), QuizError> = match msg {
        ClientMessage::QuizSelect { answer } => {
            quiz.select(answer);
            Ok(())
        }
        ClientMessage::QuizSubmit => quiz.submit().map(|_| ()),
        ClientMessage::QuizNext => quiz.next(),
        ClientMessage::QuizPrevious => {
            quiz.previous();
            Ok(())
        }
        ClientMessage::QuizHint => {
            quiz.toggle_hint();
            Ok(())
        }
        ClientMessage::QuizRestart => {
            quiz.restart();
            Ok(())
        }
        _ => Ok(()),
    };
    result.map_err(|e| e.to_string())
}
