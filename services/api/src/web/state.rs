//! services/api/src/web/state.rs
//!
//! Defines the application's shared and connection-specific states.

use crate::config::Config;
use learning_space_core::gateway::RemoteActionGateway;
use learning_space_core::ports::ChangeFeed;
use learning_space_core::quiz::QuizSession;
use learning_space_core::SpaceController;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<RemoteActionGateway>,
    pub change_feed: Arc<dyn ChangeFeed>,
    pub config: Arc<Config>,
}

//=========================================================================================
// PageState (Specific to One WebSocket Connection)
//=========================================================================================

/// The state behind one open learning-space page.
pub struct PageState {
    pub user_id: String,
    pub controller: Arc<SpaceController>,
    /// The quiz being taken, if the user started one.
    pub quiz: Option<QuizSession>,
    /// Cancels every background task of the connection.
    pub cancellation_token: CancellationToken,
}

impl PageState {
    pub fn new(user_id: String, controller: SpaceController) -> Self {
        Self {
            user_id,
            controller: Arc::new(controller),
            quiz: None,
            cancellation_token: CancellationToken::new(),
        }
    }
}
