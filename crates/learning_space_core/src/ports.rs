//! crates/learning_space_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, so the core
//! stays independent of the hosted database, the change feed, object storage
//! and the external agent API.

use crate::domain::{
    ContentKind, Language, LearningSpace, NewLearningSpace, ProfileUpdate, SpaceUpdate,
    StudentProfile,
};
use crate::realtime::FeedEvent;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Unauthorized")]
    Unauthorized,
    /// A required setting (URL, credential) is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The upstream service answered with a non-success HTTP status.
    #[error("{status} {body}")]
    Upstream { status: u16, body: String },
    /// The request never produced a response.
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Agent Wire Types
//=========================================================================================

/// The JSON body every agent workflow endpoint accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    pub learning_space_id: Uuid,
    pub user_id: String,
    pub language: Language,
}

/// The JSON body agent endpoints answer with.
///
/// Content is delivered in a kind-specific field, kept in `payload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Where an uploaded object landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub path: String,
    pub public_url: String,
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait LearningSpaceRepository: Send + Sync {
    async fn create(&self, new_space: NewLearningSpace) -> PortResult<LearningSpace>;

    async fn get(&self, id: Uuid) -> PortResult<LearningSpace>;

    /// Spaces owned by `user_id`, newest first.
    async fn list_by_user(&self, user_id: &str) -> PortResult<Vec<LearningSpace>>;

    /// Writes the columns named by `update`, refreshes `updated_at` and returns the row.
    async fn update(&self, id: Uuid, update: &SpaceUpdate) -> PortResult<LearningSpace>;

    /// Deletes the row only when it belongs to `user_id`.
    async fn delete(&self, id: Uuid, user_id: &str) -> PortResult<()>;

    /// The saved profile of `user_id`, if any.
    async fn get_profile(&self, user_id: &str) -> PortResult<Option<StudentProfile>>;

    /// Inserts the profile of `user_id` or replaces the existing one.
    async fn upsert_profile(&self, user_id: &str, profile: &ProfileUpdate) -> PortResult<StudentProfile>;
}

#[async_trait]
pub trait AgentWorkflowService: Send + Sync {
    /// Starts the full generation workflow. The agent answers before the work is done.
    async fn invoke_workflow(&self, request: &WorkflowRequest) -> PortResult<AgentReply>;

    /// Runs the on-demand generator for one content kind.
    async fn generate(&self, kind: ContentKind, request: &WorkflowRequest)
        -> PortResult<AgentReply>;

    /// Tells the agent a space is gone so it can drop its own state.
    async fn notify_deleted(&self, space_id: Uuid, user_id: &str) -> PortResult<()>;
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Stores `data` at `path` and returns its publicly resolvable URL.
    async fn put(&self, path: &str, content_type: &str, data: Bytes) -> PortResult<StoredObject>;
}

#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a subscription to UPDATE events on one learning-space row.
    ///
    /// The stream first yields a subscription acknowledgement (or a failure)
    /// and then one `FeedEvent::Update` per committed row update.
    async fn subscribe(&self, space_id: Uuid) -> PortResult<BoxStream<'static, FeedEvent>>;
}
