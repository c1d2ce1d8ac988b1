//! crates/learning_space_core/src/gateway.rs
//!
//! The Remote Action Gateway: every outbound call (repository, object storage,
//! agent API) goes through here and comes back as an `ActionResult`.
//!
//! Nothing escapes this boundary: port errors and adapter panics are both
//! turned into the `{error}` shape. No retries happen here.

use crate::domain::{
    Content, ContentKind, Language, LearningSpace, NewLearningSpace, ProfileUpdate, SpaceUpdate,
    StudentProfile,
};
use crate::ports::{
    AgentReply, AgentWorkflowService, LearningSpaceRepository, ObjectStorage, PortError,
    PortResult, StoredObject, WorkflowRequest,
};
use crate::widget::GenerationOutcome;
use bytes::Bytes;
use futures::FutureExt;
use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

//=========================================================================================
// Result Shape
//=========================================================================================

/// Serialises as `{"success": true, "data": ...}` or `{"error": "..."}`.
///
/// `NotFound` is a failure like `Error`; it only differs in kind, so callers
/// can tell a missing (or foreign) row apart without reading the message.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult<T> {
    Success(T),
    Error(String),
    NotFound(String),
}

impl<T> ActionResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ActionResult::NotFound(_))
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ActionResult::Error(message) | ActionResult::NotFound(message) => Some(message),
            ActionResult::Success(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ActionResult<U> {
        match self.into_data() {
            Ok(data) => ActionResult::Success(f(data)),
            Err(failure) => failure,
        }
    }

    /// Splits off the data. A failure keeps its kind and can be returned for
    /// any payload type.
    pub fn into_data<U>(self) -> Result<T, ActionResult<U>> {
        match self {
            ActionResult::Success(data) => Ok(data),
            ActionResult::Error(message) => Err(ActionResult::Error(message)),
            ActionResult::NotFound(message) => Err(ActionResult::NotFound(message)),
        }
    }

    pub fn into_result(self) -> Result<T, String> {
        match self {
            ActionResult::Success(data) => Ok(data),
            ActionResult::Error(message) | ActionResult::NotFound(message) => Err(message),
        }
    }
}

impl<T: Serialize> Serialize for ActionResult<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ActionResult::Success(data) => {
                let mut state = serializer.serialize_struct("ActionResult", 2)?;
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
                state.end()
            }
            ActionResult::Error(message) | ActionResult::NotFound(message) => {
                let mut state = serializer.serialize_struct("ActionResult", 1)?;
                state.serialize_field("error", message)?;
                state.end()
            }
        }
    }
}

//=========================================================================================
// Upload Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPolicy {
    pub max_bytes: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// A source document handed in by the user.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Replaces everything except ASCII letters, digits, `.` and `-` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.chars().all(|c| c == '.') {
        "source.pdf".to_string()
    } else {
        cleaned
    }
}

//=========================================================================================
// Gateway
//=========================================================================================

/// Runs a port call, converting a panic inside the adapter into an error.
async fn shielded<T>(call: impl Future<Output = PortResult<T>>) -> PortResult<T> {
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(_) => Err(PortError::Unexpected("the adapter panicked".to_string())),
    }
}

fn failure(prefix: &str, e: &PortError) -> String {
    match e {
        PortError::Upstream { status, body } => format!("{}: {} {}", prefix, status, body.trim()),
        PortError::Configuration(message) => format!("{}: {}", prefix, message),
        PortError::NotFound(message) | PortError::Validation(message) => {
            format!("{}: {}", prefix, message)
        }
        PortError::Unauthorized => format!("{}: unauthorized", prefix),
        PortError::Network(_) | PortError::Unexpected(_) => format!("{}: {}", prefix, e),
    }
}

/// The failure result for `e`, keeping a missing row distinguishable.
fn failed<T>(prefix: &str, e: &PortError) -> ActionResult<T> {
    match e {
        PortError::NotFound(_) => ActionResult::NotFound(failure(prefix, e)),
        _ => ActionResult::Error(failure(prefix, e)),
    }
}

/// The gateway owns its collaborators; nothing is reached through globals.
#[derive(Clone)]
pub struct RemoteActionGateway {
    repository: Arc<dyn LearningSpaceRepository>,
    agent: Arc<dyn AgentWorkflowService>,
    storage: Arc<dyn ObjectStorage>,
    upload_policy: UploadPolicy,
}

impl RemoteActionGateway {
    pub fn new(
        repository: Arc<dyn LearningSpaceRepository>,
        agent: Arc<dyn AgentWorkflowService>,
        storage: Arc<dyn ObjectStorage>,
        upload_policy: UploadPolicy,
    ) -> Self {
        Self {
            repository,
            agent,
            storage,
            upload_policy,
        }
    }

    // --- Database Actions ---

    pub async fn create_space(&self, new_space: NewLearningSpace) -> ActionResult<LearningSpace> {
        info!(topic = %new_space.topic, user_id = %new_space.user_id, "Creating learning space");
        match shielded(self.repository.create(new_space)).await {
            Ok(space) => {
                info!(space_id = %space.id, "Learning space created");
                ActionResult::Success(space)
            }
            Err(e) => {
                error!("Error creating learning space: {:?}", e);
                failed("Failed to create learning space", &e)
            }
        }
    }

    pub async fn get_space(&self, space_id: Uuid) -> ActionResult<LearningSpace> {
        match shielded(self.repository.get(space_id)).await {
            Ok(space) => ActionResult::Success(space),
            Err(e) => {
                error!(%space_id, "Error fetching learning space: {:?}", e);
                failed("Failed to load learning space", &e)
            }
        }
    }

    /// Like `get_space`, but a space owned by someone else looks like a missing one.
    pub async fn get_owned_space(&self, space_id: Uuid, user_id: &str) -> ActionResult<LearningSpace> {
        match self.get_space(space_id).await {
            ActionResult::Success(space) if space.user_id == user_id => ActionResult::Success(space),
            ActionResult::Success(_) => {
                warn!(%space_id, %user_id, "Learning space requested by a non-owner");
                ActionResult::NotFound("Learning space not found".to_string())
            }
            ActionResult::NotFound(_) => ActionResult::NotFound("Learning space not found".to_string()),
            other => other,
        }
    }

    pub async fn list_spaces(&self, user_id: &str) -> ActionResult<Vec<LearningSpace>> {
        match shielded(self.repository.list_by_user(user_id)).await {
            Ok(spaces) => ActionResult::Success(spaces),
            Err(e) => {
                error!(%user_id, "Error listing learning spaces: {:?}", e);
                failed("Failed to load learning spaces", &e)
            }
        }
    }

    pub async fn update_space(&self, space_id: Uuid, update: &SpaceUpdate) -> ActionResult<LearningSpace> {
        debug!(%space_id, columns = ?update.columns(), "Updating learning space");
        match shielded(self.repository.update(space_id, update)).await {
            Ok(space) => ActionResult::Success(space),
            Err(e) => {
                error!(%space_id, "Error updating learning space: {:?}", e);
                failed("Failed to update learning space", &e)
            }
        }
    }

    pub async fn attach_pdf(&self, space_id: Uuid, pdf_source: &str) -> ActionResult<LearningSpace> {
        self.update_space(space_id, &SpaceUpdate::pdf_source(pdf_source)).await
    }

    /// Nulls every generated-content column of the row.
    pub async fn clear_content(&self, space_id: Uuid) -> ActionResult<LearningSpace> {
        info!(%space_id, "Clearing learning space content");
        self.update_space(space_id, &SpaceUpdate::clear_content()).await
    }

    /// Deletes the space, then tells the agent on a best-effort basis.
    pub async fn delete_space(&self, space_id: Uuid, user_id: &str) -> ActionResult<()> {
        info!(%space_id, %user_id, "Deleting learning space");
        if let Err(e) = shielded(self.repository.delete(space_id, user_id)).await {
            error!(%space_id, "Error deleting learning space: {:?}", e);
            return failed("Failed to delete learning space", &e);
        }

        match shielded(self.agent.notify_deleted(space_id, user_id)).await {
            Ok(()) => {}
            Err(PortError::Configuration(_)) => {
                debug!("Agent API not configured; skipping delete notification");
            }
            Err(e) => warn!(%space_id, "Agent delete notification failed (non-critical): {}", e),
        }
        info!(%space_id, "Learning space deleted");
        ActionResult::Success(())
    }

    // --- Profile Actions ---

    /// The student's profile; `None` until one has been saved.
    pub async fn get_profile(&self, user_id: &str) -> ActionResult<Option<StudentProfile>> {
        match shielded(self.repository.get_profile(user_id)).await {
            Ok(profile) => ActionResult::Success(profile),
            Err(e) => {
                error!(%user_id, "Error fetching student profile: {:?}", e);
                failed("Failed to load profile", &e)
            }
        }
    }

    /// Creates or replaces the student's profile.
    pub async fn save_profile(&self, user_id: &str, update: &ProfileUpdate) -> ActionResult<StudentProfile> {
        let update = update.normalized();
        info!(%user_id, language = %update.language, "Saving student profile");
        match shielded(self.repository.upsert_profile(user_id, &update)).await {
            Ok(profile) => ActionResult::Success(profile),
            Err(e) => {
                error!(%user_id, "Error saving student profile: {:?}", e);
                failed("Failed to update profile", &e)
            }
        }
    }

    /// The language new spaces default to: the profile's, else English.
    pub async fn preferred_language(&self, user_id: &str) -> Language {
        match self.get_profile(user_id).await {
            ActionResult::Success(Some(profile)) => profile.language,
            ActionResult::Success(None) => Language::default(),
            failure => {
                warn!(%user_id, "Using the default language: {}", failure.error().unwrap_or_default());
                Language::default()
            }
        }
    }

    // --- Storage Actions ---

    /// Stores a PDF under `sources/{user}/{space}/{name}` and returns its public URL.
    pub async fn upload_source(
        &self,
        user_id: &str,
        space_id: Uuid,
        file: SourceFile,
    ) -> ActionResult<StoredObject> {
        const PREFIX: &str = "Failed to upload source file";
        if file.content_type != PDF_CONTENT_TYPE {
            return ActionResult::Error(format!(
                "{}: only {} files are accepted, got {}",
                PREFIX, PDF_CONTENT_TYPE, file.content_type
            ));
        }
        if file.data.len() > self.upload_policy.max_bytes {
            return ActionResult::Error(format!(
                "{}: file is {} bytes, the limit is {} bytes",
                PREFIX,
                file.data.len(),
                self.upload_policy.max_bytes
            ));
        }

        let path = format!(
            "sources/{}/{}/{}",
            sanitize_file_name(user_id),
            space_id,
            sanitize_file_name(&file.file_name)
        );
        info!(%path, bytes = file.data.len(), "Uploading source file");
        match shielded(self.storage.put(&path, &file.content_type, file.data)).await {
            Ok(stored) => {
                info!(url = %stored.public_url, "Source file uploaded");
                ActionResult::Success(stored)
            }
            Err(e) => {
                error!(%path, "Error uploading source file: {:?}", e);
                failed(PREFIX, &e)
            }
        }
    }

    // --- Agent Actions ---

    pub async fn invoke_workflow(&self, request: &WorkflowRequest) -> ActionResult<AgentReply> {
        info!(
            space_id = %request.learning_space_id,
            language = %request.language,
            "Invoking agent workflow"
        );
        match shielded(self.agent.invoke_workflow(request)).await {
            Ok(reply) => {
                info!("Agent workflow invoked successfully");
                ActionResult::Success(reply)
            }
            Err(e @ PortError::Network(_)) => {
                error!("Network error invoking agent workflow: {}", e);
                ActionResult::Error("Network error while invoking agent workflow".to_string())
            }
            Err(e) => {
                error!("Error invoking agent workflow: {:?}", e);
                failed("Failed to invoke agent workflow", &e)
            }
        }
    }

    /// Asks the agent for one content kind.
    ///
    /// Summary notes only come out of the full workflow, so they are always
    /// `Accepted` and arrive through the change feed.
    pub async fn generate(&self, kind: ContentKind, request: &WorkflowRequest) -> ActionResult<GenerationOutcome> {
        if kind == ContentKind::Summary {
            return self
                .invoke_workflow(request)
                .await
                .map(|_| GenerationOutcome::Accepted);
        }

        info!(
            %kind,
            space_id = %request.learning_space_id,
            language = %request.language,
            "Requesting generation"
        );
        let prefix = format!("Failed to generate {}", kind.label());
        match shielded(self.agent.generate(kind, request)).await {
            Ok(reply) => interpret_reply(kind, reply),
            Err(e @ PortError::Network(_)) => {
                error!(%kind, "Network error during generation: {}", e);
                ActionResult::Error(format!("Network error while generating {}", kind.label()))
            }
            Err(e) => {
                error!(%kind, "Generation request failed: {:?}", e);
                failed(&prefix, &e)
            }
        }
    }

    // --- Composite Flows ---

    /// Creates a space, attaches an optional PDF and starts the workflow.
    ///
    /// Only the row creation is fatal; upload, attach and invoke failures are
    /// logged and the created space is still returned.
    pub async fn create_space_with_source(
        &self,
        new_space: NewLearningSpace,
        pdf: Option<SourceFile>,
    ) -> ActionResult<LearningSpace> {
        let user_id = new_space.user_id.clone();
        let language = new_space.language;
        let mut space = match self.create_space(new_space).await.into_data() {
            Ok(space) => space,
            Err(failure) => return failure,
        };

        if let Some(file) = pdf.filter(|f| !f.data.is_empty()) {
            match self.upload_source(&user_id, space.id, file).await.into_result() {
                Ok(stored) => match self.attach_pdf(space.id, &stored.public_url).await.into_result() {
                    Ok(updated) => space = updated,
                    Err(message) => {
                        warn!(space_id = %space.id, "Could not attach PDF URL: {}", message)
                    }
                },
                Err(message) => {
                    warn!(space_id = %space.id, "PDF upload failed, keeping the space: {}", message)
                }
            }
        }

        let request = WorkflowRequest {
            learning_space_id: space.id,
            user_id,
            language,
        };
        if let Err(message) = self.invoke_workflow(&request).await.into_result() {
            warn!(space_id = %space.id, "Workflow not started: {}", message);
        }
        ActionResult::Success(space)
    }
}

/// Maps an agent reply for `kind` onto the widget outcome.
fn interpret_reply(kind: ContentKind, reply: AgentReply) -> ActionResult<GenerationOutcome> {
    if reply.success != Some(true) {
        let message = reply
            .error
            .or(reply.message)
            .unwrap_or_else(|| format!("Failed to generate {}", kind.label()));
        warn!(%kind, "Agent declined generation: {}", message);
        return ActionResult::Error(message);
    }

    let value = reply
        .payload
        .get(kind.response_field())
        .cloned()
        .unwrap_or(Value::Null);
    match Content::from_value(kind, value) {
        Ok(Some(content)) => {
            info!(%kind, "Generation delivered content");
            ActionResult::Success(GenerationOutcome::Delivered(content))
        }
        Ok(None) => ActionResult::Success(GenerationOutcome::Accepted),
        Err(e) => {
            error!(%kind, "Agent returned malformed content: {}", e);
            ActionResult::Error(format!(
                "Failed to generate {}: malformed response ({})",
                kind.label(),
                e
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_result_shapes() {
        let ok: ActionResult<u32> = ActionResult::Success(7);
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"success": true, "data": 7}));

        let err: ActionResult<u32> = ActionResult::Error("nope".into());
        assert_eq!(serde_json::to_value(&err).unwrap(), json!({"error": "nope"}));
    }

    #[test]
    fn file_names_are_sanitized() {
        assert_eq!(sanitize_file_name("my notes (v2).pdf"), "my_notes__v2_.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_file_name(".."), "source.pdf");
    }

    #[test]
    fn declined_reply_prefers_error_then_message() {
        let reply = AgentReply {
            success: Some(false),
            message: Some("No summary notes available yet.".into()),
            ..Default::default()
        };
        assert_eq!(
            interpret_reply(ContentKind::Quiz, reply),
            ActionResult::Error("No summary notes available yet.".into())
        );

        let bare = AgentReply {
            success: Some(false),
            ..Default::default()
        };
        assert_eq!(
            interpret_reply(ContentKind::Flashcards, bare),
            ActionResult::Error("Failed to generate flashcards".into())
        );
    }

    #[test]
    fn successful_reply_without_payload_is_accepted() {
        let reply = AgentReply {
            success: Some(true),
            ..Default::default()
        };
        assert_eq!(
            interpret_reply(ContentKind::Audio, reply),
            ActionResult::Success(GenerationOutcome::Accepted)
        );
    }

    #[test]
    fn audio_url_is_delivered_inline() {
        let mut reply = AgentReply {
            success: Some(true),
            ..Default::default()
        };
        reply
            .payload
            .insert("audio_url".into(), json!("https://cdn/audio.mp3"));
        assert_eq!(
            interpret_reply(ContentKind::Audio, reply),
            ActionResult::Success(GenerationOutcome::Delivered(Content::Audio(
                "https://cdn/audio.mp3".into()
            )))
        );
    }
}
