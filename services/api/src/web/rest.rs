//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every body is the gateway's result shape: `{"success": true, "data": ...}`
//! or `{"error": "..."}`.

use crate::web::middleware::UserId;
use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Extension,
};
use bytes::Bytes;
use learning_space_core::domain::{Content, ContentKind, Language, NewLearningSpace, ProfileUpdate};
use learning_space_core::gateway::{ActionResult, SourceFile};
use learning_space_core::ports::WorkflowRequest;
use learning_space_core::widget::GenerationOutcome;
use learning_space_core::SpaceUpdate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_spaces_handler,
        create_space_handler,
        get_space_handler,
        delete_space_handler,
        generate_handler,
        change_language_handler,
        get_profile_handler,
        save_profile_handler,
    ),
    components(
        schemas(CreateSpaceForm, ChangeLanguageRequest, ProfileRequest, ErrorBody)
    ),
    tags(
        (name = "Learning Spaces API", description = "Learning spaces and their generated study materials.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The multipart form accepted when creating a learning space.
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct CreateSpaceForm {
    topic: String,
    /// English name of the language; defaults to the profile's language.
    language: Option<String>,
    /// An optional PDF source document.
    #[schema(value_type = Option<String>, format = Binary)]
    pdf: Option<Vec<u8>>,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangeLanguageRequest {
    pub language: String,
}

/// The editable student profile fields.
#[derive(Deserialize, ToSchema)]
pub struct ProfileRequest {
    #[serde(default)]
    pub grade_level: String,
    /// English name of the preferred language.
    pub language: String,
    #[serde(default)]
    pub gender: String,
}

/// The body of every failed request.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    error: String,
}

/// Turns a gateway result into a response. A missing row maps to 404, any
/// other failure to 500.
fn respond<T: Serialize>(result: ActionResult<T>, success: StatusCode) -> Response {
    let status = match &result {
        ActionResult::Success(_) => success,
        ActionResult::NotFound(_) => StatusCode::NOT_FOUND,
        ActionResult::Error(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(result)).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    let body: ActionResult<()> = ActionResult::Error(message.into());
    (StatusCode::BAD_REQUEST, Json(body)).into_response()
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// List the caller's learning spaces, newest first.
#[utoipa::path(
    get,
    path = "/spaces",
    responses(
        (status = 200, description = "The caller's learning spaces"),
        (status = 401, description = "Missing x-user-id header"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    params(("x-user-id" = String, Header, description = "The authenticated user."))
)]
pub async fn list_spaces_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Response {
    respond(app_state.gateway.list_spaces(&user_id).await, StatusCode::OK)
}

/// Create a learning space, optionally with a PDF, and start content generation.
///
/// Only creating the row can fail the request; a failed upload or workflow
/// start is logged and the new space is still returned.
#[utoipa::path(
    post,
    path = "/spaces",
    request_body(content = CreateSpaceForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Learning space created"),
        (status = 400, description = "Missing topic or unreadable form", body = ErrorBody),
        (status = 401, description = "Missing x-user-id header"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    params(("x-user-id" = String, Header, description = "The authenticated user."))
)]
pub async fn create_space_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    mut multipart: Multipart,
) -> Response {
    let mut topic = None;
    let mut language = None;
    let mut pdf = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return bad_request(format!("Failed to read multipart data: {}", e)),
        };
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "topic" => match field.text().await {
                Ok(text) => topic = Some(text.trim().to_string()),
                Err(e) => return bad_request(format!("Failed to read topic: {}", e)),
            },
            "language" => match field.text().await {
                Ok(text) if text.trim().is_empty() => {}
                Ok(text) => match text.parse::<Language>() {
                    Ok(parsed) => language = Some(parsed),
                    Err(e) => return bad_request(e.to_string()),
                },
                Err(e) => return bad_request(format!("Failed to read language: {}", e)),
            },
            "pdf" => {
                let file_name = field.file_name().unwrap_or("source.pdf").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let data: Bytes = match field.bytes().await {
                    Ok(data) => data,
                    Err(e) => return bad_request(format!("Failed to read file bytes: {}", e)),
                };
                pdf = Some(SourceFile {
                    file_name,
                    content_type,
                    data,
                });
            }
            other => warn!(field = other, "Ignoring unknown form field"),
        }
    }

    let Some(topic) = topic.filter(|t| !t.is_empty()) else {
        return bad_request("A topic is required");
    };
    let language = match language {
        Some(language) => language,
        None => app_state.gateway.preferred_language(&user_id).await,
    };
    let new_space = NewLearningSpace {
        user_id,
        topic,
        language,
        pdf_source: None,
        audio_source: None,
    };
    respond(
        app_state.gateway.create_space_with_source(new_space, pdf).await,
        StatusCode::CREATED,
    )
}

/// Fetch one learning space owned by the caller.
#[utoipa::path(
    get,
    path = "/spaces/{id}",
    responses(
        (status = 200, description = "The learning space"),
        (status = 404, description = "No such space for this user", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "Learning space id."),
        ("x-user-id" = String, Header, description = "The authenticated user.")
    )
)]
pub async fn get_space_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Response {
    respond(app_state.gateway.get_owned_space(id, &user_id).await, StatusCode::OK)
}

/// Delete a learning space. The agent is notified on a best-effort basis.
#[utoipa::path(
    delete,
    path = "/spaces/{id}",
    responses(
        (status = 200, description = "Deleted"),
        (status = 404, description = "No such space for this user", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "Learning space id."),
        ("x-user-id" = String, Header, description = "The authenticated user.")
    )
)]
pub async fn delete_space_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<Uuid>,
) -> Response {
    respond(app_state.gateway.delete_space(id, &user_id).await, StatusCode::OK)
}

/// Generate one kind of content for a space.
///
/// `data` is the generated content, or `null` when the agent writes it to the
/// row later (it then arrives over the WebSocket).
#[utoipa::path(
    post,
    path = "/spaces/{id}/generate/{kind}",
    responses(
        (status = 200, description = "Generation finished or accepted"),
        (status = 400, description = "Unknown content kind", body = ErrorBody),
        (status = 404, description = "No such space for this user", body = ErrorBody),
        (status = 500, description = "The agent request failed", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "Learning space id."),
        ("kind" = String, Path, description = "summary, flashcards, quiz, mindmap, audio or recommendations."),
        ("x-user-id" = String, Header, description = "The authenticated user.")
    )
)]
pub async fn generate_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path((id, kind)): Path<(Uuid, String)>,
) -> Response {
    let kind = match kind.parse::<ContentKind>() {
        Ok(kind) => kind,
        Err(e) => return bad_request(e.to_string()),
    };
    let space = match app_state.gateway.get_owned_space(id, &user_id).await.into_data() {
        Ok(space) => space,
        Err(failure) => return respond::<()>(failure, StatusCode::OK),
    };
    let request = WorkflowRequest {
        learning_space_id: space.id,
        user_id,
        language: space.language,
    };
    let result = app_state
        .gateway
        .generate(kind, &request)
        .await
        .map(|outcome| match outcome {
            GenerationOutcome::Delivered(content) => Some(content),
            GenerationOutcome::Accepted => None::<Content>,
        });
    respond(result, StatusCode::OK)
}

/// Switch a space to another language and regenerate everything.
///
/// All generated content is cleared before the workflow is invoked.
#[utoipa::path(
    put,
    path = "/spaces/{id}/language",
    request_body = ChangeLanguageRequest,
    responses(
        (status = 200, description = "Content cleared and regeneration started"),
        (status = 400, description = "Unsupported language", body = ErrorBody),
        (status = 404, description = "No such space for this user", body = ErrorBody),
        (status = 500, description = "Clearing or invoking failed", body = ErrorBody)
    ),
    params(
        ("id" = Uuid, Path, description = "Learning space id."),
        ("x-user-id" = String, Header, description = "The authenticated user.")
    )
)]
pub async fn change_language_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ChangeLanguageRequest>,
) -> Response {
    let language = match payload.language.parse::<Language>() {
        Ok(language) => language,
        Err(e) => return bad_request(e.to_string()),
    };
    let gateway = &app_state.gateway;
    if let Err(failure) = gateway.get_owned_space(id, &user_id).await.into_data::<()>() {
        return respond(failure, StatusCode::OK);
    }

    info!(space_id = %id, %language, "Changing language");
    if let Err(failure) = gateway.clear_content(id).await.into_data::<()>() {
        return respond(failure, StatusCode::OK);
    }
    let space = match gateway
        .update_space(id, &SpaceUpdate::language(language))
        .await
        .into_data()
    {
        Ok(space) => space,
        Err(failure) => return respond::<()>(failure, StatusCode::OK),
    };

    let request = WorkflowRequest {
        learning_space_id: id,
        user_id,
        language,
    };
    match gateway.invoke_workflow(&request).await.into_data::<()>() {
        Ok(_) => respond(ActionResult::Success(space), StatusCode::OK),
        Err(failure) => {
            error!(space_id = %id, "Regeneration did not start: {}", failure.error().unwrap_or_default());
            respond(failure, StatusCode::OK)
        }
    }
}

/// The caller's student profile. `data` is `null` until one is saved.
#[utoipa::path(
    get,
    path = "/profile",
    responses(
        (status = 200, description = "The profile, or null"),
        (status = 401, description = "Missing x-user-id header"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    params(("x-user-id" = String, Header, description = "The authenticated user."))
)]
pub async fn get_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
) -> Response {
    respond(app_state.gateway.get_profile(&user_id).await, StatusCode::OK)
}

/// Create or replace the caller's student profile.
///
/// Existing spaces keep their language; new ones default to the saved one.
#[utoipa::path(
    put,
    path = "/profile",
    request_body = ProfileRequest,
    responses(
        (status = 200, description = "The saved profile"),
        (status = 400, description = "Unsupported language", body = ErrorBody),
        (status = 401, description = "Missing x-user-id header"),
        (status = 500, description = "Internal server error", body = ErrorBody)
    ),
    params(("x-user-id" = String, Header, description = "The authenticated user."))
)]
pub async fn save_profile_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(UserId(user_id)): Extension<UserId>,
    Json(payload): Json<ProfileRequest>,
) -> Response {
    let language = match payload.language.parse::<Language>() {
        Ok(language) => language,
        Err(e) => return bad_request(e.to_string()),
    };
    let update = ProfileUpdate {
        grade_level: payload.grade_level,
        language,
        gender: payload.gender,
    };
    respond(app_state.gateway.save_profile(&user_id, &update).await, StatusCode::OK)
}
