use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::{ApiError, ValidationErrorBuilder};
use super::session::CurrentUser;
use super::validation::validate_message;
use crate::db::{
    ConversationMessagesResponse, ConversationThread, CreateConversationResponse,
    SendMessageRequest, SendMessageResponse, User,
};
use crate::AppState;

/// Load a conversation owned by `user`. Unknown ids, ids owned by someone
/// else and non-numeric ids all read as "not found".
async fn owned_conversation(
    state: &AppState,
    user: &User,
    id: &str,
) -> Result<ConversationThread, ApiError> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::not_found("Conversation not found"))?;

    ConversationThread::get_for_user(&state.db, user.id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Conversation not found"))
}

/// Start a new conversation backed by a fresh assistant thread
///
/// POST /conversations
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<(StatusCode, Json<CreateConversationResponse>), ApiError> {
    let thread_id = state.assistant.create_thread().await?;
    let conversation = ConversationThread::create(
        &state.db,
        user.id,
        &thread_id,
        state.assistant.assistant_id(),
    )
    .await
    .map_err(|e| {
        tracing::warn!(
            user_id = user.id,
            thread_id = %thread_id,
            "Assistant thread orphaned, conversation could not be stored"
        );
        ApiError::from(e)
    })?;

    tracing::info!(
        user_id = user.id,
        conversation_id = conversation.id,
        "Conversation created"
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateConversationResponse {
            conversation_id: conversation.id,
        }),
    ))
}

/// GET /conversations
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<ConversationThread>>, ApiError> {
    let conversations = ConversationThread::list_for_user(&state.db, user.id).await?;
    Ok(Json(conversations))
}

/// Send a message and wait for the assistant's reply
///
/// POST /conversations/:id/messages
pub async fn send_message(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<Json<SendMessageResponse>, ApiError> {
    let Json(request) = payload?;
    let message = request.message.unwrap_or_default();

    let mut errors = ValidationErrorBuilder::new();
    errors.check("message", validate_message(&message));
    errors.finish()?;

    let conversation = owned_conversation(&state, &user, &id).await?;
    let assistant_id = conversation
        .assistant_id
        .as_deref()
        .unwrap_or_else(|| state.assistant.assistant_id());

    let response = state
        .assistant
        .send_message(&conversation.thread_id, assistant_id, &message)
        .await?;

    Ok(Json(SendMessageResponse {
        conversation_id: conversation.id,
        response,
    }))
}

/// Full message history of a conversation, oldest first
///
/// GET /conversations/:id/messages
pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ConversationMessagesResponse>, ApiError> {
    let conversation = owned_conversation(&state, &user, &id).await?;
    let messages = state
        .assistant
        .list_messages(&conversation.thread_id)
        .await?;

    Ok(Json(ConversationMessagesResponse {
        conversation_id: conversation.id,
        messages,
    }))
}
