use axum::{Extension, Json, extract::State, http::StatusCode};
use uuid::Uuid;

use connect_types::api::{ChatSummary, Claims, OpenChatRequest, OpenChatResponse, SendMessageRequest};
use connect_types::models::{ChatItem, Message};

use crate::error::{ApiJson, ApiPath, ServiceError, ServiceResult};
use crate::state::AppState;

pub async fn list_chats(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ServiceResult<Json<Vec<ChatSummary>>> {
    Ok(Json(state.chats.list_chats(claims.sub).await?))
}

/// Opens (or reuses) a chat with another user, optionally sending a first
/// message. 201 when a chat was created, 200 when an existing one matched.
pub async fn open_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiJson(req): ApiJson<OpenChatRequest>,
) -> ServiceResult<(StatusCode, Json<OpenChatResponse>)> {
    let participant_id = req.participant_id.ok_or_else(|| ServiceError::missing("participantId"))?;
    let item = match (req.item_id, req.item_type) {
        (Some(item_id), Some(item_type)) => Some(ChatItem { item_id, item_type }),
        (None, None) => None,
        _ => return Err(ServiceError::validation("itemId and itemType must be given together")),
    };

    let outcome = state.chats.open_or_reuse(claims.sub, participant_id, item).await?;
    let chat_id = outcome.chat().id;

    if let Some(text) = req.message.filter(|t| !t.trim().is_empty()) {
        state.chats.send(chat_id, claims.sub, &text).await?;
    }

    let status = if outcome.created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(OpenChatResponse {
            chat_id,
            created: outcome.created(),
        }),
    ))
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(chat_id): ApiPath<Uuid>,
) -> ServiceResult<Json<Vec<Message>>> {
    Ok(Json(state.chats.list(chat_id, claims.sub).await?))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    ApiPath(chat_id): ApiPath<Uuid>,
    ApiJson(req): ApiJson<SendMessageRequest>,
) -> ServiceResult<(StatusCode, Json<Message>)> {
    let text = req.text.unwrap_or_default();
    let message = state.chats.send(chat_id, claims.sub, &text).await?;
    Ok((StatusCode::CREATED, Json(message)))
}
