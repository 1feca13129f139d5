use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;

use crate::api::models::{ChatSummary, Message, ReadRequest, SendMessageRequest};
use crate::server::error::{ServerError, ServerResult};
use crate::server::ServerState;
use crate::utils::sanitize_content;

pub async fn list_chats(
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> ServerResult<Json<Vec<ChatSummary>>> {
    let user = state.authenticate(&headers)?;
    Ok(Json(state.db.chats_for(&user.id)?))
}

pub async fn list_messages(
    State(state): State<ServerState>,
    Path(other_user_id): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Json<Vec<Message>>> {
    let user = state.authenticate(&headers)?;
    Ok(Json(state.db.messages_between(&user.id, &other_user_id)?))
}

pub async fn post_message(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<SendMessageRequest>,
) -> ServerResult<(StatusCode, Json<Message>)> {
    let user = state.authenticate(&headers)?;
    let content = sanitize_content(&body.content).map_err(ServerError::BadRequest)?;
    if body.receiver_id == user.id {
        return Err(ServerError::BadRequest("cannot message yourself".into()));
    }
    if state.db.user(&body.receiver_id)?.is_none() {
        return Err(ServerError::NotFound(format!("user {}", body.receiver_id)));
    }
    let message = state.db.insert_message(&user.id, &body.receiver_id, &content)?;
    log::info!("stored {} from {} to {}", message.id, message.sender_id, message.receiver_id);
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn post_read(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<ReadRequest>,
) -> ServerResult<StatusCode> {
    let user = state.authenticate(&headers)?;
    if body.reader_id != user.id {
        return Err(ServerError::Forbidden("reader must be the authenticated user".into()));
    }
    state.db.mark_read(&body.message_id, &user.id)?;
    log::debug!("{} read by {}", body.message_id, user.id);
    Ok(StatusCode::OK)
}
