use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, Utf8Bytes, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};

use crate::api::events::ChannelEvent;
use crate::api::models::{MessageStatus, ReadReceipt, UserRef};
use crate::server::error::ServerResult;
use crate::server::ServerState;

/// `GET /ws`: the bearer token is checked before the upgrade; the first
/// frame must then be a `join` naming the same user.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
    headers: HeaderMap,
) -> ServerResult<Response> {
    let user = state.authenticate(&headers)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user)))
}

async fn handle_socket(socket: WebSocket, state: ServerState, user: UserRef) {
    let (mut sink, mut stream) = socket.split();

    let joined = match stream.next().await {
        Some(Ok(WsMessage::Text(text))) => {
            matches!(ChannelEvent::from_frame(text.as_str()), Ok(ChannelEvent::Join(id)) if id == user.id)
        }
        _ => false,
    };
    if !joined {
        log::warn!("socket for {} did not join as itself, closing", user.id);
        let _ = sink
            .send(WsMessage::Close(Some(CloseFrame {
                code: close_code::POLICY,
                reason: Utf8Bytes::from_static("join must name the authenticated user"),
            })))
            .await;
        return;
    }

    let (subscriber_id, mut rx) = state.registry.add_subscriber(&user.id).await;
    log::info!("{} joined the relay", user.id);

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => match ChannelEvent::from_frame(text.as_str()) {
                Ok(event) => relay_event(&state, &user.id, event).await,
                Err(e) => log::warn!("malformed frame from {}: {}", user.id, e),
            },
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                log::debug!("socket of {} errored: {}", user.id, e);
                break;
            }
        }
    }

    state.registry.remove_subscriber(&user.id, subscriber_id).await;
    writer.abort();
    log::info!("{} left the relay", user.id);
}

async fn relay_event(state: &ServerState, user_id: &str, event: ChannelEvent) {
    match event {
        ChannelEvent::Join(id) => {
            if id != user_id {
                log::warn!("{} tried to re-join as {}", user_id, id);
            }
        }
        ChannelEvent::NewMessage(claimed) => relay_new_message(state, user_id, &claimed.id).await,
        ChannelEvent::MessageRead(receipt) => relay_read(state, user_id, receipt).await,
    }
}

/// Forwards the stored copy to the receiver, then echoes it to the sender
/// as `delivered` when at least one receiver socket took it.
async fn relay_new_message(state: &ServerState, user_id: &str, message_id: &str) {
    let stored = match state.db.message(message_id) {
        Ok(Some(m)) if m.sender_id == user_id => m,
        Ok(_) => {
            log::warn!("{} broadcast unknown or foreign message {}", user_id, message_id);
            return;
        }
        Err(e) => {
            log::error!("lookup of {} failed: {}", message_id, e);
            return;
        }
    };
    let base = stored.status.unwrap_or(MessageStatus::Sent);

    let Ok(frame) = ChannelEvent::NewMessage(stored.clone()).to_frame() else {
        return;
    };
    let delivered = state.registry.send_to_user(&stored.receiver_id, &frame).await;

    let echo_status = if delivered > 0 { base.max(MessageStatus::Delivered) } else { base };
    let Ok(echo) = ChannelEvent::NewMessage(stored.clone().with_status(echo_status)).to_frame() else {
        return;
    };
    state.registry.send_to_user(&stored.sender_id, &echo).await;
    log::debug!("relayed {} to {} socket(s) of {}", stored.id, delivered, stored.receiver_id);
}

async fn relay_read(state: &ServerState, user_id: &str, receipt: ReadReceipt) {
    if receipt.reader_id != user_id {
        log::warn!("{} sent a read receipt on behalf of {}", user_id, receipt.reader_id);
        return;
    }
    let valid = match state.db.message(&receipt.message_id) {
        Ok(Some(m)) => {
            m.receiver_id == receipt.reader_id
                && m.sender_id == receipt.sender_id
                && m.status == Some(MessageStatus::Read)
        }
        Ok(None) => false,
        Err(e) => {
            log::error!("lookup of {} failed: {}", receipt.message_id, e);
            false
        }
    };
    if !valid {
        log::warn!("dropping unpersisted or mismatched read receipt for {}", receipt.message_id);
        return;
    }
    let Ok(frame) = ChannelEvent::MessageRead(receipt.clone()).to_frame() else {
        return;
    };
    state.registry.send_to_user(&receipt.sender_id, &frame).await;
    state.registry.send_to_user(&receipt.reader_id, &frame).await;
}
