//! Relay side of the delivery protocol: REST persistence plus the live
//! event channel that routes `newMessage` and `messageRead` between users.

pub mod config;
pub mod db;
pub mod error;
pub mod relay;
pub mod routes;
pub mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::api::models::UserRef;
use config::ServerConfig;
use db::ChatDb;
use error::{ServerError, ServerResult};
use relay::ConnectionRegistry;

#[derive(Clone)]
pub struct ServerState {
    pub db: Arc<ChatDb>,
    pub registry: ConnectionRegistry,
}

impl ServerState {
    pub fn new(db: ChatDb) -> Self {
        Self { db: Arc::new(db), registry: ConnectionRegistry::new() }
    }

    pub fn from_config(config: &ServerConfig) -> ServerResult<Self> {
        config.validate()?;
        let db = match &config.database {
            Some(path) => ChatDb::open(path)?,
            None => ChatDb::in_memory()?,
        };
        for user in &config.users {
            db.upsert_user(user)?;
        }
        log::info!("user directory loaded with {} user(s)", config.users.len());
        Ok(Self::new(db))
    }

    /// Resolves the `Authorization: Bearer <token>` header to a user.
    pub fn authenticate(&self, headers: &HeaderMap) -> ServerResult<UserRef> {
        let token = headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ServerError::Unauthorized)?;
        self.db.user_by_token(token)?.ok_or(ServerError::Unauthorized)
    }
}

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/chats", get(routes::list_chats))
        .route("/api/chats/messages", post(routes::post_message))
        .route("/api/chats/messages/read", post(routes::post_read))
        .route("/api/chats/messages/{other_user_id}", get(routes::list_messages))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
}

/// Binds and serves in the background. Returns the bound address (which
/// matters when the configured port is 0) and a handle on the shared state.
pub async fn spawn(config: &ServerConfig) -> ServerResult<(SocketAddr, ServerState, JoinHandle<()>)> {
    let state = ServerState::from_config(config)?;
    let listener = TcpListener::bind(&config.bind).await?;
    let addr = listener.local_addr()?;
    log::info!("relay listening on {}", addr);
    let app = router(state.clone());
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            log::error!("relay stopped: {}", e);
        }
    });
    Ok((addr, state, handle))
}

/// Serves until the process is stopped.
pub async fn serve(config: &ServerConfig) -> ServerResult<()> {
    let state = ServerState::from_config(config)?;
    let listener = TcpListener::bind(&config.bind).await?;
    log::info!("relay listening on {}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}
