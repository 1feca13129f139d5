//! Live event channel to the relay.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use url::Url;

use crate::api::events::{ChannelEvent, Inbound};
use crate::error::{ChatError, ChatResult};
use crate::utils::bearer;

#[async_trait]
pub trait Transport: Send {
    /// Opens the channel for `user_id` and announces it with `join`.
    /// A no-op when a live channel for the same user already exists.
    async fn connect(&mut self, user_id: &str, inbound: UnboundedSender<Inbound>) -> ChatResult<()>;

    /// Releases the channel. Safe to call when none is open.
    async fn disconnect(&mut self);

    async fn publish(&mut self, event: ChannelEvent) -> ChatResult<()>;

    /// User the channel is joined as, while it is alive.
    fn connected_user(&self) -> Option<&str>;
}

struct Channel {
    user_id: String,
    outbound: UnboundedSender<WsMessage>,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

pub struct WsTransport {
    ws_url: Url,
    token: String,
    channel: Option<Channel>,
}

impl WsTransport {
    pub fn new(ws_url: Url, token: impl Into<String>) -> Self {
        Self { ws_url, token: token.into(), channel: None }
    }

    fn live_channel(&self) -> Option<&Channel> {
        self.channel.as_ref().filter(|c| c.alive.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self, user_id: &str, inbound: UnboundedSender<Inbound>) -> ChatResult<()> {
        if self.connected_user() == Some(user_id) {
            return Ok(());
        }
        self.disconnect().await;

        let mut request = self.ws_url.as_str().into_client_request()?;
        let auth = HeaderValue::from_str(&bearer(&self.token))
            .map_err(|e| ChatError::Config(format!("token is not a valid header value: {}", e)))?;
        request.headers_mut().insert("Authorization", auth);

        let (ws_stream, _) = connect_async(request).await?;
        log::info!("channel connected to {} as {}", self.ws_url, user_id);
        let (mut sink, mut stream) = ws_stream.split();

        let join = ChannelEvent::Join(user_id.to_string()).to_frame()?;
        sink.send(WsMessage::Text(join)).await?;

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WsMessage>();
        let writer = tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = sink.send(msg).await {
                    log::debug!("channel write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let alive = Arc::new(AtomicBool::new(true));
        let reader_alive = alive.clone();
        let reader = tokio::spawn(async move {
            let reason = loop {
                match stream.next().await {
                    Some(Ok(WsMessage::Text(text))) => match ChannelEvent::from_frame(&text) {
                        Ok(event) => {
                            if inbound.send(Inbound::Event(event)).is_err() {
                                break "session dropped".to_string();
                            }
                        }
                        Err(e) => log::warn!("ignoring malformed channel frame: {}", e),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame.map(|f| f.reason.to_string()).unwrap_or_else(|| "closed by server".into());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break e.to_string(),
                    None => break "connection closed".to_string(),
                }
            };
            reader_alive.store(false, Ordering::SeqCst);
            log::warn!("channel disconnected: {}", reason);
            let _ = inbound.send(Inbound::Disconnected(reason));
        });

        self.channel = Some(Channel {
            user_id: user_id.to_string(),
            outbound: out_tx,
            alive,
            reader,
            writer,
        });
        Ok(())
    }

    async fn disconnect(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        // stop the reader first so a deliberate close is not reported as a drop
        channel.reader.abort();
        channel.alive.store(false, Ordering::SeqCst);
        let _ = channel.outbound.send(WsMessage::Close(None));
        drop(channel.outbound);
        let _ = channel.writer.await;
        log::info!("channel for {} released", channel.user_id);
    }

    async fn publish(&mut self, event: ChannelEvent) -> ChatResult<()> {
        let channel = self.live_channel().ok_or(ChatError::NotConnected)?;
        let frame = event.to_frame()?;
        channel
            .outbound
            .send(WsMessage::Text(frame))
            .map_err(|_| ChatError::Transport("channel writer has stopped".into()))?;
        log::debug!("published {}", event.name());
        Ok(())
    }

    fn connected_user(&self) -> Option<&str> {
        self.live_channel().map(|c| c.user_id.as_str())
    }
}
