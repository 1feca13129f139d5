//! Client side of the delivery protocol.
//!
//! A [`ChatSession`] is built at login and dropped at logout. It owns the
//! message store, the REST client and the live channel, and it is the only
//! thing that mutates the store. Failures are rolled back here and reported
//! twice: as an `Err` to the caller and as a [`Notice`] for the UI.

use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::api::client::ChatApi;
use crate::api::events::{ChannelEvent, Inbound};
use crate::api::models::{ChatSummary, Message, MessageStatus, ReadReceipt, ReadRequest, SendMessageRequest};
use crate::error::{ChatError, ChatResult};
use crate::session::Session;
use crate::storage::ChatCache;
use crate::store::{Applied, LocalMessage, MessageStore};
use crate::transport::Transport;
use crate::utils::sanitize_content;

pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Transport,
    Persistence,
    Fetch,
}

/// Non-blocking, user-visible message (a toast).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

pub struct ChatSession {
    session: Option<Session>,
    api: Box<dyn ChatApi>,
    transport: Box<dyn Transport>,
    store: MessageStore,
    cache: Option<ChatCache>,
    notices: UnboundedSender<Notice>,
    inbound_tx: UnboundedSender<Inbound>,
    inbound_rx: UnboundedReceiver<Inbound>,
    active_peer: Option<String>,
    send_timeout: Duration,
}

impl ChatSession {
    /// Returns the session and the receiving end of its notice stream.
    pub fn new(
        session: Session,
        api: Box<dyn ChatApi>,
        transport: Box<dyn Transport>,
    ) -> (Self, UnboundedReceiver<Notice>) {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let store = MessageStore::new(session.user_id());
        let chat = Self {
            session: Some(session),
            api,
            transport,
            store,
            cache: None,
            notices,
            inbound_tx,
            inbound_rx,
            active_peer: None,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        };
        (chat, notice_rx)
    }

    pub fn with_cache(mut self, cache: ChatCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn chats(&self) -> &[ChatSummary] {
        self.store.chats()
    }

    pub fn messages(&self, peer: &str) -> &[LocalMessage] {
        self.store.messages(peer)
    }

    pub fn is_connected(&self) -> bool {
        self.transport.connected_user().is_some()
    }

    fn notify(&self, kind: NoticeKind, text: impl Into<String>) {
        let _ = self.notices.send(Notice { kind, text: text.into() });
    }

    fn user_id(&self) -> ChatResult<String> {
        self.session
            .as_ref()
            .map(|s| s.user_id().to_string())
            .ok_or(ChatError::Unauthenticated)
    }

    pub async fn connect(&mut self) -> ChatResult<()> {
        let user_id = self.user_id()?;
        match self.transport.connect(&user_id, self.inbound_tx.clone()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                log::warn!("channel connect failed: {}", e);
                self.notify(NoticeKind::Transport, "Socket connection failed. Please try again.");
                Err(e)
            }
        }
    }

    pub async fn disconnect(&mut self) {
        self.transport.disconnect().await;
    }

    /// Tears the session down. Later operations fail with `Unauthenticated`.
    pub async fn logout(&mut self) {
        self.transport.disconnect().await;
        self.session = None;
        self.active_peer = None;
    }

    /// Fills the chat list from the local cache, if one is attached.
    pub fn load_cached_chats(&mut self) -> ChatResult<usize> {
        let Some(cache) = self.cache.as_ref() else {
            return Ok(0);
        };
        let cached = cache.cached_chats(None)?;
        let n = cached.len();
        self.store.replace_chats(cached);
        Ok(n)
    }

    pub async fn fetch_chat_list(&mut self) -> ChatResult<()> {
        self.user_id()?;
        match self.api.chats().await {
            Ok(chats) => {
                self.store.replace_chats(chats);
                if let Some(cache) = self.cache.as_mut() {
                    if let Err(e) = cache.replace_chats(self.store.chats()) {
                        log::warn!("failed to cache chat list: {}", e);
                    }
                }
                Ok(())
            }
            Err(e) => {
                log::warn!("fetching chat list failed: {}", e);
                self.notify(NoticeKind::Fetch, "Failed to fetch chats");
                Err(e)
            }
        }
    }

    pub async fn fetch_messages(&mut self, peer: &str) -> ChatResult<()> {
        self.user_id()?;
        match self.api.messages(peer).await {
            Ok(history) => {
                self.store.replace_messages(peer, history);
                Ok(())
            }
            Err(e) => {
                log::warn!("fetching messages with {} failed: {}", peer, e);
                self.notify(NoticeKind::Fetch, "Failed to fetch messages");
                Err(e)
            }
        }
    }

    /// Makes `peer` the visible conversation, loads its history and
    /// acknowledges everything in it addressed to us.
    pub async fn open_conversation(&mut self, peer: &str) -> ChatResult<()> {
        self.active_peer = Some(peer.to_string());
        self.fetch_messages(peer).await?;
        self.mark_visible_read().await;
        Ok(())
    }

    /// Sends `content` to `receiver_id` with an optimistic insert.
    pub async fn send(&mut self, receiver_id: &str, content: &str) -> ChatResult<Message> {
        let Ok(sender_id) = self.user_id() else {
            self.notify(NoticeKind::Persistence, "User not authenticated for sending message.");
            return Err(ChatError::Unauthenticated);
        };
        let content = match sanitize_content(content) {
            Ok(c) => c,
            Err(reason) => {
                self.notify(NoticeKind::Persistence, format!("Message not sent: {}", reason));
                return Err(ChatError::InvalidContent(reason));
            }
        };

        let temp = self.store.insert_pending(receiver_id, &content);
        log::debug!("{} queued {} for {}", sender_id, temp, receiver_id);

        let req = SendMessageRequest { receiver_id: receiver_id.to_string(), content };
        let outcome = match tokio::time::timeout(self.send_timeout, self.api.persist_message(&req)).await {
            Ok(res) => res,
            Err(_) => Err(ChatError::Timeout(self.send_timeout)),
        };

        let persisted = match outcome {
            Ok(m) => m.with_status(MessageStatus::Sent),
            Err(e) => {
                self.store.rollback(temp);
                log::warn!("send to {} failed: {}", receiver_id, e);
                self.notify(NoticeKind::Persistence, "Failed to send message");
                return Err(e);
            }
        };

        self.store.confirm(temp, persisted.clone());
        if !self.store.touch_summary(&persisted) {
            log::debug!("no chat row for {} yet", receiver_id);
        }

        if let Err(e) = self.transport.publish(ChannelEvent::NewMessage(persisted.clone())).await {
            // persisted already; the receiver will see it on next fetch
            log::warn!("broadcast of {} failed: {}", persisted.id, e);
            self.notify(NoticeKind::Transport, "Message saved but not delivered live");
        }
        self.notify(NoticeKind::Info, "Message sent");
        Ok(persisted)
    }

    /// Acknowledges a message as read: REST first, then local state, then the
    /// live receipt for the sender.
    pub async fn mark_read(&mut self, message_id: &str, reader_id: &str, sender_id: &str) -> ChatResult<()> {
        self.user_id()?;
        if let Some(local) = self.store.find(message_id) {
            if local.status == MessageStatus::Read {
                return Ok(());
            }
        }

        let req = ReadRequest { message_id: message_id.to_string(), reader_id: reader_id.to_string() };
        if let Err(e) = self.api.mark_read(&req).await {
            log::warn!("failed to mark {} as read: {}", message_id, e);
            self.notify(NoticeKind::Persistence, "Failed to mark message as read");
            return Err(e);
        }
        self.store.apply_read(message_id);

        let receipt = ReadReceipt {
            message_id: message_id.to_string(),
            reader_id: reader_id.to_string(),
            sender_id: sender_id.to_string(),
        };
        if let Err(e) = self.transport.publish(ChannelEvent::MessageRead(receipt)).await {
            log::warn!("read receipt for {} not broadcast: {}", message_id, e);
        }
        Ok(())
    }

    /// Acknowledges every unread incoming message in the open conversation.
    /// Returns how many were acknowledged.
    pub async fn mark_visible_read(&mut self) -> usize {
        let (Some(peer), Ok(me)) = (self.active_peer.clone(), self.user_id()) else {
            return 0;
        };
        let mut acked = 0;
        for (message_id, sender_id) in self.store.unread_from(&peer) {
            if self.mark_read(&message_id, &me, &sender_id).await.is_ok() {
                acked += 1;
            }
        }
        acked
    }

    pub async fn next_inbound(&mut self) -> Option<Inbound> {
        self.inbound_rx.recv().await
    }

    pub async fn handle_inbound(&mut self, item: Inbound) {
        match item {
            Inbound::Event(event) => self.handle_event(event).await,
            Inbound::Disconnected(reason) => {
                log::warn!("channel lost: {}", reason);
                self.notify(NoticeKind::Transport, "Connection lost. Reconnect to keep receiving messages.");
            }
        }
    }

    pub async fn handle_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::NewMessage(msg) => {
                let Ok(me) = self.user_id() else {
                    return;
                };
                let incoming = msg.receiver_id == me && msg.sender_id != me;
                let from_active = self.active_peer.as_deref() == Some(msg.sender_id.as_str());
                let known_chat = self.store.touch_summary(&msg);
                let (id, sender) = (msg.id.clone(), msg.sender_id.clone());

                let applied = self.store.apply_new_message(msg);
                log::debug!("newMessage {} -> {:?}", id, applied);

                // first message of a conversation, ours or theirs
                if !known_chat {
                    let _ = self.fetch_chat_list().await;
                }
                if incoming && from_active && applied == Applied::Appended {
                    let _ = self.mark_read(&id, &me, &sender).await;
                }
            }
            ChannelEvent::MessageRead(receipt) => {
                if self.store.apply_read(&receipt.message_id) {
                    log::debug!("{} read by {}", receipt.message_id, receipt.reader_id);
                }
            }
            ChannelEvent::Join(user) => {
                log::debug!("ignoring inbound join for {}", user);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};

    use crate::api::models::UserRef;

    #[derive(Default)]
    struct FakeState {
        fail_persist: bool,
        hang_persist: bool,
        fail_read: bool,
        fail_chats: bool,
        fail_messages: bool,
        next_id: u32,
        reads: Vec<ReadRequest>,
        chats: Vec<ChatSummary>,
        history: Vec<Message>,
    }

    #[derive(Clone, Default)]
    struct FakeApi(Arc<Mutex<FakeState>>);

    #[async_trait]
    impl ChatApi for FakeApi {
        async fn chats(&self) -> ChatResult<Vec<ChatSummary>> {
            let st = self.0.lock().unwrap();
            if st.fail_chats {
                return Err(ChatError::Api { status: 500, message: "down".into() });
            }
            Ok(st.chats.clone())
        }

        async fn messages(&self, _other: &str) -> ChatResult<Vec<Message>> {
            let st = self.0.lock().unwrap();
            if st.fail_messages {
                return Err(ChatError::Api { status: 503, message: "history down".into() });
            }
            Ok(st.history.clone())
        }

        async fn persist_message(&self, req: &SendMessageRequest) -> ChatResult<Message> {
            let hang = self.0.lock().unwrap().hang_persist;
            if hang {
                std::future::pending::<()>().await;
            }
            let mut st = self.0.lock().unwrap();
            if st.fail_persist {
                return Err(ChatError::Api { status: 500, message: "db down".into() });
            }
            st.next_id += 1;
            Ok(Message {
                id: format!("srv-{}", st.next_id),
                sender_id: "a".into(),
                receiver_id: req.receiver_id.clone(),
                content: req.content.clone(),
                timestamp: Utc::now(),
                status: None,
            })
        }

        async fn mark_read(&self, req: &ReadRequest) -> ChatResult<()> {
            let mut st = self.0.lock().unwrap();
            if st.fail_read {
                return Err(ChatError::Api { status: 500, message: "nope".into() });
            }
            st.reads.push(req.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct FakeTransport {
        published: Arc<Mutex<Vec<ChannelEvent>>>,
        user: Option<String>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn connect(&mut self, user_id: &str, _inbound: UnboundedSender<Inbound>) -> ChatResult<()> {
            self.user = Some(user_id.to_string());
            Ok(())
        }

        async fn disconnect(&mut self) {
            self.user = None;
        }

        async fn publish(&mut self, event: ChannelEvent) -> ChatResult<()> {
            if self.user.is_none() {
                return Err(ChatError::NotConnected);
            }
            self.published.lock().unwrap().push(event);
            Ok(())
        }

        fn connected_user(&self) -> Option<&str> {
            self.user.as_deref()
        }
    }

    fn user(id: &str) -> UserRef {
        UserRef { id: id.into(), first_name: id.to_uppercase(), last_name: "Test".into() }
    }

    fn session_for(id: &str, api: FakeApi, transport: FakeTransport) -> (ChatSession, UnboundedReceiver<Notice>) {
        ChatSession::new(Session::new(user(id), format!("tok-{id}")), Box::new(api), Box::new(transport))
    }

    fn incoming(id: &str, from: &str, to: &str) -> Message {
        Message {
            id: id.into(),
            sender_id: from.into(),
            receiver_id: to.into(),
            content: "Assalamu alaikum".into(),
            timestamp: Utc::now(),
            status: Some(MessageStatus::Sent),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<Notice>) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn send_confirms_and_broadcasts() {
        let api = FakeApi::default();
        let transport = FakeTransport::default();
        let published = transport.published.clone();
        let (mut chat, mut notices) = session_for("a", api, transport);
        chat.connect().await.unwrap();

        let msg = chat.send("b", "  Assalamu alaikum ").await.unwrap();
        assert_eq!(msg.content, "Assalamu alaikum");

        let seq = chat.messages("b");
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].server_id(), Some("srv-1"));
        assert_eq!(seq[0].status, MessageStatus::Sent);

        let published = published.lock().unwrap();
        match &published[..] {
            [ChannelEvent::NewMessage(m)] => {
                assert_eq!(m.id, "srv-1");
                assert_eq!(m.status, Some(MessageStatus::Sent));
            }
            other => panic!("unexpected broadcasts {other:?}"),
        }
        assert!(drain(&mut notices).iter().any(|n| n.kind == NoticeKind::Info));
    }

    #[tokio::test]
    async fn failed_persist_rolls_back() {
        let api = FakeApi::default();
        api.0.lock().unwrap().fail_persist = true;
        let transport = FakeTransport::default();
        let published = transport.published.clone();
        let (mut chat, mut notices) = session_for("a", api, transport);
        chat.connect().await.unwrap();
        chat.handle_event(ChannelEvent::NewMessage(incoming("m0", "b", "a"))).await;
        let before = chat.messages("b").to_vec();

        assert!(chat.send("b", "hello").await.is_err());
        assert_eq!(chat.messages("b"), before.as_slice());
        assert!(published.lock().unwrap().is_empty());
        assert!(drain(&mut notices).iter().any(|n| n.kind == NoticeKind::Persistence));
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_persist_times_out_and_rolls_back() {
        let api = FakeApi::default();
        api.0.lock().unwrap().hang_persist = true;
        let (chat, _notices) = session_for("a", api, FakeTransport::default());
        let mut chat = chat.with_send_timeout(Duration::from_secs(2));

        let err = chat.send("b", "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Timeout(_)));
        assert!(chat.messages("b").is_empty());
    }

    #[tokio::test]
    async fn send_after_logout_is_rejected_before_insert() {
        let (mut chat, mut notices) = session_for("a", FakeApi::default(), FakeTransport::default());
        chat.logout().await;
        assert!(matches!(chat.send("b", "hello").await, Err(ChatError::Unauthenticated)));
        assert!(chat.messages("b").is_empty());
        assert_eq!(drain(&mut notices).len(), 1);
    }

    #[tokio::test]
    async fn blank_content_never_reaches_the_store() {
        let (mut chat, mut notices) = session_for("a", FakeApi::default(), FakeTransport::default());
        assert!(matches!(chat.send("b", " \u{0007} ").await, Err(ChatError::InvalidContent(_))));
        assert!(chat.messages("b").is_empty());
        let notices = drain(&mut notices);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Persistence);
    }

    #[tokio::test]
    async fn mark_read_round_trip() {
        let api = FakeApi::default();
        let transport = FakeTransport::default();
        let published = transport.published.clone();
        let (mut chat, _notices) = session_for("b", api.clone(), transport);
        chat.connect().await.unwrap();
        chat.handle_event(ChannelEvent::NewMessage(incoming("m1", "a", "b"))).await;
        assert_eq!(chat.messages("a")[0].status, MessageStatus::Delivered);

        chat.mark_read("m1", "b", "a").await.unwrap();

        assert_eq!(api.0.lock().unwrap().reads, vec![ReadRequest { message_id: "m1".into(), reader_id: "b".into() }]);
        assert_eq!(chat.messages("a")[0].status, MessageStatus::Read);
        assert_eq!(
            published.lock().unwrap().last(),
            Some(&ChannelEvent::MessageRead(ReadReceipt {
                message_id: "m1".into(),
                reader_id: "b".into(),
                sender_id: "a".into(),
            }))
        );

        // already read: no second REST call
        chat.mark_read("m1", "b", "a").await.unwrap();
        assert_eq!(api.0.lock().unwrap().reads.len(), 1);
    }

    #[tokio::test]
    async fn failed_read_ack_leaves_status() {
        let api = FakeApi::default();
        api.0.lock().unwrap().fail_read = true;
        let (mut chat, mut notices) = session_for("b", api, FakeTransport::default());
        chat.handle_event(ChannelEvent::NewMessage(incoming("m1", "a", "b"))).await;

        assert!(chat.mark_read("m1", "b", "a").await.is_err());
        assert_eq!(chat.messages("a")[0].status, MessageStatus::Delivered);
        assert!(drain(&mut notices).iter().any(|n| n.kind == NoticeKind::Persistence));
    }

    #[tokio::test]
    async fn open_conversation_acks_unread_history() {
        let api = FakeApi::default();
        api.0.lock().unwrap().history = vec![
            incoming("m1", "a", "b"),
            Message { status: Some(MessageStatus::Read), ..incoming("m2", "a", "b") },
            incoming("m3", "b", "a"),
        ];
        let (mut chat, _notices) = session_for("b", api.clone(), FakeTransport::default());
        chat.open_conversation("a").await.unwrap();

        let reads: Vec<_> = api.0.lock().unwrap().reads.iter().map(|r| r.message_id.clone()).collect();
        assert_eq!(reads, vec!["m1".to_string()]);
        assert!(chat.messages("a")[..2].iter().all(|m| m.status == MessageStatus::Read));
    }

    #[tokio::test]
    async fn incoming_message_in_open_conversation_is_acked() {
        let api = FakeApi::default();
        let (mut chat, _notices) = session_for("b", api.clone(), FakeTransport::default());
        chat.open_conversation("a").await.unwrap();

        chat.handle_event(ChannelEvent::NewMessage(incoming("m5", "a", "b"))).await;
        chat.handle_event(ChannelEvent::NewMessage(incoming("m5", "a", "b"))).await;

        assert_eq!(chat.messages("a").len(), 1);
        assert_eq!(api.0.lock().unwrap().reads.len(), 1);
        assert_eq!(chat.messages("a")[0].status, MessageStatus::Read);
    }

    #[tokio::test]
    async fn read_receipt_updates_sender_copy() {
        let transport = FakeTransport::default();
        let (mut chat, _notices) = session_for("a", FakeApi::default(), transport);
        chat.connect().await.unwrap();
        let sent = chat.send("b", "hello").await.unwrap();

        chat.handle_event(ChannelEvent::NewMessage(sent.clone().with_status(MessageStatus::Delivered))).await;
        assert_eq!(chat.messages("b")[0].status, MessageStatus::Delivered);

        chat.handle_event(ChannelEvent::MessageRead(ReadReceipt {
            message_id: sent.id.clone(),
            reader_id: "b".into(),
            sender_id: "a".into(),
        }))
        .await;
        assert_eq!(chat.messages("b")[0].status, MessageStatus::Read);
        assert_eq!(chat.messages("b").len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_keeps_old_list() {
        let api = FakeApi::default();
        api.0.lock().unwrap().chats = vec![ChatSummary {
            id: "c1".into(),
            user: user("b"),
            last_message: "hi".into(),
            timestamp: Utc::now(),
        }];
        let (chat, mut notices) = session_for("a", api.clone(), FakeTransport::default());
        let mut chat = chat.with_cache(ChatCache::in_memory().unwrap());
        chat.fetch_chat_list().await.unwrap();
        assert_eq!(chat.chats().len(), 1);

        api.0.lock().unwrap().fail_chats = true;
        assert!(chat.fetch_chat_list().await.is_err());
        assert_eq!(chat.chats().len(), 1);
        assert!(drain(&mut notices).iter().any(|n| n.kind == NoticeKind::Fetch));

        assert_eq!(chat.load_cached_chats().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_history_fetch_keeps_sequence() {
        let api = FakeApi::default();
        api.0.lock().unwrap().history = vec![incoming("m1", "a", "b"), incoming("m2", "b", "a")];
        let (mut chat, mut notices) = session_for("b", api.clone(), FakeTransport::default());
        chat.fetch_messages("a").await.unwrap();
        chat.handle_event(ChannelEvent::NewMessage(incoming("m3", "a", "b"))).await;
        let before = chat.messages("a").to_vec();
        drain(&mut notices);

        {
            let mut st = api.0.lock().unwrap();
            st.fail_messages = true;
            st.history.clear();
        }
        let err = chat.fetch_messages("a").await.unwrap_err();
        assert_eq!(err.status(), Some(503));
        assert_eq!(chat.messages("a"), before.as_slice());
        let notices = drain(&mut notices);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Fetch);
    }

    #[tokio::test]
    async fn own_echo_for_new_conversation_refreshes_chat_list() {
        let api = FakeApi::default();
        let (mut chat, _notices) = session_for("a", api.clone(), FakeTransport::default());
        chat.connect().await.unwrap();
        chat.fetch_chat_list().await.unwrap();
        assert!(chat.chats().is_empty());

        let sent = chat.send("b", "first ever").await.unwrap();
        assert!(chat.chats().is_empty());

        // the server now knows the conversation
        api.0.lock().unwrap().chats = vec![ChatSummary {
            id: "c1".into(),
            user: user("b"),
            last_message: "first ever".into(),
            timestamp: sent.timestamp,
        }];
        chat.handle_event(ChannelEvent::NewMessage(sent.with_status(MessageStatus::Delivered))).await;

        assert_eq!(chat.chats().len(), 1);
        assert_eq!(chat.chats()[0].user.id, "b");
        assert_eq!(chat.messages("b").len(), 1);
        assert_eq!(chat.messages("b")[0].status, MessageStatus::Delivered);
    }

    #[tokio::test]
    async fn disconnect_notice_is_surfaced() {
        let (mut chat, mut notices) = session_for("a", FakeApi::default(), FakeTransport::default());
        chat.handle_inbound(Inbound::Disconnected("reset".into())).await;
        assert_eq!(drain(&mut notices)[0].kind, NoticeKind::Transport);
    }
}
