//! In-memory view of the user's conversations.
//!
//! The store is plain synchronous state owned by one [`crate::chat::ChatSession`].
//! Every mutation is matched by message id, never by position, so an
//! optimistic entry can be reconciled while unrelated events are appended
//! around it.

use std::collections::{HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};

use crate::api::models::{ChatSummary, Message, MessageStatus};

/// Client-local id of a message that has not been persisted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempId(u64);

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKey {
    Pending(TempId),
    Confirmed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocalMessage {
    pub key: MessageKey,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: MessageStatus,
}

impl LocalMessage {
    fn from_server(msg: Message, me: &str) -> Self {
        let status = if msg.sender_id == me {
            msg.status.unwrap_or(MessageStatus::Sent)
        } else {
            // anything that reached us is at least delivered
            msg.status.unwrap_or(MessageStatus::Delivered).max(MessageStatus::Delivered)
        };
        Self {
            key: MessageKey::Confirmed(msg.id),
            sender_id: msg.sender_id,
            receiver_id: msg.receiver_id,
            content: msg.content,
            timestamp: msg.timestamp,
            status,
        }
    }

    pub fn server_id(&self) -> Option<&str> {
        match &self.key {
            MessageKey::Confirmed(id) => Some(id),
            MessageKey::Pending(_) => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.key, MessageKey::Pending(_))
    }

    /// Moves the status forward. Returns false if `to` is not ahead.
    fn advance(&mut self, to: MessageStatus) -> bool {
        if to > self.status {
            self.status = to;
            true
        } else {
            false
        }
    }
}

/// Outcome of applying an incoming `newMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Appended,
    Advanced,
    Ignored,
}

#[derive(Debug)]
pub struct MessageStore {
    user_id: String,
    chats: Vec<ChatSummary>,
    conversations: HashMap<String, Vec<LocalMessage>>,
    next_temp: u64,
}

impl MessageStore {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            chats: Vec::new(),
            conversations: HashMap::new(),
            next_temp: 1,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn chats(&self) -> &[ChatSummary] {
        &self.chats
    }

    pub fn messages(&self, peer: &str) -> &[LocalMessage] {
        self.conversations.get(peer).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn find(&self, message_id: &str) -> Option<&LocalMessage> {
        self.conversations
            .values()
            .flat_map(|seq| seq.iter())
            .find(|m| m.server_id() == Some(message_id))
    }

    fn find_mut(&mut self, message_id: &str) -> Option<&mut LocalMessage> {
        self.conversations
            .values_mut()
            .flat_map(|seq| seq.iter_mut())
            .find(|m| m.server_id() == Some(message_id))
    }

    /// Replaces the chat list. A peer listed twice keeps its first entry only.
    pub fn replace_chats(&mut self, chats: Vec<ChatSummary>) {
        let mut seen = HashSet::new();
        let before = chats.len();
        self.chats = chats
            .into_iter()
            .filter(|c| seen.insert(c.user.id.clone()))
            .collect();
        if self.chats.len() != before {
            log::warn!("chat list contained {} duplicate conversation(s)", before - self.chats.len());
        }
    }

    /// Replaces the whole sequence for `peer` with server history. A status
    /// already known locally is kept when the server reports an earlier one.
    pub fn replace_messages(&mut self, peer: &str, history: Vec<Message>) {
        let me = self.user_id.clone();
        let known: HashMap<String, MessageStatus> = self
            .messages(peer)
            .iter()
            .filter_map(|m| m.server_id().map(|id| (id.to_string(), m.status)))
            .collect();
        let mut seen = HashSet::new();
        let seq = history
            .into_iter()
            .filter(|m| seen.insert(m.id.clone()))
            .map(|m| {
                let mut local = LocalMessage::from_server(m, &me);
                if let Some(status) = local.server_id().and_then(|id| known.get(id)) {
                    local.advance(*status);
                }
                local
            })
            .collect();
        self.conversations.insert(peer.to_string(), seq);
    }

    /// Appends an optimistic entry for an outgoing message.
    pub fn insert_pending(&mut self, receiver_id: &str, content: &str) -> TempId {
        let temp = TempId(self.next_temp);
        self.next_temp += 1;
        let entry = LocalMessage {
            key: MessageKey::Pending(temp),
            sender_id: self.user_id.clone(),
            receiver_id: receiver_id.to_string(),
            content: content.to_string(),
            timestamp: Utc::now(),
            status: MessageStatus::Sending,
        };
        self.conversations.entry(receiver_id.to_string()).or_default().push(entry);
        temp
    }

    /// Swaps the pending entry for the persisted message. If the server id is
    /// already present (it arrived over the channel first) the pending entry
    /// is dropped instead so the id stays unique.
    pub fn confirm(&mut self, temp: TempId, persisted: Message) -> bool {
        let me = self.user_id.clone();
        let Some(seq) = self.conversations.values_mut().find(|seq| {
            seq.iter().any(|m| m.key == MessageKey::Pending(temp))
        }) else {
            return false;
        };
        let Some(pos) = seq.iter().position(|m| m.key == MessageKey::Pending(temp)) else {
            return false;
        };
        if let Some(dup) = seq.iter().position(|m| m.server_id() == Some(persisted.id.as_str())) {
            seq[dup].advance(MessageStatus::Sent);
            seq.remove(pos);
            return true;
        }
        seq[pos] = LocalMessage::from_server(persisted.with_status(MessageStatus::Sent), &me);
        true
    }

    /// Removes a pending entry after a failed persist.
    pub fn rollback(&mut self, temp: TempId) -> bool {
        for seq in self.conversations.values_mut() {
            if let Some(pos) = seq.iter().position(|m| m.key == MessageKey::Pending(temp)) {
                seq.remove(pos);
                return true;
            }
        }
        false
    }

    /// Applies a broadcast message. Duplicates never grow the sequence; an
    /// echo of our own message can only move its status forward.
    pub fn apply_new_message(&mut self, msg: Message) -> Applied {
        let me = self.user_id.clone();
        if let Some(existing) = self.find_mut(&msg.id) {
            let own = existing.sender_id == me;
            let advanced = match msg.status {
                Some(status) if own && status >= MessageStatus::Delivered => existing.advance(status),
                _ => false,
            };
            return if advanced { Applied::Advanced } else { Applied::Ignored };
        }
        let peer = msg.peer_of(&me).to_string();
        let local = LocalMessage::from_server(msg, &me);
        self.conversations.entry(peer).or_default().push(local);
        Applied::Appended
    }

    /// Marks a message read. Pending and unknown ids are left alone.
    pub fn apply_read(&mut self, message_id: &str) -> bool {
        match self.find_mut(message_id) {
            Some(m) => m.advance(MessageStatus::Read),
            None => false,
        }
    }

    /// Confirmed messages from `peer` to us that still need a read ack,
    /// as `(message id, sender id)` pairs.
    pub fn unread_from(&self, peer: &str) -> Vec<(String, String)> {
        self.messages(peer)
            .iter()
            .filter(|m| m.receiver_id == self.user_id && m.status < MessageStatus::Read)
            .filter_map(|m| m.server_id().map(|id| (id.to_string(), m.sender_id.clone())))
            .collect()
    }

    /// Updates the chat list row for the message's conversation. Returns
    /// false when the conversation is not in the list yet.
    pub fn touch_summary(&mut self, msg: &Message) -> bool {
        let peer = msg.peer_of(&self.user_id);
        let Some(pos) = self.chats.iter().position(|c| c.user.id == peer) else {
            return false;
        };
        if msg.timestamp >= self.chats[pos].timestamp {
            let mut chat = self.chats.remove(pos);
            chat.last_message = msg.content.clone();
            chat.timestamp = msg.timestamp;
            self.chats.insert(0, chat);
        }
        true
    }
}
