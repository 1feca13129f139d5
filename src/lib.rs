//! Chat delivery and read-receipt core: a session-scoped client state
//! machine and the relay server it talks to.

pub mod api;
pub mod app;
pub mod chat;
pub mod error;
pub mod server;
pub mod session;
pub mod storage;
pub mod store;
pub mod transport;
pub mod utils;

pub use api::client::{ApiClient, ChatApi};
pub use api::events::{ChannelEvent, Inbound};
pub use api::models::{ChatSummary, Message, MessageStatus, ReadReceipt, UserRef};
pub use chat::{ChatSession, Notice, NoticeKind};
pub use error::{ChatError, ChatResult};
pub use session::Session;
pub use transport::{Transport, WsTransport};
