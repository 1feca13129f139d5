use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;

use crate::api::models::{ChatSummary, ErrorBody, Message, ReadRequest, SendMessageRequest};
use crate::error::{ChatError, ChatResult};
use crate::session::Session;
use crate::utils::{bearer, normalize_url};

const FALLBACK_ERROR: &str = "An unexpected error occurred";

/// REST side of the chat backend.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn chats(&self) -> ChatResult<Vec<ChatSummary>>;
    async fn messages(&self, other_user_id: &str) -> ChatResult<Vec<Message>>;
    async fn persist_message(&self, req: &SendMessageRequest) -> ChatResult<Message>;
    async fn mark_read(&self, req: &ReadRequest) -> ChatResult<()>;
}

pub struct ApiClient {
    http: HttpClient,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: normalize_url(base_url),
            token: token.into(),
        }
    }

    pub fn for_session(base_url: &str, session: &Session) -> Self {
        Self::new(base_url, session.token.clone())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("Authorization", bearer(&self.token))
    }

    async fn check(resp: reqwest::Response) -> ChatResult<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .json::<ErrorBody>()
            .await
            .map(|b| b.error.message)
            .unwrap_or_else(|_| FALLBACK_ERROR.to_string());
        Err(ChatError::Api { status: status.as_u16(), message })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ChatResult<T> {
        let resp = self.with_auth(self.http.get(self.endpoint(path))).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl ChatApi for ApiClient {
    async fn chats(&self) -> ChatResult<Vec<ChatSummary>> {
        self.get_json("/api/chats").await
    }

    async fn messages(&self, other_user_id: &str) -> ChatResult<Vec<Message>> {
        let mut url = url::Url::parse(&self.endpoint("/api/chats/messages/"))?;
        url.path_segments_mut()
            .map_err(|_| ChatError::Config(format!("base url cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .push(other_user_id);
        let resp = self.with_auth(self.http.get(url)).send().await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn persist_message(&self, req: &SendMessageRequest) -> ChatResult<Message> {
        let resp = self
            .with_auth(self.http.post(self.endpoint("/api/chats/messages")))
            .json(req)
            .send()
            .await?;
        let resp = Self::check(resp).await?;
        Ok(resp.json().await?)
    }

    async fn mark_read(&self, req: &ReadRequest) -> ChatResult<()> {
        let resp = self
            .with_auth(self.http.post(self.endpoint("/api/chats/messages/read")))
            .json(req)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
