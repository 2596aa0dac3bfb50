//! REST chat backend
//!
//! Endpoints, relative to the API base URL:
//! - `POST api/chat` with an [`OutgoingMessage`], answered by a [`SendReceipt`]
//! - `GET api/workflows/{id}/messages[?project_id=]`, answered by `{"messages": [...]}`
//! - `POST api/workflows/{id}/cancel[?project_id=]`

use crate::backoff::retry_with_backoff;
use crate::config::TransportConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowlens_core::{
    ChatBackend, ChatMessage, MessageRole, MessageStatus, OutgoingMessage, SendReceipt,
};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

const CHAT_PATH: &str = "api/chat";

/// Longest error body kept in [`Error::Status`]
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    messages: Vec<HistoryRecord>,
}

#[derive(Debug, Deserialize)]
struct HistoryRecord {
    #[serde(default)]
    id: Option<String>,
    role: MessageRole,
    #[serde(alias = "message")]
    content: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl HistoryRecord {
    fn into_message(self, workflow_id: &str) -> ChatMessage {
        let status = match self.role {
            MessageRole::User => MessageStatus::Sent,
            MessageRole::Assistant | MessageRole::System => MessageStatus::Delivered,
        };
        ChatMessage {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            role: self.role,
            content: self.content,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            workflow_id: Some(workflow_id.to_string()),
            status,
            metadata: self.metadata,
        }
    }
}

/// Chat backend talking to the server's REST API
pub struct HttpChatBackend {
    client: Client,
    config: TransportConfig,
}

impl HttpChatBackend {
    /// Create a backend
    pub fn new(config: TransportConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(Self { client, config })
    }

    fn workflow_endpoint(
        &self,
        workflow_id: &str,
        action: &str,
        project_id: Option<&str>,
    ) -> Result<Url> {
        let mut url = self.config.api_endpoint("api/workflows/")?;
        url.path_segments_mut()
            .map_err(|()| Error::InvalidResponse("api url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(workflow_id)
            .push(action);
        if let Some(project_id) = project_id {
            url.query_pairs_mut().append_pair("project_id", project_id);
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(self.config.request_timeout.as_millis() as u64)
            } else {
                Error::from(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(Error::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_history(
        &self,
        project_id: Option<&str>,
        workflow_id: &str,
    ) -> Result<Vec<ChatMessage>> {
        let url = self.workflow_endpoint(workflow_id, "messages", project_id)?;
        let response = self.execute(self.client.get(url)).await?;
        let history: HistoryResponse = response.json().await?;

        Ok(history
            .messages
            .into_iter()
            .map(|record| record.into_message(workflow_id))
            .collect())
    }
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, message), fields(message_id = %message.message_id))]
    async fn send_message(&self, message: OutgoingMessage) -> flowlens_core::Result<SendReceipt> {
        let url = self.config.api_endpoint(CHAT_PATH)?;
        let response = self.execute(self.client.post(url).json(&message)).await?;
        let receipt: SendReceipt = response.json().await.map_err(Error::from)?;
        debug!(workflow_id = ?receipt.workflow_id, "Message accepted");
        Ok(receipt)
    }

    #[instrument(skip(self))]
    async fn load_history(
        &self,
        project_id: Option<&str>,
        workflow_id: &str,
    ) -> flowlens_core::Result<Vec<ChatMessage>> {
        let messages = retry_with_backoff(
            &self.config.request_retry,
            || self.fetch_history(project_id, workflow_id),
            Error::is_transient,
        )
        .await
        .map_err(|e| e.last_error)?;

        debug!(count = messages.len(), "History loaded");
        Ok(messages)
    }

    #[instrument(skip(self))]
    async fn cancel_workflow(
        &self,
        project_id: Option<&str>,
        workflow_id: &str,
    ) -> flowlens_core::Result<()> {
        let url = self.workflow_endpoint(workflow_id, "cancel", project_id)?;
        self.execute(self.client.post(url)).await?;
        Ok(())
    }
}
