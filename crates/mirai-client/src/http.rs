//! reqwest implementation of [`ChatBackend`].
//!
//! All requests share one client with a cookie store so the server's session
//! cookie rides along on every call. Only the connect phase has a timeout; a
//! stream may stay open as long as the server keeps it open.

use std::time::Duration;

use async_trait::async_trait;
use mirai_core::{ClientError, ConversationDetail, ConversationId, HistoryEntry};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, error, instrument, warn};

use crate::backend::{ChatBackend, StreamRequest, StreamResponse};
use crate::health::HealthReport;
use crate::sse::{decode_stream, DecoderOptions};

const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

#[derive(Clone, Debug)]
pub struct HttpConfig {
    /// Origin serving `/api/...`.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Forwarded as `model` on stream requests that don't set one.
    pub model: Option<String>,
    pub decoder: DecoderOptions,
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout: Duration::from_secs(10),
            model: None,
            decoder: DecoderOptions::default(),
        }
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

pub struct HttpChatBackend {
    client: reqwest::Client,
    base_url: String,
    model: Option<String>,
    decoder: DecoderOptions,
}

impl HttpChatBackend {
    pub fn new(config: HttpConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::InvalidRequest(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model,
            decoder: config.decoder,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn conversation_url(&self, id: ConversationId) -> String {
        self.url(&format!("/api/chat/conversations/{id}"))
    }
}

fn network(e: reqwest::Error) -> ClientError {
    ClientError::Network(e.to_string())
}

/// Turn a non-2xx response into [`ClientError::Status`], keeping the body
/// for diagnostics.
async fn ensure_success(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    error!(status = status.as_u16(), body_len = body.len(), "backend returned error status");
    Err(ClientError::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let response = ensure_success(response).await?;
    let text = response.text().await.map_err(network)?;
    serde_json::from_str(&text).map_err(|e| ClientError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    #[instrument(skip_all, fields(conversation_id = request.conversation_id))]
    async fn open_stream(&self, mut request: StreamRequest) -> Result<StreamResponse, ClientError> {
        if request.model.is_none() {
            request.model.clone_from(&self.model);
        }

        let response = self
            .client
            .post(self.url("/api/chat/stream"))
            .json(&request)
            .send()
            .await
            .map_err(network)?;
        let response = ensure_success(response).await?;

        if response.status() == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            warn!("stream response has no body");
            return Err(ClientError::MissingBody);
        }

        let conversation_id = response
            .headers()
            .get(CONVERSATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(ConversationId::parse_header);
        debug!(header_conversation_id = ?conversation_id, "stream opened");

        let events = decode_stream(response.bytes_stream(), self.decoder);
        Ok(StreamResponse {
            conversation_id,
            events: Box::pin(events),
        })
    }

    #[instrument(skip_all)]
    async fn list_conversations(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        let response = self
            .client
            .get(self.url("/api/chat/conversations"))
            .send()
            .await
            .map_err(network)?;
        let entries: Vec<HistoryEntry> = read_json(response).await?;
        debug!(count = entries.len(), "conversations listed");
        Ok(entries)
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationDetail, ClientError> {
        let response = self
            .client
            .get(self.conversation_url(id))
            .send()
            .await
            .map_err(network)?;
        read_json(response).await
    }

    #[instrument(skip_all)]
    async fn create_conversation(&self) -> Result<HistoryEntry, ClientError> {
        let response = self
            .client
            .post(self.url("/api/chat/conversations"))
            .send()
            .await
            .map_err(network)?;
        read_json(response).await
    }

    #[instrument(skip(self, title), fields(conversation_id = %id))]
    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<HistoryEntry, ClientError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ClientError::InvalidRequest(
                "title must be a non-empty string".to_string(),
            ));
        }
        let response = self
            .client
            .patch(self.conversation_url(id))
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .map_err(network)?;
        read_json(response).await
    }

    #[instrument(skip(self), fields(conversation_id = %id))]
    async fn delete_conversation(&self, id: ConversationId) -> Result<(), ClientError> {
        let response = self
            .client
            .delete(self.conversation_url(id))
            .send()
            .await
            .map_err(network)?;
        ensure_success(response).await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn health(&self) -> Result<HealthReport, ClientError> {
        let response = self
            .client
            .get(self.url("/api/health"))
            .send()
            .await
            .map_err(network)?;
        let status = response.status();
        let raw = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);
        if !status.is_success() {
            warn!(status = status.as_u16(), "health endpoint returned error status");
            return Ok(HealthReport::unavailable(raw));
        }
        Ok(HealthReport::from_body(raw))
    }
}
