//! Assistant bridge backed by the OpenAI Assistants (v2) HTTP API.
//!
//! A reply is produced by posting the user message, starting a run and
//! polling the run until it completes, fails, or the configured deadline
//! passes. The run is not cancelled on timeout.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{AssistantBridge, AssistantError, ThreadMessage};
use crate::config::AssistantConfig;

/// Page size when listing thread messages
const PAGE_LIMIT: u32 = 100;

/// How many recent messages to scan for the reply after a run
const REPLY_SCAN_LIMIT: u32 = 20;

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
    #[serde(default)]
    has_more: bool,
    last_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    id: String,
    role: String,
    created_at: i64,
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

impl MessageObject {
    fn text_blocks(&self) -> Vec<String> {
        self.content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_ref().map(|t| t.value.clone()))
            .collect()
    }
}

impl From<MessageObject> for ThreadMessage {
    fn from(message: MessageObject) -> Self {
        Self {
            content: message.text_blocks(),
            id: message.id,
            role: message.role,
            created_at: message.created_at,
        }
    }
}

/// Text of the newest assistant message posted after `prompt_id`.
///
/// `messages` must be newest first. Scanning stops at the prompt, so an
/// answer from an earlier turn is never returned.
fn latest_assistant_reply(messages: &[MessageObject], prompt_id: &str) -> Option<String> {
    messages
        .iter()
        .take_while(|m| m.id != prompt_id)
        .filter(|m| m.role == "assistant")
        .map(|m| m.text_blocks())
        .find(|blocks| !blocks.is_empty())
        .map(|blocks| blocks.join("\n"))
}

pub struct OpenAiAssistant {
    api_key: String,
    assistant_id: String,
    base_url: String,
    poll_interval: Duration,
    run_timeout: Duration,
    client: Client,
}

impl OpenAiAssistant {
    pub fn new(config: &AssistantConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .context("Assistant API key is not configured")?;
        let assistant_id = config
            .assistant_id
            .clone()
            .context("Assistant id is not configured")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        info!(assistant_id = %assistant_id, "Assistant bridge configured");

        Ok(Self {
            api_key,
            assistant_id,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            run_timeout: Duration::from_secs(config.run_timeout_secs),
            client,
        })
    }

    /// Override the polling cadence and deadline
    pub fn with_timing(mut self, poll_interval: Duration, run_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.run_timeout = run_timeout;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, AssistantError> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AssistantError::Api { status, body });
        }

        Ok(response.json().await?)
    }

    async fn wait_for_run(&self, thread_id: &str, mut run: RunObject) -> Result<(), AssistantError> {
        let deadline = Instant::now() + self.run_timeout;

        loop {
            match run.status.as_str() {
                "completed" => return Ok(()),
                "queued" | "in_progress" | "cancelling" => {}
                other => return Err(AssistantError::RunFailed(other.to_string())),
            }

            if Instant::now() >= deadline {
                return Err(AssistantError::Timeout(self.run_timeout.as_secs()));
            }

            tokio::time::sleep(self.poll_interval).await;

            debug!(thread_id, run_id = %run.id, status = %run.status, "Polling assistant run");
            let path = format!("/threads/{}/runs/{}", thread_id, run.id);
            run = self.send(self.request(Method::GET, &path)).await?;
        }
    }
}

#[async_trait]
impl AssistantBridge for OpenAiAssistant {
    fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    async fn create_thread(&self) -> Result<String, AssistantError> {
        let thread: ThreadObject = self
            .send(self.request(Method::POST, "/threads").json(&json!({})))
            .await?;

        info!(thread_id = %thread.id, "Assistant thread created");
        Ok(thread.id)
    }

    async fn send_message(
        &self,
        thread_id: &str,
        assistant_id: &str,
        text: &str,
    ) -> Result<String, AssistantError> {
        let messages_path = format!("/threads/{}/messages", thread_id);
        let prompt: MessageObject = self
            .send(
                self.request(Method::POST, &messages_path)
                    .json(&json!({ "role": "user", "content": text })),
            )
            .await?;

        let run: RunObject = self
            .send(
                self.request(Method::POST, &format!("/threads/{}/runs", thread_id))
                    .json(&json!({ "assistant_id": assistant_id })),
            )
            .await?;

        info!(thread_id, run_id = %run.id, "Assistant run started");
        self.wait_for_run(thread_id, run).await?;

        let limit = REPLY_SCAN_LIMIT.to_string();
        let recent: MessageList = self
            .send(
                self.request(Method::GET, &messages_path)
                    .query(&[("order", "desc"), ("limit", limit.as_str())]),
            )
            .await?;

        latest_assistant_reply(&recent.data, &prompt.id).ok_or(AssistantError::EmptyReply)
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError> {
        let path = format!("/threads/{}/messages", thread_id);
        let limit = PAGE_LIMIT.to_string();
        let mut messages = Vec::new();
        let mut after: Option<String> = None;

        loop {
            let mut query = vec![("order", "asc".to_string()), ("limit", limit.clone())];
            if let Some(cursor) = &after {
                query.push(("after", cursor.clone()));
            }

            let page: MessageList = self
                .send(self.request(Method::GET, &path).query(&query))
                .await?;

            let has_more = page.has_more;
            let last_id = page.last_id;
            messages.extend(page.data.into_iter().map(ThreadMessage::from));

            match (has_more, last_id) {
                (true, Some(id)) => after = Some(id),
                _ => break,
            }
        }

        debug!(thread_id, count = messages.len(), "Fetched thread messages");
        Ok(messages)
    }
}
