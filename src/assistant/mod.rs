mod openai;

pub use openai::OpenAiAssistant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A message stored in an external assistant thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    /// "user" or "assistant"
    pub role: String,
    /// Unix timestamp assigned by the assistant service
    pub created_at: i64,
    /// Text blocks of the message, in order
    pub content: Vec<String>,
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("request to assistant service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("assistant service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("assistant run ended with status '{0}'")]
    RunFailed(String),

    #[error("assistant run did not finish within {0} seconds")]
    Timeout(u64),

    #[error("assistant produced no reply")]
    EmptyReply,
}

/// Exchange of messages with an external assistant, keyed by thread id.
///
/// Failures are reported, never retried; the caller decides what to do.
#[async_trait]
pub trait AssistantBridge: Send + Sync {
    /// The assistant every new conversation is bound to
    fn assistant_id(&self) -> &str;
    /// Open a new thread and return its id
    async fn create_thread(&self) -> Result<String, AssistantError>;
    /// Post `text` as the user and wait for the assistant's reply
    async fn send_message(
        &self,
        thread_id: &str,
        assistant_id: &str,
        text: &str,
    ) -> Result<String, AssistantError>;
    /// All messages of a thread, oldest first
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, AssistantError>;
}
