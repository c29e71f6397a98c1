//! Chat and speech providers behind one interface.
//!
//! The conversation loop only needs two remote operations: a chat completion over
//! role-tagged history and text-to-speech. Each provider implements both (or
//! reports `Unsupported`) and is picked once at startup.

mod deepseek;
mod openai_compat;
mod siliconflow;
pub mod speech;

pub use deepseek::DeepSeekBackend;
pub use siliconflow::SiliconFlowBackend;
pub use speech::{AudioFormat, SpeechParams, SpeechRequest};

use crate::config::{AppConfig, ChatProvider, SpeechProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Who authored a history entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of the conversation history, in the OpenAI wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{provider} returned HTTP {status}: {body}")]
    Http {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("{provider} request failed: {detail}")]
    Transport {
        provider: &'static str,
        detail: String,
    },
    #[error("{provider} returned an empty reply")]
    EmptyReply { provider: &'static str },
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// A remote model provider.
pub trait ModelBackend: Send + Sync {
    /// Short provider label used in logs and errors.
    fn name(&self) -> &'static str;

    /// Send the full history and return the raw reply text.
    fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError>;

    /// Synthesize a validated request into encoded audio bytes.
    fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, BackendError>;
}

/// Build the chat provider selected on the command line.
pub fn chat_backend(config: &AppConfig) -> Result<Arc<dyn ModelBackend>, BackendError> {
    let timeout = Duration::from_secs(config.http_timeout_secs);
    let key = config
        .chat_api_key()
        .ok_or_else(|| BackendError::InvalidRequest("chat API key missing".to_string()))?;
    let backend: Arc<dyn ModelBackend> = match config.chat_provider {
        ChatProvider::Siliconflow => Arc::new(SiliconFlowBackend::new(
            key,
            config.chat_base_url.as_deref(),
            config.chat_model.as_deref(),
            timeout,
        )?),
        ChatProvider::Deepseek => Arc::new(DeepSeekBackend::new(
            key,
            config.chat_base_url.as_deref(),
            config.chat_model.as_deref(),
            timeout,
        )?),
    };
    Ok(backend)
}

/// Build the speech provider, or `None` for text-only replies.
pub fn speech_backend(config: &AppConfig) -> Result<Option<Arc<dyn ModelBackend>>, BackendError> {
    match config.speech_provider {
        SpeechProvider::Off => Ok(None),
        SpeechProvider::Siliconflow => {
            let key = config.siliconflow_api_key.as_deref().ok_or_else(|| {
                BackendError::InvalidRequest("SiliconFlow API key missing".to_string())
            })?;
            let backend =
                SiliconFlowBackend::new(key, None, None, Duration::from_secs(config.http_timeout_secs))?;
            Ok(Some(Arc::new(backend)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_serialize_in_openai_shape() {
        let json = serde_json::to_string(&ChatMessage::user("有人吗？")).expect("serialize");
        assert_eq!(json, r#"{"role":"user","content":"有人吗？"}"#);
    }

    #[test]
    fn messages_round_trip_roles() {
        let parsed: Vec<ChatMessage> = serde_json::from_str(
            r#"[{"role":"system","content":"a"},{"role":"assistant","content":"b"}]"#,
        )
        .expect("parse");
        assert_eq!(parsed[0].role, Role::System);
        assert_eq!(parsed[1], ChatMessage::assistant("b"));
    }

    #[test]
    fn http_error_mentions_status_and_body() {
        let err = BackendError::Http {
            provider: "siliconflow",
            status: 401,
            body: "invalid token".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("401"));
        assert!(text.contains("invalid token"));
    }
}
