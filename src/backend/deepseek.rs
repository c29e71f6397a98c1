use super::openai_compat::OpenAiCompatClient;
use super::{BackendError, ChatMessage, ModelBackend, SpeechRequest};
use serde_json::json;
use std::time::Duration;

const PROVIDER: &str = "deepseek";
const DEFAULT_BASE_URL: &str = "https://api.deepseek.com/v1";
const DEFAULT_CHAT_MODEL: &str = "deepseek-chat";

/// DeepSeek chat API. It has no speech endpoint, so pair it with another speech provider.
pub struct DeepSeekBackend {
    client: OpenAiCompatClient,
    chat_model: String,
}

impl DeepSeekBackend {
    pub fn new(
        api_key: &str,
        base_url: Option<&str>,
        chat_model: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            client: OpenAiCompatClient::new(
                PROVIDER,
                base_url.unwrap_or(DEFAULT_BASE_URL),
                api_key,
                timeout,
            )?,
            chat_model: chat_model.unwrap_or(DEFAULT_CHAT_MODEL).to_string(),
        })
    }
}

impl ModelBackend for DeepSeekBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        let body = json!({
            "model": self.chat_model,
            "messages": messages,
            "stream": false,
            "max_tokens": 1000,
            "temperature": 0.7,
        });
        self.client.chat_completion(&body)
    }

    fn synthesize(&self, _request: &SpeechRequest) -> Result<Vec<u8>, BackendError> {
        Err(BackendError::Unsupported {
            provider: PROVIDER,
            operation: "speech synthesis",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::speech::SpeechParams;

    #[test]
    fn synthesize_is_unsupported() {
        let backend =
            DeepSeekBackend::new("key", None, None, Duration::from_secs(1)).expect("backend");
        let request =
            SpeechRequest::new("你好", &SpeechParams::default()).expect("valid request");
        match backend.synthesize(&request) {
            Err(BackendError::Unsupported { provider, .. }) => assert_eq!(provider, "deepseek"),
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }
}
