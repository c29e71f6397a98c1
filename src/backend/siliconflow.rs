use super::openai_compat::OpenAiCompatClient;
use super::speech::SPEECH_MODEL;
use super::{BackendError, ChatMessage, ModelBackend, SpeechRequest};
use serde_json::{json, Value};
use std::time::Duration;

const PROVIDER: &str = "siliconflow";
const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";
const DEFAULT_CHAT_MODEL: &str = "Pro/deepseek-ai/DeepSeek-V3";

/// SiliconFlow hosts both the chat model and CosyVoice speech synthesis.
pub struct SiliconFlowBackend {
    client: OpenAiCompatClient,
    chat_model: String,
}

impl SiliconFlowBackend {
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

    fn chat_body(&self, messages: &[ChatMessage]) -> Value {
        json!({
            "model": self.chat_model,
            "messages": messages,
            "stream": false,
            "max_tokens": 1000,
            "temperature": 0.7,
            "top_p": 0.7,
            "top_k": 50,
            "frequency_penalty": 0.5,
            "n": 1,
            "response_format": {"type": "text"},
        })
    }
}

impl ModelBackend for SiliconFlowBackend {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    fn chat(&self, messages: &[ChatMessage]) -> Result<String, BackendError> {
        self.client.chat_completion(&self.chat_body(messages))
    }

    fn synthesize(&self, request: &SpeechRequest) -> Result<Vec<u8>, BackendError> {
        self.client.audio_speech(&request.to_body(SPEECH_MODEL))
    }
}
