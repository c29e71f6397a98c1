use super::BackendError;
use crate::log_debug;
use serde_json::Value;
use std::time::Duration;

/// Blocking client for providers speaking the OpenAI REST dialect.
pub(super) struct OpenAiCompatClient {
    provider: &'static str,
    base_url: String,
    api_key: String,
    http: reqwest::blocking::Client,
}

impl OpenAiCompatClient {
    pub(super) fn new(
        provider: &'static str,
        base_url: &str,
        api_key: &str,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| BackendError::Transport {
                provider,
                detail: err.to_string(),
            })?;
        Ok(Self {
            provider,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.trim().to_string(),
            http,
        })
    }

    pub(super) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn post(&self, path: &str, body: &Value) -> Result<reqwest::blocking::Response, BackendError> {
        let url = self.endpoint(path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .map_err(|err| self.transport(err))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            log_debug(&format!(
                "{} POST {path} failed with HTTP {}",
                self.provider,
                status.as_u16()
            ));
            return Err(BackendError::Http {
                provider: self.provider,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn transport(&self, err: reqwest::Error) -> BackendError {
        BackendError::Transport {
            provider: self.provider,
            detail: err.to_string(),
        }
    }

    /// POST `/chat/completions` and pull the reply text out of the first choice.
    pub(super) fn chat_completion(&self, body: &Value) -> Result<String, BackendError> {
        let response = self.post("chat/completions", body)?;
        let value: Value = response.json().map_err(|err| self.transport(err))?;
        reply_text(&value).ok_or(BackendError::EmptyReply {
            provider: self.provider,
        })
    }

    /// POST `/audio/speech` and return the encoded audio body.
    pub(super) fn audio_speech(&self, body: &Value) -> Result<Vec<u8>, BackendError> {
        let response = self.post("audio/speech", body)?;
        let bytes = response.bytes().map_err(|err| self.transport(err))?;
        if bytes.is_empty() {
            return Err(BackendError::EmptyReply {
                provider: self.provider,
            });
        }
        Ok(bytes.to_vec())
    }
}

/// `choices[0].message.content`, falling back to the legacy `choices[0].text`.
pub(super) fn reply_text(value: &Value) -> Option<String> {
    let choice = value.get("choices")?.get(0)?;
    choice
        .get("message")
        .and_then(|message| message.get("content"))
        .or_else(|| choice.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_text_prefers_message_content() {
        let value = json!({"choices": [{"message": {"content": "hi"}, "text": "old"}]});
        assert_eq!(reply_text(&value).as_deref(), Some("hi"));
    }

    #[test]
    fn reply_text_falls_back_to_text_field() {
        let value = json!({"choices": [{"text": "legacy"}]});
        assert_eq!(reply_text(&value).as_deref(), Some("legacy"));
    }

    #[test]
    fn reply_text_missing_choices_is_none() {
        assert!(reply_text(&json!({"choices": []})).is_none());
        assert!(reply_text(&json!({"error": "boom"})).is_none());
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = OpenAiCompatClient::new(
            "test",
            "https://api.example.com/v1/",
            "key",
            Duration::from_secs(1),
        )
        .expect("client");
        assert_eq!(
            client.endpoint("/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
    }
}
