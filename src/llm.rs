use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::LlmSettings;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("Rate limited by provider")]
    RateLimited,

    #[error("Provider returned server error {status}")]
    Server { status: u16 },

    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Server { .. } | Self::Timeout { .. } | Self::Connection { .. }
        )
    }
}

/// Single-prompt text completion.
pub trait CompletionClient: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_ms: u64,
    pub max_ms: u64,
}

impl RetryPolicy {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_ms: settings.retry_base_ms,
            max_ms: settings.retry_max_ms,
        }
    }

    /// Delay before retry number `attempt + 1`: doubling from `base_ms`,
    /// capped at `max_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1_u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }
}

/// Calls `client` at most `max_retries + 1` times. Non-retryable errors are
/// returned immediately; the last retryable error is returned once attempts
/// run out.
pub fn complete_with_retry(
    client: &dyn CompletionClient,
    prompt: &str,
    policy: RetryPolicy,
) -> Result<String, LlmError> {
    let mut attempt = 0;
    loop {
        match client.complete(prompt) {
            Ok(text) => return Ok(text),
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let wait = policy.backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    backoff_ms = wait.as_millis() as u64,
                    error = %err,
                    "retrying completion after transient error"
                );
                std::thread::sleep(wait);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// OpenAI-compatible `chat/completions` client.
pub struct HttpCompletionClient {
    client: reqwest::blocking::Client,
    settings: LlmSettings,
    api_key: Option<String>,
}

impl HttpCompletionClient {
    pub fn new(settings: LlmSettings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("failed to build http client")?;
        let api_key = std::env::var(&settings.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                env = %settings.api_key_env,
                "no API key in environment; sending unauthenticated requests"
            );
        }
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.settings.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.settings.temperature,
            "top_p": self.settings.top_p,
            "seed": self.settings.seed,
            "n": self.settings.n,
            "max_tokens": self.settings.max_tokens,
        })
    }
}

impl CompletionClient for HttpCompletionClient {
    fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        let url = format!(
            "{}/chat/completions",
            self.settings.api_base.trim_end_matches('/')
        );
        debug!(url = %url, model = %self.settings.model, "sending completion request");

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().map_err(|err| {
            if err.is_timeout() {
                LlmError::Timeout {
                    timeout_secs: self.settings.timeout_secs,
                }
            } else {
                LlmError::Connection {
                    message: err.to_string(),
                }
            }
        })?;

        let status = response.status();
        let body = response.text().map_err(|err| LlmError::ApiRequest {
            message: format!("failed to read response body: {err}"),
        })?;
        if !status.is_success() {
            return Err(map_http_error(status, &body));
        }

        let value: Value = serde_json::from_str(&body).map_err(|err| LlmError::ResponseParse {
            message: format!("invalid JSON: {err}"),
        })?;
        extract_message_content(&value)
    }
}

fn map_http_error(status: StatusCode, body: &str) -> LlmError {
    match status.as_u16() {
        401 | 403 => LlmError::AuthFailed {
            message: body.chars().take(200).collect(),
        },
        429 => LlmError::RateLimited,
        code if code >= 500 => LlmError::Server { status: code },
        code => LlmError::ApiRequest {
            message: format!("status {code}: {}", body.chars().take(200).collect::<String>()),
        },
    }
}

/// Pulls `choices[0].message.content` out of a completion reply. Some
/// gateways wrap the OpenAI payload in `data.response`.
pub fn extract_message_content(value: &Value) -> Result<String, LlmError> {
    let payload = value
        .get("data")
        .and_then(|data| data.get("response"))
        .unwrap_or(value);
    payload
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .ok_or_else(|| LlmError::ResponseParse {
            message: "missing choices[0].message.content".to_string(),
        })
}

#[cfg(test)]
pub mod testing {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::{CompletionClient, LlmError};

    /// Replays canned replies in order and counts calls.
    pub struct ScriptedClient {
        replies: Mutex<VecDeque<Result<String, LlmError>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedClient {
        pub fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl CompletionClient for ScriptedClient {
        fn complete(&self, _prompt: &str) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies
                .lock()
                .expect("script lock poisoned")
                .pop_front()
                .unwrap_or(Err(LlmError::Connection {
                    message: "script exhausted".to_string(),
                }))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::testing::ScriptedClient;
    use super::{LlmError, RetryPolicy, complete_with_retry, extract_message_content};

    fn instant_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_ms: 0,
            max_ms: 0,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_retries: 10,
            base_ms: 500,
            max_ms: 8000,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(4), Duration::from_millis(8000));
        assert_eq!(policy.backoff(63), Duration::from_millis(8000));
        assert_eq!(policy.backoff(200), Duration::from_millis(8000));
    }

    #[test]
    fn retry_succeeds_after_transient_failures() {
        let client = ScriptedClient::new(vec![
            Err(LlmError::RateLimited),
            Err(LlmError::Timeout { timeout_secs: 1 }),
            Ok("YES".to_string()),
        ]);
        let reply = complete_with_retry(&client, "prompt", instant_policy(3))
            .expect("third attempt should succeed");
        assert_eq!(reply, "YES");
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn retry_gives_up_after_bounded_attempts() {
        let client = ScriptedClient::new(vec![
            Err(LlmError::Server { status: 503 }),
            Err(LlmError::Server { status: 503 }),
            Err(LlmError::Server { status: 503 }),
            Ok("never reached".to_string()),
        ]);
        let err = complete_with_retry(&client, "prompt", instant_policy(2))
            .expect_err("retries should be exhausted");
        assert!(matches!(err, LlmError::Server { status: 503 }));
        assert_eq!(client.call_count(), 3);
    }

    #[test]
    fn retry_stops_on_fatal_error() {
        let client = ScriptedClient::new(vec![Err(LlmError::AuthFailed {
            message: "bad key".to_string(),
        })]);
        let err = complete_with_retry(&client, "prompt", instant_policy(5))
            .expect_err("auth failure is not retryable");
        assert!(matches!(err, LlmError::AuthFailed { .. }));
        assert_eq!(client.call_count(), 1);
    }

    #[test]
    fn extract_message_content_handles_plain_and_wrapped_payloads() {
        let plain = serde_json::json!({"choices": [{"message": {"content": "hi"}}]});
        assert_eq!(extract_message_content(&plain).expect("plain payload"), "hi");

        let wrapped = serde_json::json!({
            "data": {"response": {"choices": [{"message": {"content": "wrapped"}}]}}
        });
        assert_eq!(
            extract_message_content(&wrapped).expect("wrapped payload"),
            "wrapped"
        );

        let broken = serde_json::json!({"choices": []});
        assert!(extract_message_content(&broken).is_err());
    }
}
