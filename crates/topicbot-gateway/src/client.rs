//! Backend HTTP client with bounded retry on every call.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;
use topicbot_core::truncate_chars;

use crate::{
    retry::{retry_with_backoff, AttemptFailure, RetryPolicy},
    types::{CreatedSession, MessageResponse},
    CodingBackend, CommandInfo, GatewayError, HealthStatus, MessageReply, ProjectInfo,
    SessionInfo,
};

/// Zero-based attempt counter sent with every request.
pub const RETRY_ATTEMPT_HEADER: &str = "x-topicbot-retry-attempt";

#[derive(Debug, Clone)]
pub struct GatewayClientConfig {
    pub base_url: String,
    pub username: String,
    /// Shared credential; when set every request carries basic auth.
    pub password: Option<String>,
    /// Timeout for non-execution calls.
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for GatewayClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4096".to_string(),
            username: "opencode".to_string(),
            password: None,
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone)]
/// Stateless apart from reqwest's connection pool; clones share it.
pub struct RetryingGatewayClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: Option<String>,
    request_timeout: Duration,
    retry: RetryPolicy,
}

impl RetryingGatewayClient {
    pub fn new(config: GatewayClientConfig) -> Result<Self, GatewayError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("topicbot-gateway"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|error| GatewayError::Operation {
                operation: "client setup".to_string(),
                message: error.to_string(),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
            username: config.username.trim().to_string(),
            password: config
                .password
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            request_timeout: config.request_timeout,
            retry: config.retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}{}", self.base_url, path));
        match self.password.as_deref() {
            Some(password) => builder.basic_auth(&self.username, Some(password)),
            None => builder,
        }
    }

    async fn request_text<F>(&self, operation: &str, mut builder: F) -> Result<String, GatewayError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        retry_with_backoff(&self.retry, operation, |attempt| {
            let request = builder().header(RETRY_ATTEMPT_HEADER, attempt.to_string());
            async move {
                let response = request
                    .send()
                    .await
                    .map_err(|error| AttemptFailure::from_transport(&error))?;
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .map_err(|error| AttemptFailure::from_transport(&error))?;
                if !status.is_success() {
                    return Err(AttemptFailure::Status {
                        status: status.as_u16(),
                        body: truncate_chars(&body, 800),
                    });
                }
                Ok(body)
            }
        })
        .await
    }

    async fn request_json<T, F>(&self, operation: &str, builder: F) -> Result<T, GatewayError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let body = self.request_text(operation, builder).await?;
        decode_body(operation, &body)
    }

    fn get_with_timeout(&self, path: &str) -> reqwest::RequestBuilder {
        self.request(reqwest::Method::GET, path)
            .timeout(self.request_timeout)
    }
}

fn decode_body<T: DeserializeOwned>(operation: &str, body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|error| GatewayError::Malformed {
        operation: operation.to_string(),
        message: error.to_string(),
    })
}

fn parse_message_reply(body: String) -> Result<MessageReply, GatewayError> {
    if body.trim().is_empty() {
        return Ok(MessageReply {
            text: String::new(),
            raw: body,
        });
    }
    let response: MessageResponse = decode_body("send message", &body)?;
    Ok(MessageReply {
        text: response.joined_text(),
        raw: body,
    })
}

#[async_trait]
impl CodingBackend for RetryingGatewayClient {
    async fn health(&self) -> Result<HealthStatus, GatewayError> {
        self.request_json("health check", || self.get_with_timeout("/global/health"))
            .await
    }

    async fn create_session(&self, parent_id: Option<&str>) -> Result<String, GatewayError> {
        let payload = match parent_id {
            Some(parent_id) => json!({ "parentID": parent_id }),
            None => json!({}),
        };
        let created: CreatedSession = self
            .request_json("create session", || {
                self.request(reqwest::Method::POST, "/session")
                    .timeout(self.request_timeout)
                    .json(&payload)
            })
            .await?;
        tracing::info!(session_id = %created.id, "backend session created");
        Ok(created.id)
    }

    async fn send_message(
        &self,
        session_id: &str,
        prompt: &str,
        timeout: Option<Duration>,
    ) -> Result<MessageReply, GatewayError> {
        let path = format!("/session/{session_id}/message");
        let payload = json!({
            "parts": [{ "type": "text", "text": prompt }],
        });
        let body = self
            .request_text("send message", || {
                let builder = self.request(reqwest::Method::POST, &path).json(&payload);
                match timeout {
                    Some(limit) if !limit.is_zero() => builder.timeout(limit),
                    _ => builder,
                }
            })
            .await?;
        parse_message_reply(body)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionInfo>, GatewayError> {
        self.request_json("list sessions", || self.get_with_timeout("/session"))
            .await
    }

    async fn list_projects(&self) -> Result<Vec<ProjectInfo>, GatewayError> {
        self.request_json("list projects", || self.get_with_timeout("/project"))
            .await
    }

    async fn list_commands(&self) -> Result<Vec<CommandInfo>, GatewayError> {
        self.request_json("list commands", || self.get_with_timeout("/command"))
            .await
    }
}
