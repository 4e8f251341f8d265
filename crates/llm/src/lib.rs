//! Client for the Gemini File Search API: stores, uploads with operation polling, and
//! store-grounded generation.

mod ask;
mod stores;
mod types;
mod upload;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use storekeep_core::{AppConfig, ChunkingConfig, PollPolicy, Result, StorekeepError};

pub use ask::NO_RESPONSE;
pub use types::{Answer, Citation, Operation, OperationError, RemoteStore, UploadedDocument};
pub use upload::UploadRequest;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Clone)]
pub struct GeminiClient {
    http: Client,
    api_key: String,
    base_url: String,
    upload_base_url: String,
    poll: PollPolicy,
    chunking: ChunkingConfig,
    temperature: f64,
}

impl GeminiClient {
    pub fn new(config: &AppConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            api_key: config.api_key.clone(),
            upload_base_url: upload_base(&base_url),
            base_url,
            poll: config.poll,
            chunking: config.chunking,
            temperature: config.temperature,
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn upload_url(&self, path: &str) -> String {
        format!("{}/{}", self.upload_base_url, path.trim_start_matches('/'))
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(API_KEY_HEADER, &self.api_key)
    }
}

/// Media uploads go through `/upload/<version>` rather than the plain API root.
fn upload_base(base: &str) -> String {
    if base.contains("/v1beta") {
        base.replacen("/v1beta", "/upload/v1beta", 1)
    } else if base.contains("/v1/") || base.ends_with("/v1") {
        base.replacen("/v1", "/upload/v1", 1)
    } else {
        format!("{base}/upload")
    }
}

async fn send(builder: RequestBuilder, operation: &str) -> Result<reqwest::Response> {
    builder
        .send()
        .await
        .map_err(|err| StorekeepError::transport(format!("{operation}: {}", err.without_url())))
}

async fn decode_body<T: DeserializeOwned>(
    response: reqwest::Response,
    operation: &str,
) -> Result<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| StorekeepError::transport(format!("{operation}: {}", err.without_url())))?;
    if !status.is_success() {
        return Err(StorekeepError::Remote {
            operation: operation.to_string(),
            status: status.as_u16(),
            message: error_message(&body),
        });
    }
    let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
    serde_json::from_str(body).map_err(|err| {
        StorekeepError::Other(format!("failed to decode {operation} response: {err}"))
    })
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_base_inserts_upload_segment() {
        assert_eq!(
            upload_base("https://generativelanguage.googleapis.com/v1beta"),
            "https://generativelanguage.googleapis.com/upload/v1beta"
        );
        assert_eq!(upload_base("http://localhost:9/v1"), "http://localhost:9/upload/v1");
        assert_eq!(upload_base("http://localhost:9"), "http://localhost:9/upload");
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let body = r#"{"error":{"code":404,"message":"Store not found","status":"NOT_FOUND"}}"#;
        assert_eq!(error_message(body), "Store not found");
        assert_eq!(error_message("  gateway timeout \n"), "gateway timeout");
    }
}
