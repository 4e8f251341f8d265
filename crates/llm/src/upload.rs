use std::path::{Path, PathBuf};

use reqwest::multipart::{Form, Part};
use serde_json::{json, Value};
use tracing::{debug, info};

use storekeep_core::{
    poll_until, resolve_mime_type, CancellationToken, PollStatus, Result, StorekeepError,
};

use crate::types::{Operation, UploadedDocument};
use crate::{decode_body, send, GeminiClient};

#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub path: PathBuf,
    pub store_name: String,
    pub display_name: Option<String>,
    /// Name the file had before it was staged on disk, used for display and MIME guessing.
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
}

impl UploadRequest {
    pub fn resolved_display_name(&self) -> String {
        non_blank(self.display_name.as_deref())
            .or_else(|| non_blank(self.original_name.as_deref()))
            .map(str::to_string)
            .unwrap_or_else(|| file_name(&self.path))
    }

    pub fn resolved_mime_type(&self) -> String {
        resolve_mime_type(
            &self.path,
            self.original_name.as_deref(),
            self.mime_type.as_deref(),
        )
    }
}

impl GeminiClient {
    /// Uploads a file into a store and waits for indexing to finish.
    pub async fn upload_file(
        &self,
        request: &UploadRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadedDocument> {
        let display_name = request.resolved_display_name();
        let mime_type = request.resolved_mime_type();
        info!(
            path = %request.path.display(),
            store = %request.store_name,
            display_name = %display_name,
            mime_type = %mime_type,
            "uploading file"
        );
        let operation = self
            .begin_upload(request, &display_name, &mime_type)
            .await?;
        let response = self.wait_operation(operation, cancel).await?;
        let document_name = response
            .get("documentName")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StorekeepError::Other("upload operation response missing documentName".to_string())
            })?
            .to_string();
        let parent = response
            .get("parent")
            .and_then(Value::as_str)
            .unwrap_or(&request.store_name)
            .to_string();
        info!(document = %document_name, store = %parent, "file indexed");
        Ok(UploadedDocument {
            document_name,
            parent,
            display_name,
        })
    }

    pub async fn begin_upload(
        &self,
        request: &UploadRequest,
        display_name: &str,
        mime_type: &str,
    ) -> Result<Operation> {
        let bytes = tokio::fs::read(&request.path).await?;
        let metadata = json!({
            "displayName": display_name,
            "mimeType": mime_type,
            "chunkingConfig": {
                "whiteSpaceConfig": {
                    "maxTokensPerChunk": self.chunking.max_tokens_per_chunk,
                    "maxOverlapTokens": self.chunking.max_overlap_tokens,
                }
            }
        });
        let metadata_part = Part::text(metadata.to_string())
            .mime_str("application/json")
            .map_err(StorekeepError::transport)?;
        let file_part = Part::bytes(bytes)
            .file_name(
                non_blank(request.original_name.as_deref())
                    .map(str::to_string)
                    .unwrap_or_else(|| file_name(&request.path)),
            )
            .mime_str(mime_type)
            .map_err(|err| {
                StorekeepError::validation(format!("invalid MIME type {mime_type}: {err}"))
            })?;
        let form = Form::new()
            .part("metadata", metadata_part)
            .part("file", file_part);
        let endpoint = format!(
            "{}:uploadToFileSearchStore",
            request.store_name.trim_end_matches('/')
        );
        let http_request = self
            .authorized(self.http.post(self.upload_url(&endpoint)))
            .query(&[("uploadType", "multipart")])
            .multipart(form);
        let response = send(http_request, "upload to store").await?;
        decode_body(response, "upload to store").await
    }

    pub async fn get_operation(&self, name: &str) -> Result<Operation> {
        let request = self.authorized(self.http.get(self.url(name)));
        let response = send(request, "get operation").await?;
        decode_body(response, "get operation").await
    }

    /// Polls `operation` under the client's [`PollPolicy`](storekeep_core::PollPolicy) and
    /// returns its response payload.
    pub async fn wait_operation(
        &self,
        operation: Operation,
        cancel: Option<&CancellationToken>,
    ) -> Result<Value> {
        if operation.done {
            return resolve_terminal(&operation);
        }
        let name = operation.name;
        let policy = self.poll;
        let client = self;
        poll_until(&policy, &name, cancel, |attempt| {
            let name = name.clone();
            async move {
                debug!(
                    operation = %name,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "checking indexing status"
                );
                Ok(client.get_operation(&name).await?.status())
            }
        })
        .await
    }
}

fn resolve_terminal(operation: &Operation) -> Result<Value> {
    match operation.status() {
        PollStatus::Done(value) => Ok(value),
        PollStatus::Failed(message) => Err(StorekeepError::OperationFailed {
            name: operation.name.clone(),
            message,
        }),
        PollStatus::Pending => Err(StorekeepError::Other(format!(
            "operation {} is still pending",
            operation.name
        ))),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}
