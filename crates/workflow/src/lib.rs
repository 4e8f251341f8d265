//! Store administration shared by the HTTP service and the CLI: every operation pairs the
//! remote call with the matching update of the local metadata files.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use storekeep_core::{
    AppConfig, CancellationToken, FileRecord, MetadataStore, NewStore, Result, StorekeepError,
};
use storekeep_gemini::{Citation, GeminiClient, RemoteStore, UploadRequest, UploadedDocument};

pub const NO_ACTIVE_STORE: &str = "no active store; create a store first";

/// A remote store annotated with whether it is the locally selected one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSummary {
    pub name: String,
    pub display_name: String,
    pub active_documents_count: i64,
    pub size_bytes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    pub is_active: bool,
}

impl StoreSummary {
    fn from_remote(store: RemoteStore, active: Option<&str>) -> Self {
        let is_active = active == Some(store.name.as_str());
        Self {
            name: store.name,
            display_name: store.display_name.unwrap_or_default(),
            active_documents_count: store.active_documents_count,
            size_bytes: store.size_bytes,
            create_time: store.create_time,
            is_active,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreListing {
    pub stores: Vec<StoreSummary>,
    pub active_store_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadInput {
    pub path: PathBuf,
    pub store: Option<String>,
    pub display_name: Option<String>,
    pub original_name: Option<String>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AskOutcome {
    pub answer: String,
    pub citations: Vec<Citation>,
    pub store_name: String,
    pub model: String,
}

#[derive(Clone)]
pub struct Workspace {
    config: AppConfig,
    metadata: MetadataStore,
    gemini: GeminiClient,
    default_store_override: bool,
    last_created_fallback: bool,
}

impl Workspace {
    pub fn new(config: AppConfig) -> Self {
        let metadata = MetadataStore::open(&config.data_dir);
        let gemini = GeminiClient::new(&config);
        Self {
            config,
            metadata,
            gemini,
            default_store_override: false,
            last_created_fallback: false,
        }
    }

    pub fn with_gemini(mut self, gemini: GeminiClient) -> Self {
        self.gemini = gemini;
        self
    }

    /// Consults the configured default store (`GEMINI_FILE_SEARCH_STORE`) ahead of the active
    /// store (CLI behaviour).
    pub fn with_default_store_override(mut self) -> Self {
        self.default_store_override = true;
        self
    }

    /// Lets store resolution end at the most recently created store (CLI behaviour).
    pub fn with_last_created_fallback(mut self) -> Self {
        self.last_created_fallback = true;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub async fn list_stores(&self) -> Result<StoreListing> {
        let remote = self.gemini.list_stores().await?;
        let active_store_name = self.metadata.active_store_name().await?;
        let stores = remote
            .into_iter()
            .map(|store| StoreSummary::from_remote(store, active_store_name.as_deref()))
            .collect();
        Ok(StoreListing {
            stores,
            active_store_name,
        })
    }

    pub async fn create_store(&self, display_name: &str) -> Result<StoreSummary> {
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(StorekeepError::validation("displayName is required"));
        }
        let remote = self.gemini.create_store(display_name).await?;
        let record = self
            .metadata
            .insert_store(NewStore::from_remote(
                &remote.name,
                remote.display_name.as_deref().or(Some(display_name)),
                remote.create_time.as_deref(),
            ))
            .await?;
        self.metadata.save_last_created(&record.name).await?;
        let mut summary = StoreSummary::from_remote(remote, None);
        summary.display_name = record.display_name;
        summary.is_active = record.active;
        Ok(summary)
    }

    /// Returns whether a local record matched; an unknown name leaves no store active.
    pub async fn activate_store(&self, name: &str) -> Result<bool> {
        let name = required_store_name(name)?;
        self.metadata.set_active_store(name).await
    }

    /// Deletes the remote store, then drops local records for it whatever the remote outcome.
    pub async fn delete_store(&self, name: &str) -> Result<()> {
        let name = required_store_name(name)?;
        let remote = self.gemini.delete_store(name).await;
        if let Err(err) = &remote {
            warn!(
                store = %name,
                error = %err,
                "remote delete failed; clearing local records anyway"
            );
        }
        if let Err(local) = self.forget_store(name).await {
            return Err(match remote {
                Ok(()) => local,
                Err(remote) => StorekeepError::Other(format!(
                    "{remote}; local cleanup also failed: {local}"
                )),
            });
        }
        remote
    }

    async fn forget_store(&self, name: &str) -> Result<()> {
        self.metadata.delete_store(name).await?;
        self.metadata.delete_files_of_store(name).await?;
        self.metadata.forget_last_created(name).await?;
        Ok(())
    }

    /// Explicit name, then the active store. When enabled, the configured default store is
    /// consulted before the active one and the last created store after it.
    pub async fn resolve_store(&self, explicit: Option<&str>) -> Result<Option<String>> {
        let override_name = if self.default_store_override {
            self.config.default_store.as_deref()
        } else {
            None
        };
        let resolved = self.metadata.resolve_store(explicit, override_name).await?;
        if resolved.is_some() || !self.last_created_fallback {
            return Ok(resolved);
        }
        self.metadata.last_created().await
    }

    pub async fn upload(
        &self,
        input: UploadInput,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadedDocument> {
        let store_name = self
            .resolve_store(input.store.as_deref())
            .await?
            .ok_or_else(|| StorekeepError::validation(NO_ACTIVE_STORE))?;
        let request = UploadRequest {
            path: input.path,
            store_name,
            display_name: input.display_name,
            original_name: input.original_name,
            mime_type: input.mime_type,
        };
        let document = self.gemini.upload_file(&request, cancel).await?;
        self.metadata
            .insert_file(FileRecord {
                store_name: document.parent.clone(),
                file_name: document.document_name.clone(),
                display_name: document.display_name.clone(),
            })
            .await?;
        Ok(document)
    }

    pub async fn ask(
        &self,
        question: &str,
        store: Option<&str>,
        model: Option<&str>,
    ) -> Result<AskOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(StorekeepError::validation("question is required"));
        }
        let store_name = self.resolve_store(store).await?.ok_or_else(|| {
            StorekeepError::validation("no active store; create a store and upload files first")
        })?;
        let model = model
            .map(str::trim)
            .filter(|model| !model.is_empty())
            .unwrap_or(self.config.model.as_str())
            .to_string();
        let answer = self.gemini.ask(&model, &store_name, question).await?;
        info!(
            store = %store_name,
            model = %model,
            citations = answer.citations.len(),
            "answered question"
        );
        Ok(AskOutcome {
            answer: answer.text,
            citations: answer.citations,
            store_name,
            model,
        })
    }

    pub async fn list_files(&self, store: Option<&str>) -> Result<Vec<FileRecord>> {
        let store = store.map(str::trim).filter(|name| !name.is_empty());
        self.metadata.list_files(store).await
    }
}

fn required_store_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StorekeepError::validation("store name is required"));
    }
    Ok(name)
}
