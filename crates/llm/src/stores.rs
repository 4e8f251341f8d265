use serde_json::{json, Value};
use tracing::info;

use storekeep_core::Result;

use crate::types::{RemoteStore, StoreList};
use crate::{decode_body, send, GeminiClient};

const PAGE_SIZE: &str = "20";

impl GeminiClient {
    pub async fn create_store(&self, display_name: &str) -> Result<RemoteStore> {
        let payload = json!({ "displayName": display_name });
        let request = self
            .authorized(self.http.post(self.url("fileSearchStores")))
            .json(&payload);
        let response = send(request, "create store").await?;
        let store: RemoteStore = decode_body(response, "create store").await?;
        info!(store = %store.name, display_name, "created remote store");
        Ok(store)
    }

    /// Every store visible to the API key, following pagination to the end.
    pub async fn list_stores(&self) -> Result<Vec<RemoteStore>> {
        let mut stores = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }
            let request = self
                .authorized(self.http.get(self.url("fileSearchStores")))
                .query(&query);
            let response = send(request, "list stores").await?;
            let page: StoreList = decode_body(response, "list stores").await?;
            stores.extend(page.file_search_stores);
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(stores)
    }

    /// Deletes a store together with its documents.
    pub async fn delete_store(&self, name: &str) -> Result<()> {
        let request = self
            .authorized(self.http.delete(self.url(name)))
            .query(&[("force", "true")]);
        let response = send(request, "delete store").await?;
        let _: Value = decode_body(response, "delete store").await?;
        info!(store = %name, "deleted remote store");
        Ok(())
    }
}
