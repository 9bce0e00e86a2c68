//! Gist backend: the entity array lives in one file of a private gist.

use super::{join_url, parse_entities, AdapterOutcome, SyncAdapter, SyncContext};
use crate::config::{GistSettings, ProviderKind, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::http::bearer;
use crate::transport::{HttpClient, HttpRequest};
use async_trait::async_trait;
use memosync_core::{merge, merge_report, Memo};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

const GIST_DESCRIPTION: &str = "memosync data";

#[derive(Debug, Deserialize)]
struct GistFile {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Gist {
    id: String,
    #[serde(default)]
    files: HashMap<String, Option<GistFile>>,
}

/// Syncs against a file inside a gist, creating the gist on first use.
pub struct GistAdapter {
    settings: GistSettings,
    http: Arc<dyn HttpClient>,
}

impl GistAdapter {
    /// Creates the adapter.
    pub fn new(settings: GistSettings, http: Arc<dyn HttpClient>) -> Self {
        Self { settings, http }
    }

    fn request(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("Authorization", bearer(&self.settings.token))
            .header("Accept", "application/vnd.github+json")
    }

    fn gist_url(&self, id: &str) -> String {
        join_url(&self.settings.api_base, &format!("gists/{id}"))
    }

    fn files_body(&self, memos: &[Memo]) -> SyncResult<serde_json::Value> {
        let content = serde_json::to_string_pretty(memos)?;
        let mut files = serde_json::Map::new();
        files.insert(self.settings.filename.clone(), json!({ "content": content }));
        Ok(serde_json::Value::Object(files))
    }

    async fn fetch(&self, id: &str) -> SyncResult<Vec<Memo>> {
        let response = self
            .http
            .send(self.request(HttpRequest::get(self.gist_url(id))))
            .await?
            .error_for_status()?;
        let gist: Gist = response.json()?;
        let content = gist
            .files
            .get(&self.settings.filename)
            .and_then(|f| f.as_ref())
            .and_then(|f| f.content.as_deref())
            .unwrap_or_default();
        parse_entities(content.as_bytes())
    }

    async fn update(&self, id: &str, memos: &[Memo]) -> SyncResult<()> {
        let body = json!({ "files": self.files_body(memos)? });
        let request = self.request(HttpRequest::patch(self.gist_url(id))).json_body(&body)?;
        self.http.send(request).await?.error_for_status()?;
        Ok(())
    }

    async fn create(&self, memos: &[Memo]) -> SyncResult<String> {
        let body = json!({
            "description": GIST_DESCRIPTION,
            "public": false,
            "files": self.files_body(memos)?,
        });
        let url = join_url(&self.settings.api_base, "gists");
        let request = self.request(HttpRequest::post(url)).json_body(&body)?;
        let response = self.http.send(request).await?.error_for_status()?;
        let gist: Gist = response.json()?;
        if gist.id.trim().is_empty() {
            return Err(SyncError::protocol("gist create returned an empty id"));
        }
        Ok(gist.id)
    }
}

#[async_trait]
impl SyncAdapter for GistAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Gist
    }

    async fn sync(&self, ctx: &SyncContext<'_>, local: Vec<Memo>) -> SyncResult<AdapterOutcome> {
        let now = ctx.clock.now_millis();

        let Some(id) = self.settings.gist_id.as_deref() else {
            let merged = merge(&local, &[]);
            let id = self.create(&merged).await?;
            info!(gist_id = %id, uploaded = merged.len(), "created gist");
            ctx.state.set_last_sync_time(ProviderKind::Gist, now)?;
            let settings = self.settings.clone().with_gist_id(id);
            return Ok(AdapterOutcome {
                entities: merged,
                updated_config: Some(SyncConfig::Gist(settings)),
            });
        };

        let remote = self.fetch(id).await?;
        let report = merge_report(&local, &remote);
        let uploaded = report.remote_is_stale();
        if uploaded {
            self.update(id, &report.merged).await?;
        }

        ctx.state.set_last_sync_time(ProviderKind::Gist, now)?;
        info!(gist_id = %id, pulled = report.remote_wins, uploaded, "gist sync complete");
        Ok(AdapterOutcome::entities(report.merged))
    }
}
