//! Whole-document backend: one JSON array replaced with PUT.

use super::{join_url, parse_entities, AdapterOutcome, SyncAdapter, SyncContext};
use crate::config::{ProviderKind, SingleFileSettings};
use crate::error::SyncResult;
use crate::http::basic_auth;
use crate::transport::{HttpClient, HttpRequest};
use async_trait::async_trait;
use memosync_core::{merge_report, Memo};
use std::sync::Arc;
use tracing::{debug, info};

/// Syncs against a single file on a WebDAV-style server.
pub struct SingleFileAdapter {
    settings: SingleFileSettings,
    http: Arc<dyn HttpClient>,
}

impl SingleFileAdapter {
    /// Creates the adapter.
    pub fn new(settings: SingleFileSettings, http: Arc<dyn HttpClient>) -> Self {
        Self { settings, http }
    }

    fn file_url(&self) -> String {
        join_url(&self.settings.url, &self.settings.filename)
    }

    fn authorization(&self) -> String {
        basic_auth(&self.settings.username, &self.settings.password)
    }

    async fn download(&self) -> SyncResult<Vec<Memo>> {
        let request = HttpRequest::get(self.file_url()).header("Authorization", self.authorization());
        let response = self.http.send(request).await?;
        if response.status == 404 {
            debug!(url = %self.file_url(), "remote file missing, treating as empty");
            return Ok(Vec::new());
        }
        let response = response.error_for_status()?;
        parse_entities(&response.body)
    }

    async fn upload(&self, memos: &[Memo]) -> SyncResult<()> {
        let request = HttpRequest::put(self.file_url())
            .header("Authorization", self.authorization())
            .json_body(memos)?;
        self.http.send(request).await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl SyncAdapter for SingleFileAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::SingleFile
    }

    async fn sync(&self, ctx: &SyncContext<'_>, local: Vec<Memo>) -> SyncResult<AdapterOutcome> {
        let remote = self.download().await?;
        let report = merge_report(&local, &remote);

        let uploaded = report.remote_is_stale();
        if uploaded {
            self.upload(&report.merged).await?;
        }

        ctx.state
            .set_last_sync_time(ProviderKind::SingleFile, ctx.clock.now_millis())?;
        info!(
            remote = remote.len(),
            pulled = report.remote_wins,
            uploaded,
            "single-file sync complete"
        );
        Ok(AdapterOutcome::entities(report.merged))
    }
}
