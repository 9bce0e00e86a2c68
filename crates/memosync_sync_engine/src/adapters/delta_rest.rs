//! Row-level REST backend with `updatedAt` range queries.

use super::{join_url, parse_entities, AdapterOutcome, SyncAdapter, SyncContext};
use crate::config::{DeltaRestSettings, ProviderKind};
use crate::error::SyncResult;
use crate::http::bearer;
use crate::transport::{HttpClient, HttpRequest};
use async_trait::async_trait;
use memosync_core::{merge, Memo, Timestamp};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Syncs against a table exposed through a PostgREST-style API.
///
/// Only rows stamped after the watermark are fetched, and only merged rows
/// stamped after it are pushed back, minus those the fetch just returned
/// unchanged.
///
/// The watermark recorded for a pass is one millisecond before the pass
/// started. Both filters are strict, so a row stamped in the same
/// millisecond as the clock read is picked up again on the next pass.
pub struct DeltaRestAdapter {
    settings: DeltaRestSettings,
    http: Arc<dyn HttpClient>,
}

impl DeltaRestAdapter {
    /// Creates the adapter.
    pub fn new(settings: DeltaRestSettings, http: Arc<dyn HttpClient>) -> Self {
        Self { settings, http }
    }

    fn table_url(&self) -> String {
        join_url(&self.settings.url, &self.settings.table)
    }

    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("apikey", self.settings.api_key.as_str())
            .header("Authorization", bearer(&self.settings.api_key))
    }

    async fn fetch_since(&self, since: Timestamp) -> SyncResult<Vec<Memo>> {
        let url = format!("{}?select=*&updatedAt=gt.{since}", self.table_url());
        let request = self.authorize(HttpRequest::get(url));
        let response = self.http.send(request).await?.error_for_status()?;
        parse_entities(&response.body)
    }

    async fn upsert(&self, rows: &[Memo]) -> SyncResult<()> {
        let url = format!("{}?on_conflict=id", self.table_url());
        let request = self
            .authorize(HttpRequest::post(url))
            .header("Prefer", "resolution=merge-duplicates")
            .json_body(rows)?;
        self.http.send(request).await?.error_for_status()?;
        Ok(())
    }
}

/// Merged rows newer than `since` that the fetch did not just return as-is.
fn push_set(merged: &[Memo], fetched: &[Memo], since: Timestamp) -> Vec<Memo> {
    let echoed: HashSet<(&str, Timestamp)> = fetched
        .iter()
        .map(|m| (m.id.as_str(), m.updated_at))
        .collect();
    merged
        .iter()
        .filter(|m| m.updated_at > since && !echoed.contains(&(m.id.as_str(), m.updated_at)))
        .cloned()
        .collect()
}

#[async_trait]
impl SyncAdapter for DeltaRestAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::DeltaRest
    }

    async fn sync(&self, ctx: &SyncContext<'_>, local: Vec<Memo>) -> SyncResult<AdapterOutcome> {
        let watermark = ctx.clock.now_millis().saturating_sub(1);
        let since = ctx.state.last_sync_time(ProviderKind::DeltaRest)?.unwrap_or(0);

        let fetched = self.fetch_since(since).await?;
        let merged = merge(&local, &fetched);
        let outgoing = push_set(&merged, &fetched, since);
        debug!(
            since,
            fetched = fetched.len(),
            pushing = outgoing.len(),
            "delta-rest pass"
        );

        if !outgoing.is_empty() {
            self.upsert(&outgoing).await?;
        }

        ctx.state.set_last_sync_time(ProviderKind::DeltaRest, watermark)?;
        info!(
            pulled = fetched.len(),
            pushed = outgoing.len(),
            watermark,
            "delta-rest sync complete"
        );
        Ok(AdapterOutcome::entities(merged))
    }
}
