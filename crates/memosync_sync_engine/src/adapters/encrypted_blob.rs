//! Encrypted whole-snapshot backend on a repository contents API.
//!
//! The cloud copy is a base64-encoded JSON [`EncryptedPayload`] whose
//! plaintext is a [`SyncSnapshot`]. Nothing is merged: a pass either
//! replaces the cloud copy with the local snapshot or stops at the
//! conflict gate and lets the user choose a side.
//!
//! ## Pass
//!
//! 1. Save a local history snapshot (best effort).
//! 2. Download and decrypt the cloud snapshot, if any.
//! 3. Stop with [`SyncError::Conflict`] if the cloud copy is newer than the
//!    watermark.
//! 4. Encrypt the local snapshot and write it back, conditional on the
//!    blob `sha` observed in step 2.
//! 5. Move the watermark to the local snapshot's stamp.

use super::{join_url, AdapterOutcome, SyncAdapter, SyncContext};
use crate::config::{EncryptedBlobSettings, ProviderKind};
use crate::conflict::{ConflictDetector, ConflictVerdict, SyncConflict};
use crate::error::{SyncError, SyncResult};
use crate::http::bearer;
use crate::transport::{HttpClient, HttpRequest};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use memosync_core::{crypto, EncryptedPayload, Memo, SyncSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use urlencoding::encode;

#[derive(Debug, Deserialize)]
struct ContentsEntry {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct ContentsWrite<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

struct CloudCopy {
    sha: String,
    snapshot: SyncSnapshot,
}

/// Syncs an encrypted snapshot stored as a file in a repository.
pub struct EncryptedBlobAdapter {
    settings: EncryptedBlobSettings,
    http: Arc<dyn HttpClient>,
}

impl EncryptedBlobAdapter {
    /// Creates the adapter.
    pub fn new(settings: EncryptedBlobSettings, http: Arc<dyn HttpClient>) -> Self {
        Self { settings, http }
    }

    fn contents_url(&self) -> String {
        let s = &self.settings;
        join_url(
            &s.api_base,
            &format!(
                "repos/{}/{}/contents/{}",
                encode(&s.owner),
                encode(&s.repo),
                encode_path(&s.path)
            ),
        )
    }

    fn request(&self, request: HttpRequest) -> HttpRequest {
        request
            .header("Authorization", bearer(&self.settings.token))
            .header("Accept", "application/vnd.github+json")
    }

    async fn download(&self) -> SyncResult<Option<CloudCopy>> {
        let url = format!("{}?ref={}", self.contents_url(), encode(&self.settings.branch));
        let response = self.http.send(self.request(HttpRequest::get(url))).await?;
        if response.status == 404 {
            return Ok(None);
        }
        let entry: ContentsEntry = response.error_for_status()?.json()?;

        let compact: String = entry
            .content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let raw = BASE64
            .decode(compact)
            .map_err(|e| SyncError::protocol(format!("cloud blob is not base64: {e}")))?;
        let payload: EncryptedPayload = serde_json::from_slice(&raw)
            .map_err(|e| SyncError::protocol(format!("cloud blob is not an encrypted payload: {e}")))?;

        let passphrase = self.settings.passphrase.clone();
        let plaintext = tokio::task::spawn_blocking(move || crypto::decrypt(&payload, &passphrase))
            .await
            .map_err(|e| SyncError::protocol(format!("decrypt task failed: {e}")))??;
        let snapshot = SyncSnapshot::from_json(&plaintext)?;

        Ok(Some(CloudCopy {
            sha: entry.sha,
            snapshot,
        }))
    }

    async fn upload(&self, snapshot: &SyncSnapshot, sha: Option<&str>) -> SyncResult<()> {
        let plaintext = snapshot.to_json()?;
        let passphrase = self.settings.passphrase.clone();
        let payload = tokio::task::spawn_blocking(move || crypto::encrypt(&plaintext, &passphrase))
            .await
            .map_err(|e| SyncError::protocol(format!("encrypt task failed: {e}")))??;

        let body = ContentsWrite {
            message: format!("memosync backup from {}", snapshot.meta.device_id),
            content: BASE64.encode(serde_json::to_vec(&payload)?),
            branch: &self.settings.branch,
            sha,
        };
        let request = self
            .request(HttpRequest::put(self.contents_url()))
            .json_body(&body)?;
        let response = self.http.send(request).await?;
        match response.status {
            409 | 412 | 422 => Err(SyncError::RemoteChanged(format!(
                "{} was modified by another writer",
                self.settings.path
            ))),
            _ => response.error_for_status().map(|_| ()),
        }
    }
}

/// Percent-encodes each segment of a repository path, keeping the slashes.
fn encode_path(path: &str) -> String {
    path.split('/').map(|seg| encode(seg).into_owned()).collect::<Vec<_>>().join("/")
}

#[async_trait]
impl SyncAdapter for EncryptedBlobAdapter {
    fn provider(&self) -> ProviderKind {
        ProviderKind::EncryptedBlob
    }

    async fn sync(&self, ctx: &SyncContext<'_>, local: Vec<Memo>) -> SyncResult<AdapterOutcome> {
        if let Err(e) = ctx.backups.save_history_snapshot() {
            warn!(error = %e, "pre-sync history snapshot failed, continuing");
        }

        let cloud = self.download().await?;
        let device_id = ctx.state.device_id()?;
        let local_snapshot = SyncSnapshot::assemble(local.clone(), device_id, ctx.clock.now_millis());

        if let Some(cloud) = &cloud {
            let last_sync = ctx.state.last_sync_time(ProviderKind::EncryptedBlob)?;
            if ConflictDetector::check(last_sync, &cloud.snapshot) == ConflictVerdict::Conflict {
                info!(
                    last_sync = ?last_sync,
                    cloud_updated_at = cloud.snapshot.meta.updated_at,
                    cloud_device = %cloud.snapshot.meta.device_id,
                    "cloud snapshot is newer, waiting for user choice"
                );
                return Err(SyncError::Conflict(Box::new(SyncConflict {
                    local: local_snapshot,
                    cloud: cloud.snapshot.clone(),
                })));
            }
        }

        let sha = cloud.as_ref().map(|c| c.sha.as_str());
        debug!(first_write = sha.is_none(), records = local.len(), "uploading encrypted snapshot");
        self.upload(&local_snapshot, sha).await?;

        let stamp = local_snapshot.meta.updated_at;
        ctx.state.set_last_sync_time(ProviderKind::EncryptedBlob, stamp)?;
        info!(watermark = stamp, records = local.len(), "encrypted-blob sync complete");
        Ok(AdapterOutcome::entities(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::test_env::TestEnv;
    use crate::state::SyncStateStore;
    use crate::transport::{HttpResponse, Method, MockHttpClient};
    use memosync_core::{
        BackupManager, CoreError, CoreResult, HistoryMetadata, HistorySnapshot, HistoryStore,
        ManualClock, MemoKind, MemoryEntityStore, Timestamp,
    };
    use serde_json::json;

    const PASS: &str = "correct horse";

    fn settings() -> EncryptedBlobSettings {
        EncryptedBlobSettings::new("tok", "me", "vault", PASS).with_api_base("https://api.example.com")
    }

    fn memo(id: &str, at: Timestamp) -> Memo {
        Memo::new(id, id, MemoKind::Memo, at)
    }

    fn contents_body(snapshot: &SyncSnapshot, password: &str) -> serde_json::Value {
        let payload = crypto::encrypt(&snapshot.to_json().unwrap(), password).unwrap();
        let encoded = BASE64.encode(serde_json::to_vec(&payload).unwrap());
        let wrapped = encoded
            .as_bytes()
            .chunks(60)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join("\n");
        json!({"sha": "abc123", "content": wrapped, "encoding": "base64"})
    }

    #[tokio::test]
    async fn first_write_has_no_sha() {
        let env = TestEnv::at(700);
        let client = Arc::new(MockHttpClient::new(|req| match req.method {
            Method::Get => Ok(HttpResponse::new(404, "")),
            _ => Ok(HttpResponse::new(201, "{}")),
        }));

        let local = vec![memo("a", 5)];
        let outcome = EncryptedBlobAdapter::new(settings(), client.clone())
            .sync(&env.ctx(), local.clone())
            .await
            .unwrap();

        assert_eq!(outcome.entities, local);
        let requests = client.requests();
        assert_eq!(
            requests[0].url,
            "https://api.example.com/repos/me/vault/contents/memosync-backup.json?ref=main"
        );
        let put: serde_json::Value = requests[1].json().unwrap();
        assert!(put.get("sha").is_none());
        assert_eq!(put["branch"], "main");

        let raw = BASE64.decode(put["content"].as_str().unwrap()).unwrap();
        let payload: EncryptedPayload = serde_json::from_slice(&raw).unwrap();
        let snapshot = SyncSnapshot::from_json(&crypto::decrypt(&payload, PASS).unwrap()).unwrap();
        assert_eq!(snapshot.data.into_memos(), local);

        assert_eq!(
            env.state.last_sync_time(ProviderKind::EncryptedBlob).unwrap(),
            Some(700)
        );
        assert_eq!(env.history.list().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn newer_cloud_raises_conflict() {
        let env = TestEnv::at(700);
        env.state.set_last_sync_time(ProviderKind::EncryptedBlob, 100).unwrap();
        let cloud = SyncSnapshot::assemble(vec![memo("remote", 250)], "laptop", 300);
        let body = contents_body(&cloud, PASS);
        let client = Arc::new(MockHttpClient::always(HttpResponse::json_value(200, &body)));

        let err = EncryptedBlobAdapter::new(settings(), client.clone())
            .sync(&env.ctx(), vec![memo("a", 5)])
            .await
            .unwrap_err();

        let conflict = err.into_conflict().unwrap();
        assert_eq!(conflict.cloud, cloud);
        assert_eq!(conflict.local.meta.updated_at, 700);
        assert_eq!(client.count(Method::Put), 0);
        assert_eq!(
            env.state.last_sync_time(ProviderKind::EncryptedBlob).unwrap(),
            Some(100)
        );
    }

    #[tokio::test]
    async fn older_cloud_is_overwritten_with_sha() {
        let env = TestEnv::at(900);
        env.state.set_last_sync_time(ProviderKind::EncryptedBlob, 300).unwrap();
        let cloud = SyncSnapshot::assemble(vec![memo("a", 1)], "phone", 300);
        let body = contents_body(&cloud, PASS);
        let client = Arc::new(MockHttpClient::new(move |req| match req.method {
            Method::Get => Ok(HttpResponse::json_value(200, &body)),
            _ => Ok(HttpResponse::new(200, "{}")),
        }));

        EncryptedBlobAdapter::new(settings(), client.clone())
            .sync(&env.ctx(), vec![memo("a", 2)])
            .await
            .unwrap();

        let put: serde_json::Value = client.requests()[1].json().unwrap();
        assert_eq!(put["sha"], "abc123");
        assert_eq!(
            env.state.last_sync_time(ProviderKind::EncryptedBlob).unwrap(),
            Some(900)
        );
    }

    #[tokio::test]
    async fn conflict_gate_ignores_entity_stamps() {
        // Snapshot stamp at the watermark, entities stamped well after it.
        let env = TestEnv::at(900);
        env.state.set_last_sync_time(ProviderKind::EncryptedBlob, 300).unwrap();
        let cloud = SyncSnapshot::assemble(vec![memo("a", 800), memo("b", 850)], "phone", 300);
        let body = contents_body(&cloud, PASS);
        let client = Arc::new(MockHttpClient::new(move |req| match req.method {
            Method::Get => Ok(HttpResponse::json_value(200, &body)),
            _ => Ok(HttpResponse::new(200, "{}")),
        }));

        EncryptedBlobAdapter::new(settings(), client.clone())
            .sync(&env.ctx(), vec![memo("a", 2)])
            .await
            .unwrap();
        assert_eq!(client.count(Method::Put), 1);

        // Snapshot stamp past the watermark, entities stamped well before it.
        let env = TestEnv::at(900);
        env.state.set_last_sync_time(ProviderKind::EncryptedBlob, 300).unwrap();
        let cloud = SyncSnapshot::assemble(vec![memo("a", 1), memo("b", 2)], "phone", 301);
        let body = contents_body(&cloud, PASS);
        let client = Arc::new(MockHttpClient::always(HttpResponse::json_value(200, &body)));

        let err = EncryptedBlobAdapter::new(settings(), client.clone())
            .sync(&env.ctx(), vec![memo("a", 500)])
            .await
            .unwrap_err();
        assert!(err.as_conflict().is_some());
        assert_eq!(client.count(Method::Put), 0);
    }

    #[tokio::test]
    async fn path_and_branch_are_percent_encoded() {
        let env = TestEnv::at(700);
        let client = Arc::new(MockHttpClient::new(|req| match req.method {
            Method::Get => Ok(HttpResponse::new(404, "")),
            _ => Ok(HttpResponse::new(201, "{}")),
        }));
        let settings = settings()
            .with_path("my notes/backup #1.json")
            .with_branch("feature/sync");

        EncryptedBlobAdapter::new(settings, client.clone())
            .sync(&env.ctx(), Vec::new())
            .await
            .unwrap();

        let requests = client.requests();
        assert_eq!(
            requests[0].url,
            "https://api.example.com/repos/me/vault/contents/my%20notes/backup%20%231.json?ref=feature%2Fsync"
        );
        assert_eq!(
            requests[1].url,
            "https://api.example.com/repos/me/vault/contents/my%20notes/backup%20%231.json"
        );
        let put: serde_json::Value = requests[1].json().unwrap();
        assert_eq!(put["branch"], "feature/sync");
    }

    #[tokio::test]
    async fn wrong_passphrase_is_fatal() {
        let env = TestEnv::at(900);
        let cloud = SyncSnapshot::assemble(Vec::new(), "phone", 10);
        let body = contents_body(&cloud, "another passphrase");
        let client = Arc::new(MockHttpClient::always(HttpResponse::json_value(200, &body)));

        let err = EncryptedBlobAdapter::new(settings(), client.clone())
            .sync(&env.ctx(), Vec::new())
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Core(CoreError::DecryptionFailed)));
        assert_eq!(client.count(Method::Put), 0);
    }

    #[tokio::test]
    async fn garbage_content_is_protocol_error() {
        let env = TestEnv::at(900);
        let client = Arc::new(MockHttpClient::always(HttpResponse::json_value(
            200,
            &json!({"sha": "s", "content": "!!!not base64!!!"}),
        )));

        let err = EncryptedBlobAdapter::new(settings(), client)
            .sync(&env.ctx(), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }

    #[tokio::test]
    async fn concurrent_writer_is_remote_changed() {
        let env = TestEnv::at(900);
        let client = Arc::new(MockHttpClient::new(|req| match req.method {
            Method::Get => Ok(HttpResponse::new(404, "")),
            _ => Ok(HttpResponse::new(409, "sha mismatch")),
        }));

        let err = EncryptedBlobAdapter::new(settings(), client)
            .sync(&env.ctx(), vec![memo("a", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::RemoteChanged(_)));
        assert_eq!(env.state.last_sync_time(ProviderKind::EncryptedBlob).unwrap(), None);
    }

    struct BrokenHistory;

    impl HistoryStore for BrokenHistory {
        fn save(&self, _: &HistorySnapshot) -> CoreResult<()> {
            Err(CoreError::storage("disk full"))
        }
        fn list(&self) -> CoreResult<Vec<HistoryMetadata>> {
            Ok(Vec::new())
        }
        fn load(&self, _: &str) -> CoreResult<Option<HistorySnapshot>> {
            Ok(None)
        }
        fn delete(&self, _: &str) -> CoreResult<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn backup_failure_does_not_stop_sync() {
        let env = TestEnv::at(900);
        let backups = BackupManager::new(
            Arc::new(MemoryEntityStore::new()),
            Arc::new(BrokenHistory),
            Arc::new(ManualClock::new(900)),
        );
        let ctx = SyncContext {
            state: &env.state,
            clock: env.clock.as_ref(),
            backups: &backups,
        };
        let client = Arc::new(MockHttpClient::new(|req| match req.method {
            Method::Get => Ok(HttpResponse::new(404, "")),
            _ => Ok(HttpResponse::new(201, "{}")),
        }));

        let result = EncryptedBlobAdapter::new(settings(), client).sync(&ctx, Vec::new()).await;
        assert!(result.is_ok());
    }
}
