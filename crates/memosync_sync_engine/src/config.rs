//! Provider configuration.
//!
//! One settings struct per backend, selected by the `provider` tag. The
//! persisted JSON shape is
//! `{"provider": "<kind>", "settings": {<provider fields>}}`.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Default GitHub API base.
pub const DEFAULT_API_BASE: &str = "https://api.github.com";
/// Default file name for the single-file and gist backends.
pub const DEFAULT_FILENAME: &str = "memos.json";
/// Default table for the delta-REST backend.
pub const DEFAULT_TABLE: &str = "memos";
/// Default repository path for the encrypted blob.
pub const DEFAULT_BLOB_PATH: &str = "memosync-backup.json";
/// Default branch for the encrypted blob.
pub const DEFAULT_BRANCH: &str = "main";

/// Which backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    /// Sync disabled.
    None,
    /// Row-level REST backend queried by `updatedAt` range.
    DeltaRest,
    /// One JSON document replaced with PUT.
    SingleFile,
    /// One file inside a gist.
    Gist,
    /// Encrypted snapshot in a version-controlled file.
    EncryptedBlob,
}

impl ProviderKind {
    /// Returns the persisted name of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::None => "none",
            ProviderKind::DeltaRest => "delta-rest",
            ProviderKind::SingleFile => "single-file",
            ProviderKind::Gist => "gist",
            ProviderKind::EncryptedBlob => "encrypted-blob",
        }
    }

    /// Parses a persisted provider name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "none" => Some(ProviderKind::None),
            "delta-rest" => Some(ProviderKind::DeltaRest),
            "single-file" => Some(ProviderKind::SingleFile),
            "gist" => Some(ProviderKind::Gist),
            "encrypted-blob" => Some(ProviderKind::EncryptedBlob),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active provider and its settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", content = "settings", rename_all = "kebab-case")]
pub enum SyncConfig {
    /// Sync disabled.
    #[default]
    None,
    /// Delta-REST backend.
    DeltaRest(DeltaRestSettings),
    /// Single-file PUT backend.
    SingleFile(SingleFileSettings),
    /// Gist backend.
    Gist(GistSettings),
    /// Encrypted-blob backend.
    EncryptedBlob(EncryptedBlobSettings),
}

impl SyncConfig {
    /// Returns the provider kind.
    pub fn provider(&self) -> ProviderKind {
        match self {
            SyncConfig::None => ProviderKind::None,
            SyncConfig::DeltaRest(_) => ProviderKind::DeltaRest,
            SyncConfig::SingleFile(_) => ProviderKind::SingleFile,
            SyncConfig::Gist(_) => ProviderKind::Gist,
            SyncConfig::EncryptedBlob(_) => ProviderKind::EncryptedBlob,
        }
    }

    /// Checks that every required setting is present.
    pub fn validate(&self) -> SyncResult<()> {
        match self {
            SyncConfig::None => Ok(()),
            SyncConfig::DeltaRest(s) => s.validate(),
            SyncConfig::SingleFile(s) => s.validate(),
            SyncConfig::Gist(s) => s.validate(),
            SyncConfig::EncryptedBlob(s) => s.validate(),
        }
    }

    /// Builds a typed config from a provider name and a string settings map.
    ///
    /// Keys use the persisted camelCase names (`apiKey`, `gistId`, ...).
    pub fn from_settings_map(provider: &str, settings: &HashMap<String, String>) -> SyncResult<Self> {
        let kind = ProviderKind::parse(provider)
            .ok_or_else(|| SyncError::config(format!("unknown provider: {provider}")))?;
        let value = serde_json::to_value(settings)?;
        let parse_err = |e: serde_json::Error| SyncError::config(format!("{kind}: {e}"));

        let config = match kind {
            ProviderKind::None => SyncConfig::None,
            ProviderKind::DeltaRest => {
                SyncConfig::DeltaRest(serde_json::from_value(value).map_err(parse_err)?)
            }
            ProviderKind::SingleFile => {
                SyncConfig::SingleFile(serde_json::from_value(value).map_err(parse_err)?)
            }
            ProviderKind::Gist => SyncConfig::Gist(serde_json::from_value(value).map_err(parse_err)?),
            ProviderKind::EncryptedBlob => {
                SyncConfig::EncryptedBlob(serde_json::from_value(value).map_err(parse_err)?)
            }
        };
        config.validate()?;
        Ok(config)
    }
}

fn require(provider: ProviderKind, field: &str, value: &str) -> SyncResult<()> {
    if value.trim().is_empty() {
        return Err(SyncError::config(format!("{provider}: {field} is required")));
    }
    Ok(())
}

fn require_url(provider: ProviderKind, field: &str, value: &str) -> SyncResult<()> {
    require(provider, field, value)?;
    let value = value.trim();
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        return Err(SyncError::config(format!(
            "{provider}: {field} must be an http(s) URL"
        )));
    }
    Ok(())
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_filename() -> String {
    DEFAULT_FILENAME.to_string()
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

fn default_blob_path() -> String {
    DEFAULT_BLOB_PATH.to_string()
}

/// Settings for the delta-REST backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRestSettings {
    /// REST endpoint base, e.g. `https://xyz.example.co/rest/v1`.
    pub url: String,
    /// API key sent as both `apikey` and bearer token.
    pub api_key: String,
    /// Collection (table) name.
    #[serde(default = "default_table")]
    pub table: String,
}

impl DeltaRestSettings {
    /// Creates settings with the default table.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            table: default_table(),
        }
    }

    /// Sets the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    fn validate(&self) -> SyncResult<()> {
        require_url(ProviderKind::DeltaRest, "url", &self.url)?;
        require(ProviderKind::DeltaRest, "apiKey", &self.api_key)?;
        require(ProviderKind::DeltaRest, "table", &self.table)
    }
}

/// Settings for the single-file PUT backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SingleFileSettings {
    /// Directory URL the file lives under.
    pub url: String,
    /// Basic-auth user.
    pub username: String,
    /// Basic-auth password.
    pub password: String,
    /// File name.
    #[serde(default = "default_filename")]
    pub filename: String,
}

impl SingleFileSettings {
    /// Creates settings with the default file name.
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            filename: default_filename(),
        }
    }

    /// Sets the file name.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    fn validate(&self) -> SyncResult<()> {
        require_url(ProviderKind::SingleFile, "url", &self.url)?;
        require(ProviderKind::SingleFile, "username", &self.username)?;
        require(ProviderKind::SingleFile, "password", &self.password)?;
        require(ProviderKind::SingleFile, "filename", &self.filename)
    }
}

/// Settings for the gist backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GistSettings {
    /// Personal access token.
    pub token: String,
    /// Gist id; assigned by the first successful sync when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gist_id: Option<String>,
    /// File name inside the gist.
    #[serde(default = "default_filename")]
    pub filename: String,
    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl GistSettings {
    /// Creates settings for a gist that does not exist yet.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            gist_id: None,
            filename: default_filename(),
            api_base: default_api_base(),
        }
    }

    /// Sets the gist id.
    pub fn with_gist_id(mut self, gist_id: impl Into<String>) -> Self {
        self.gist_id = Some(gist_id.into());
        self
    }

    /// Sets the API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn validate(&self) -> SyncResult<()> {
        require(ProviderKind::Gist, "token", &self.token)?;
        require(ProviderKind::Gist, "filename", &self.filename)?;
        require_url(ProviderKind::Gist, "apiBase", &self.api_base)?;
        if let Some(id) = &self.gist_id {
            require(ProviderKind::Gist, "gistId", id)?;
        }
        Ok(())
    }
}

/// Settings for the encrypted-blob backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlobSettings {
    /// Access token for the repository.
    pub token: String,
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch to read and write.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// File path inside the repository.
    #[serde(default = "default_blob_path")]
    pub path: String,
    /// Encryption passphrase. Never leaves the device.
    pub passphrase: String,
    /// API base URL.
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

impl EncryptedBlobSettings {
    /// Creates settings with default branch, path and API base.
    pub fn new(
        token: impl Into<String>,
        owner: impl Into<String>,
        repo: impl Into<String>,
        passphrase: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            owner: owner.into(),
            repo: repo.into(),
            branch: default_branch(),
            path: default_blob_path(),
            passphrase: passphrase.into(),
            api_base: default_api_base(),
        }
    }

    /// Sets the API base URL.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets the file path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the branch.
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    fn validate(&self) -> SyncResult<()> {
        let kind = ProviderKind::EncryptedBlob;
        require(kind, "token", &self.token)?;
        require(kind, "owner", &self.owner)?;
        require(kind, "repo", &self.repo)?;
        require(kind, "branch", &self.branch)?;
        require(kind, "path", &self.path)?;
        require(kind, "passphrase", &self.passphrase)?;
        require_url(kind, "apiBase", &self.api_base)
    }
}
