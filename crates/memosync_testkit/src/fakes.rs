//! In-process fakes of the supported backends.
//!
//! Each fake implements [`HttpClient`] and keeps the backend state in
//! memory, so adapters run their real wire code against it. All fakes log
//! requests and accept one-shot failure injection per method.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use memosync_core::{crypto, EncryptedPayload, Memo, SyncSnapshot};
use memosync_sync_engine::{basic_auth, bearer, HttpClient, HttpRequest, HttpResponse, Method, SyncResult};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Returns the path part of `url`, without query.
pub fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let path = rest.find('/').map_or("/", |i| &rest[i..]);
    path.split('?').next().unwrap_or(path)
}

/// Returns the value of query parameter `name` in `url`.
pub fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

/// Request log plus queued failures.
#[derive(Debug, Default)]
pub struct Recorder {
    log: Mutex<Vec<HttpRequest>>,
    failures: Mutex<Vec<(Method, u16)>>,
}

impl Recorder {
    /// Makes the next request with `method` fail with `status`.
    pub fn fail_next(&self, method: Method, status: u16) {
        self.failures.lock().push((method, status));
    }

    /// Returns every request seen.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.log.lock().clone()
    }

    /// Counts requests with `method`.
    pub fn count(&self, method: Method) -> usize {
        self.log.lock().iter().filter(|r| r.method == method).count()
    }

    /// Forgets logged requests.
    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    fn record(&self, request: &HttpRequest) -> Option<HttpResponse> {
        self.log.lock().push(request.clone());
        let mut failures = self.failures.lock();
        let index = failures.iter().position(|(m, _)| *m == request.method)?;
        let (_, status) = failures.remove(index);
        Some(HttpResponse::new(status, "injected failure"))
    }
}

fn bad_request(message: impl std::fmt::Display) -> HttpResponse {
    HttpResponse::json_value(400, &json!({ "message": message.to_string() }))
}

fn unauthorized() -> HttpResponse {
    HttpResponse::json_value(401, &json!({ "message": "Bad credentials" }))
}

/// Fake row store with `updatedAt` range queries and upsert.
#[derive(Debug)]
pub struct FakeRestBackend {
    api_key: String,
    rows: Mutex<BTreeMap<String, Memo>>,
    /// Request log and failure injection.
    pub recorder: Recorder,
}

impl FakeRestBackend {
    /// Creates an empty table that accepts `api_key`.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            rows: Mutex::new(BTreeMap::new()),
            recorder: Recorder::default(),
        }
    }

    /// Inserts rows directly, bypassing the API.
    pub fn seed(&self, memos: impl IntoIterator<Item = Memo>) {
        let mut rows = self.rows.lock();
        for memo in memos {
            rows.insert(memo.id.clone(), memo);
        }
    }

    /// Returns all rows ordered by id.
    pub fn rows(&self) -> Vec<Memo> {
        self.rows.lock().values().cloned().collect()
    }

    /// Returns one row.
    pub fn row(&self, id: &str) -> Option<Memo> {
        self.rows.lock().get(id).cloned()
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        if request.header_value("apikey") != Some(self.api_key.as_str()) {
            return unauthorized();
        }
        match request.method {
            Method::Get => {
                let since = match query_param(&request.url, "updatedAt")
                    .and_then(|v| v.strip_prefix("gt."))
                    .map(str::parse::<i64>)
                {
                    Some(Ok(since)) => since,
                    _ => return bad_request("expected updatedAt=gt.<millis>"),
                };
                let rows: Vec<Memo> = self
                    .rows
                    .lock()
                    .values()
                    .filter(|m| m.updated_at > since)
                    .cloned()
                    .collect();
                HttpResponse::json_value(200, &json!(rows))
            }
            Method::Post => {
                if query_param(&request.url, "on_conflict") != Some("id") {
                    return bad_request("missing on_conflict=id");
                }
                match request.json::<Vec<Memo>>() {
                    Ok(memos) => {
                        self.seed(memos);
                        HttpResponse::new(201, "")
                    }
                    Err(e) => bad_request(e),
                }
            }
            _ => HttpResponse::new(405, ""),
        }
    }
}

#[async_trait]
impl HttpClient for FakeRestBackend {
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        if let Some(failure) = self.recorder.record(&request) {
            return Ok(failure);
        }
        Ok(self.handle(&request))
    }
}

/// Fake WebDAV-style server holding one file.
#[derive(Debug)]
pub struct FakeFileBackend {
    authorization: String,
    file: Mutex<Option<Vec<u8>>>,
    /// Request log and failure injection.
    pub recorder: Recorder,
}

impl FakeFileBackend {
    /// Creates a server without the file, accepting `username`/`password`.
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            authorization: basic_auth(username, password),
            file: Mutex::new(None),
            recorder: Recorder::default(),
        }
    }

    /// Stores `memos` as the file content.
    pub fn seed(&self, memos: &[Memo]) {
        *self.file.lock() = Some(serde_json::to_vec(memos).expect("Failed to serialize memos"));
    }

    /// Returns the memos in the file, if it exists.
    pub fn memos(&self) -> Option<Vec<Memo>> {
        let file = self.file.lock();
        file.as_ref().map(|bytes| serde_json::from_slice(bytes).unwrap_or_default())
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        if request.header_value("authorization") != Some(self.authorization.as_str()) {
            return unauthorized();
        }
        match request.method {
            Method::Get => match self.file.lock().as_ref() {
                Some(bytes) => HttpResponse::new(200, bytes.clone()),
                None => HttpResponse::new(404, "Not Found"),
            },
            Method::Put => {
                let created = self.file.lock().replace(request.body.clone()).is_none();
                HttpResponse::new(if created { 201 } else { 204 }, "")
            }
            _ => HttpResponse::new(405, ""),
        }
    }
}

#[async_trait]
impl HttpClient for FakeFileBackend {
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        if let Some(failure) = self.recorder.record(&request) {
            return Ok(failure);
        }
        Ok(self.handle(&request))
    }
}

/// Fake gist API.
#[derive(Debug)]
pub struct FakeGistBackend {
    token: String,
    gists: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    /// Request log and failure injection.
    pub recorder: Recorder,
}

impl FakeGistBackend {
    /// Creates an API with no gists, accepting `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            gists: Mutex::new(BTreeMap::new()),
            recorder: Recorder::default(),
        }
    }

    /// Returns how many gists exist.
    pub fn gist_count(&self) -> usize {
        self.gists.lock().len()
    }

    /// Writes `memos` into `filename` of gist `id`, creating it if needed.
    pub fn seed(&self, id: &str, filename: &str, memos: &[Memo]) {
        let content = serde_json::to_string(memos).expect("Failed to serialize memos");
        self.gists
            .lock()
            .entry(id.to_string())
            .or_default()
            .insert(filename.to_string(), content);
    }

    /// Returns the memos stored in `filename` of gist `id`.
    pub fn memos(&self, id: &str, filename: &str) -> Option<Vec<Memo>> {
        let gists = self.gists.lock();
        let content = gists.get(id)?.get(filename)?;
        serde_json::from_str(content).ok()
    }

    fn render(id: &str, files: &BTreeMap<String, String>) -> Value {
        let files: serde_json::Map<String, Value> = files
            .iter()
            .map(|(name, content)| (name.clone(), json!({ "filename": name, "content": content })))
            .collect();
        json!({ "id": id, "public": false, "files": files })
    }

    fn apply_files(target: &mut BTreeMap<String, String>, body: &Value) {
        if let Some(files) = body.get("files").and_then(Value::as_object) {
            for (name, file) in files {
                if let Some(content) = file.get("content").and_then(Value::as_str) {
                    target.insert(name.clone(), content.to_string());
                }
            }
        }
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        if request.header_value("authorization") != Some(bearer(&self.token).as_str()) {
            return unauthorized();
        }
        let path = url_path(&request.url);
        let id = path.strip_prefix("/gists/").filter(|id| !id.is_empty());

        match (request.method, id) {
            (Method::Post, None) if path == "/gists" => {
                let body: Value = match request.json() {
                    Ok(body) => body,
                    Err(e) => return bad_request(e),
                };
                let mut gists = self.gists.lock();
                let id = format!("gist-{}", gists.len() + 1);
                let mut files = BTreeMap::new();
                Self::apply_files(&mut files, &body);
                let rendered = Self::render(&id, &files);
                gists.insert(id, files);
                HttpResponse::json_value(201, &rendered)
            }
            (Method::Get, Some(id)) => match self.gists.lock().get(id) {
                Some(files) => HttpResponse::json_value(200, &Self::render(id, files)),
                None => HttpResponse::new(404, "Not Found"),
            },
            (Method::Patch, Some(id)) => {
                let body: Value = match request.json() {
                    Ok(body) => body,
                    Err(e) => return bad_request(e),
                };
                let mut gists = self.gists.lock();
                match gists.get_mut(id) {
                    Some(files) => {
                        Self::apply_files(files, &body);
                        HttpResponse::json_value(200, &Self::render(id, files))
                    }
                    None => HttpResponse::new(404, "Not Found"),
                }
            }
            _ => HttpResponse::new(404, "Not Found"),
        }
    }
}

#[async_trait]
impl HttpClient for FakeGistBackend {
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        if let Some(failure) = self.recorder.record(&request) {
            return Ok(failure);
        }
        Ok(self.handle(&request))
    }
}

#[derive(Debug, Clone)]
struct Blob {
    sha: String,
    content: String,
}

/// Fake repository contents API holding one file, with `sha` checks on write.
#[derive(Debug)]
pub struct FakeContentsBackend {
    token: String,
    blob: Mutex<Option<Blob>>,
    revision: Mutex<u64>,
    /// Request log and failure injection.
    pub recorder: Recorder,
}

impl FakeContentsBackend {
    /// Creates an empty repository accepting `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            blob: Mutex::new(None),
            revision: Mutex::new(0),
            recorder: Recorder::default(),
        }
    }

    fn next_sha(&self) -> String {
        let mut revision = self.revision.lock();
        *revision += 1;
        format!("sha-{revision}")
    }

    /// Stores `snapshot` encrypted with `passphrase`, as another device would.
    pub fn seed_snapshot(&self, snapshot: &SyncSnapshot, passphrase: &str) {
        let json = snapshot.to_json().expect("Failed to serialize snapshot");
        let payload = crypto::encrypt(&json, passphrase).expect("Failed to encrypt snapshot");
        self.seed_payload(&payload);
    }

    /// Stores a raw encrypted payload.
    pub fn seed_payload(&self, payload: &EncryptedPayload) {
        let content = BASE64.encode(serde_json::to_vec(payload).expect("Failed to serialize payload"));
        let sha = self.next_sha();
        *self.blob.lock() = Some(Blob { sha, content });
    }

    /// Returns the stored payload, if any.
    pub fn payload(&self) -> Option<EncryptedPayload> {
        let blob = self.blob.lock().clone()?;
        let raw = BASE64.decode(blob.content).ok()?;
        serde_json::from_slice(&raw).ok()
    }

    /// Decrypts the stored snapshot.
    pub fn snapshot(&self, passphrase: &str) -> Option<SyncSnapshot> {
        let payload = self.payload()?;
        let json = crypto::decrypt(&payload, passphrase).ok()?;
        SyncSnapshot::from_json(&json).ok()
    }

    /// Returns the current blob sha.
    pub fn sha(&self) -> Option<String> {
        self.blob.lock().as_ref().map(|b| b.sha.clone())
    }

    /// Flips one bit of the stored ciphertext.
    pub fn tamper_ciphertext(&self, byte: usize) {
        let Some(mut payload) = self.payload() else {
            return;
        };
        let mut ciphertext = BASE64.decode(&payload.ciphertext).unwrap_or_default();
        if ciphertext.is_empty() {
            return;
        }
        let index = byte % ciphertext.len();
        ciphertext[index] ^= 0x01;
        payload.ciphertext = BASE64.encode(ciphertext);
        self.seed_payload(&payload);
    }

    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        if request.header_value("authorization") != Some(bearer(&self.token).as_str()) {
            return unauthorized();
        }
        if !url_path(&request.url).contains("/contents/") {
            return HttpResponse::new(404, "Not Found");
        }
        match request.method {
            Method::Get => match self.blob.lock().as_ref() {
                Some(blob) => {
                    // The real API wraps base64 at 60 columns.
                    let wrapped = blob
                        .content
                        .as_bytes()
                        .chunks(60)
                        .map(|c| String::from_utf8_lossy(c).into_owned())
                        .collect::<Vec<_>>()
                        .join("\n");
                    HttpResponse::json_value(
                        200,
                        &json!({ "sha": blob.sha, "content": wrapped, "encoding": "base64" }),
                    )
                }
                None => HttpResponse::new(404, "Not Found"),
            },
            Method::Put => {
                let body: Value = match request.json() {
                    Ok(body) => body,
                    Err(e) => return bad_request(e),
                };
                let Some(content) = body.get("content").and_then(Value::as_str) else {
                    return bad_request("content is required");
                };
                let offered = body.get("sha").and_then(Value::as_str);
                let current = self.sha();
                if offered != current.as_deref() {
                    return HttpResponse::json_value(409, &json!({ "message": "sha does not match" }));
                }
                let sha = self.next_sha();
                let created = current.is_none();
                *self.blob.lock() = Some(Blob {
                    sha: sha.clone(),
                    content: content.to_string(),
                });
                HttpResponse::json_value(
                    if created { 201 } else { 200 },
                    &json!({ "content": { "sha": sha } }),
                )
            }
            _ => HttpResponse::new(405, ""),
        }
    }
}

#[async_trait]
impl HttpClient for FakeContentsBackend {
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        if let Some(failure) = self.recorder.record(&request) {
            return Ok(failure);
        }
        Ok(self.handle(&request))
    }
}
