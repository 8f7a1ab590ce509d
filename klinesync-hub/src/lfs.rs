//! Preupload negotiation and git-lfs transfers.
//!
//! Before a file is committed the hub is asked how it wants the content
//! (`preupload`). Files it tracks with LFS are pushed through the LFS batch
//! API (single `PUT` or multipart) and the commit only carries a pointer.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use klinesync_core::SyncError;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, ETAG};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use url::Url;

use crate::{HubStore, NAME, status_error};

const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";
const SAMPLE_LEN: usize = 512;
const CHUNK_SIZE_KEY: &str = "chunk_size";

/// How the hub wants a file's content delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum UploadMode {
    /// Inline base64 inside the commit.
    Regular,
    /// LFS object referenced from the commit.
    Lfs,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
    #[serde(default)]
    should_ignore: bool,
}

#[derive(Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Deserialize)]
struct BatchResponse {
    objects: Vec<BatchObject>,
}

#[derive(Deserialize)]
struct BatchObject {
    #[serde(default)]
    actions: Option<Actions>,
    #[serde(default)]
    error: Option<ObjectError>,
}

#[derive(Deserialize)]
struct ObjectError {
    code: u16,
    message: String,
}

#[derive(Deserialize)]
struct Actions {
    upload: Option<Action>,
    verify: Option<Action>,
}

#[derive(Deserialize)]
struct Action {
    href: String,
    #[serde(default)]
    header: BTreeMap<String, Value>,
}

impl Action {
    fn url(&self) -> Result<Url, SyncError> {
        Url::parse(&self.href)
            .map_err(|e| SyncError::Data(format!("{NAME}: bad lfs action url {:?}: {e}", self.href)))
    }

    /// Part number to upload URL, in part order.
    fn parts(&self) -> Vec<(u32, String)> {
        // keys are not always zero padded, so order numerically
        let mut parts: Vec<(u32, String)> = self
            .header
            .iter()
            .filter_map(|(k, v)| Some((k.parse().ok()?, header_text(v)?)))
            .collect();
        parts.sort_by_key(|(n, _)| *n);
        parts
    }

    fn chunk_size(&self) -> Option<usize> {
        self.header
            .get(CHUNK_SIZE_KEY)
            .and_then(header_text)
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
    }

    /// Plain headers to send along, without the multipart bookkeeping keys.
    fn apply_headers(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        self.header
            .iter()
            .filter(|(k, _)| k.as_str() != CHUNK_SIZE_KEY && k.parse::<u32>().is_err())
            .filter_map(|(k, v)| header_text(v).map(|v| (k, v)))
            .fold(req, |req, (k, v)| req.header(k.as_str(), v))
    }
}

fn header_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Content address of an LFS object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LfsPointer {
    pub(crate) oid: String,
    pub(crate) size: usize,
}

impl LfsPointer {
    pub(crate) fn of(content: &[u8]) -> Self {
        Self {
            oid: format!("{:x}", Sha256::digest(content)),
            size: content.len(),
        }
    }

    /// Commit line referencing this object at `path`.
    pub(crate) fn commit_line(&self, path: &str) -> Value {
        json!({
            "key": "lfsFile",
            "value": {
                "path": path,
                "algo": "sha256",
                "oid": self.oid,
                "size": self.size,
            },
        })
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T, SyncError> {
    let body = resp
        .bytes()
        .await
        .map_err(|e| SyncError::remote(NAME, e.to_string()))?;
    serde_json::from_slice(&body)
        .map_err(|e| SyncError::Data(format!("{NAME}: malformed {what} response: {e}")))
}

async fn expect_success(resp: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    if resp.status().is_success() {
        Ok(resp)
    } else {
        Err(status_error(resp).await)
    }
}

impl HubStore {
    /// Ask the hub how `path` should be uploaded. `None` means the repository
    /// ignores the path.
    pub(crate) async fn preupload(
        &self,
        path: &str,
        content: &Bytes,
    ) -> Result<Option<UploadMode>, SyncError> {
        let sample = STANDARD.encode(&content[..content.len().min(SAMPLE_LEN)]);
        let body = json!({
            "files": [{ "path": path, "sample": sample, "size": content.len() }],
        });
        let resp = self
            .send(
                self.client
                    .post(self.api_url("preupload"))
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.to_string()),
            )
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::not_found(format!("{}/{}", self.owner, self.repo)));
        }
        let parsed: PreuploadResponse = read_json(expect_success(resp).await?, "preupload").await?;
        let file = parsed
            .files
            .into_iter()
            .find(|f| f.path == path)
            .ok_or_else(|| SyncError::Data(format!("{NAME}: preupload skipped {path}")))?;
        Ok((!file.should_ignore).then_some(file.upload_mode))
    }

    /// Push `content` to LFS storage unless the hub already holds it.
    pub(crate) async fn upload_lfs(&self, content: &Bytes, pointer: &LfsPointer) -> Result<(), SyncError> {
        let git_repo = format!("{}.git", self.repo);
        let url = self.url(
            &[
                "datasets",
                self.owner.as_str(),
                git_repo.as_str(),
                "info",
                "lfs",
                "objects",
                "batch",
            ],
            std::iter::empty(),
        );
        let body = json!({
            "operation": "upload",
            "transfers": ["basic", "multipart"],
            "objects": [{ "oid": pointer.oid, "size": pointer.size }],
            "hash_algo": "sha256",
            "ref": { "name": self.revision },
        });
        let resp = self
            .send(
                self.client
                    .post(url)
                    .header(ACCEPT, LFS_MEDIA_TYPE)
                    .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
                    .body(body.to_string()),
            )
            .await?;
        let batch: BatchResponse = read_json(expect_success(resp).await?, "lfs batch").await?;
        let object = batch
            .objects
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::Data(format!("{NAME}: lfs batch returned no objects")))?;
        if let Some(err) = object.error {
            let msg = format!("lfs object {} rejected ({}): {}", pointer.oid, err.code, err.message);
            return Err(if (400..500).contains(&err.code) && err.code != 429 {
                SyncError::Data(format!("{NAME}: {msg}"))
            } else {
                SyncError::remote(NAME, msg)
            });
        }
        // no actions: the object is already stored
        let Some(actions) = object.actions else {
            #[cfg(feature = "tracing")]
            tracing::debug!(oid = %pointer.oid, "lfs object already present");
            return Ok(());
        };
        if let Some(upload) = &actions.upload {
            match upload.chunk_size() {
                Some(chunk_size) => self.put_parts(upload, chunk_size, content, pointer).await?,
                None => self.put_whole(upload, content).await?,
            }
        }
        if let Some(verify) = &actions.verify {
            self.verify(verify, pointer).await?;
        }
        Ok(())
    }

    async fn put_whole(&self, action: &Action, content: &Bytes) -> Result<(), SyncError> {
        let resp = action
            .apply_headers(self.client.put(action.url()?))
            .body(content.clone())
            .send()
            .await
            .map_err(|e| SyncError::remote(NAME, e.to_string()))?;
        expect_success(resp).await.map(drop)
    }

    async fn put_parts(
        &self,
        action: &Action,
        chunk_size: usize,
        content: &Bytes,
        pointer: &LfsPointer,
    ) -> Result<(), SyncError> {
        let parts = action.parts();
        let chunks = pointer.size.div_ceil(chunk_size);
        if parts.len() != chunks {
            return Err(SyncError::Data(format!(
                "{NAME}: lfs offered {} part urls for {chunks} chunks",
                parts.len()
            )));
        }
        let mut done = Vec::with_capacity(parts.len());
        for ((number, href), start) in parts.into_iter().zip((0..pointer.size).step_by(chunk_size)) {
            let url = Url::parse(&href)
                .map_err(|e| SyncError::Data(format!("{NAME}: bad lfs part url {href:?}: {e}")))?;
            let end = (start + chunk_size).min(pointer.size);
            let resp = self
                .client
                .put(url)
                .body(content.slice(start..end))
                .send()
                .await
                .map_err(|e| SyncError::remote(NAME, e.to_string()))?;
            let resp = expect_success(resp).await?;
            let etag = resp
                .headers()
                .get(ETAG)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| SyncError::remote(NAME, format!("lfs part {number} returned no ETag")))?;
            done.push(json!({ "partNumber": number, "etag": etag }));
        }
        let body = json!({ "oid": pointer.oid, "parts": done });
        let resp = self
            .client
            .post(action.url()?)
            .header(ACCEPT, LFS_MEDIA_TYPE)
            .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| SyncError::remote(NAME, e.to_string()))?;
        expect_success(resp).await.map(drop)
    }

    async fn verify(&self, action: &Action, pointer: &LfsPointer) -> Result<(), SyncError> {
        let body = json!({ "oid": pointer.oid, "size": pointer.size });
        let resp = self
            .send(
                action
                    .apply_headers(self.client.post(action.url()?))
                    .header(ACCEPT, LFS_MEDIA_TYPE)
                    .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
                    .body(body.to_string()),
            )
            .await?;
        expect_success(resp).await.map(drop)
    }
}
