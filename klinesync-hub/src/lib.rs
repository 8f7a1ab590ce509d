//! klinesync-hub
//!
//! `DatasetStore` backed by a Hugging Face dataset repository.
//!
//! - download: `GET {endpoint}/datasets/{repo}/resolve/{revision}/{path}`
//! - upload: `POST {endpoint}/api/datasets/{repo}/preupload/{revision}` first;
//!   files the hub tracks with LFS go through the LFS batch API and the commit
//!   carries an `lfsFile` pointer, anything else is inlined as base64
//! - upload / delete: `POST {endpoint}/api/datasets/{repo}/commit/{revision}`
//!   with an NDJSON body (one header line, then one operation line)
//! - list: `GET {endpoint}/api/datasets/{repo}/tree/{revision}/{prefix}?recursive=true`,
//!   following `Link: <...>; rel="next"` pages
#![warn(missing_docs)]

mod builder;
mod lfs;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use klinesync_core::{DatasetStore, StoreConfig, SyncError};
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, LINK, RETRY_AFTER};
use serde::Deserialize;
use url::Url;

use crate::lfs::{LfsPointer, UploadMode};

pub use builder::HubStoreBuilder;

const NAME: &str = "hub";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Dataset repository client.
pub struct HubStore {
    client: reqwest::Client,
    endpoint: Url,
    owner: String,
    repo: String,
    revision: String,
    token: Option<String>,
}

#[derive(Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
}

impl HubStore {
    /// Expert-only: construct an unwrapped store for manual composition.
    ///
    /// # Errors
    /// Returns `SyncError::InvalidArg` for a malformed endpoint or repo id, and
    /// `SyncError::Remote` if the HTTP client cannot be built.
    pub fn new_raw(config: &StoreConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("klinesync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::remote(NAME, e.to_string()))?;
        Self::with_client(client, config)
    }

    /// Use a preconfigured `reqwest::Client`.
    ///
    /// # Errors
    /// Returns `SyncError::InvalidArg` for a malformed endpoint or repo id.
    pub fn with_client(client: reqwest::Client, config: &StoreConfig) -> Result<Self, SyncError> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            SyncError::InvalidArg(format!("invalid hub endpoint {:?}: {e}", config.endpoint))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(SyncError::InvalidArg(format!(
                "hub endpoint cannot be a base url: {}",
                config.endpoint
            )));
        }
        let (owner, repo) = config
            .repo_id
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| {
                SyncError::InvalidArg(format!(
                    "repo id must look like owner/name: {:?}",
                    config.repo_id
                ))
            })?;
        Ok(Self {
            client,
            endpoint,
            owner: owner.to_string(),
            repo: repo.to_string(),
            revision: config.revision.clone(),
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn url<'a>(&self, head: &[&str], tail: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segs) = url.path_segments_mut() {
            segs.pop_if_empty();
            segs.extend(head);
            segs.extend(tail.into_iter().filter(|s| !s.is_empty()));
        }
        url
    }

    fn resolve_url(&self, path: &str) -> Url {
        self.url(
            &[
                "datasets",
                self.owner.as_str(),
                self.repo.as_str(),
                "resolve",
                self.revision.as_str(),
            ],
            path.split('/'),
        )
    }

    fn api_url(&self, action: &str) -> Url {
        self.url(
            &[
                "api",
                "datasets",
                self.owner.as_str(),
                self.repo.as_str(),
                action,
                self.revision.as_str(),
            ],
            std::iter::empty(),
        )
    }

    fn tree_url(&self, prefix: &str) -> Url {
        let mut url = self.url(
            &[
                "api",
                "datasets",
                self.owner.as_str(),
                self.repo.as_str(),
                "tree",
                self.revision.as_str(),
            ],
            prefix.split('/'),
        );
        url.query_pairs_mut().append_pair("recursive", "true");
        url
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, SyncError> {
        self.authed(req)
            .send()
            .await
            .map_err(|e| SyncError::remote(NAME, e.to_string()))
    }

    async fn commit(
        &self,
        path: &str,
        operation: serde_json::Value,
        summary: &str,
    ) -> Result<(), SyncError> {
        let header = serde_json::json!({
            "key": "header",
            "value": { "summary": summary, "description": "" },
        });
        let body = format!("{header}\n{operation}\n");
        let resp = self
            .send(
                self.client
                    .post(self.api_url("commit"))
                    .header(CONTENT_TYPE, "application/x-ndjson")
                    .body(body),
            )
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(SyncError::not_found(format!(
                "{path} in {}/{}",
                self.owner, self.repo
            ))),
            _ => Err(status_error(resp).await),
        }
    }
}

fn retry_after_ms(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| secs.saturating_mul(1_000))
}

/// Map a non-success response onto the error taxonomy.
async fn status_error(resp: reqwest::Response) -> SyncError {
    let status = resp.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return SyncError::rate_limited(NAME, retry_after_ms(&resp));
    }
    let body = resp.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return SyncError::InvalidArg(format!("{NAME} rejected credentials ({status}): {body}"));
    }
    SyncError::remote(NAME, format!("HTTP {status}: {body}"))
}

/// Next page from a `Link` header, if any.
fn next_link(resp: &reqwest::Response) -> Option<Url> {
    let header = resp.headers().get(LINK)?.to_str().ok()?;
    header.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.contains("rel=\"next\"") {
            return None;
        }
        let target = target.trim().strip_prefix('<')?.strip_suffix('>')?;
        Url::parse(target).ok()
    })
}

#[async_trait]
impl DatasetStore for HubStore {
    fn name(&self) -> &'static str {
        NAME
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "klinesync_hub::download", skip(self))
    )]
    async fn download(&self, path: &str) -> Result<Option<Bytes>, SyncError> {
        let resp = self.send(self.client.get(self.resolve_url(path))).await?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => resp
                .bytes()
                .await
                .map(Some)
                .map_err(|e| SyncError::remote(NAME, e.to_string())),
            _ => Err(status_error(resp).await),
        }
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "klinesync_hub::upload",
            skip(self, content),
            fields(bytes = content.len()),
        )
    )]
    async fn upload(&self, path: &str, content: Bytes, message: &str) -> Result<(), SyncError> {
        let op = match self.preupload(path, &content).await? {
            None => {
                return Err(SyncError::InvalidArg(format!(
                    "{path} is ignored by {}/{}",
                    self.owner, self.repo
                )));
            }
            Some(UploadMode::Regular) => serde_json::json!({
                "key": "file",
                "value": {
                    "content": STANDARD.encode(&content),
                    "path": path,
                    "encoding": "base64",
                },
            }),
            Some(UploadMode::Lfs) => {
                let pointer = LfsPointer::of(&content);
                self.upload_lfs(&content, &pointer).await?;
                pointer.commit_line(path)
            }
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(path, lfs = op["key"] == "lfsFile", "committing");
        self.commit(path, op, message).await
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "klinesync_hub::list", skip(self))
    )]
    async fn list(&self, prefix: &str) -> Result<Vec<String>, SyncError> {
        let mut out = Vec::new();
        let mut next = Some(self.tree_url(prefix));
        while let Some(url) = next.take() {
            let resp = self.send(self.client.get(url)).await?;
            match resp.status() {
                StatusCode::NOT_FOUND => break,
                s if s.is_success() => {}
                _ => return Err(status_error(resp).await),
            }
            next = next_link(&resp);
            let body = resp
                .bytes()
                .await
                .map_err(|e| SyncError::remote(NAME, e.to_string()))?;
            let entries: Vec<TreeEntry> = serde_json::from_slice(&body)
                .map_err(|e| SyncError::Data(format!("{NAME}: malformed tree listing: {e}")))?;
            out.extend(
                entries
                    .into_iter()
                    .filter(|e| e.kind == "file")
                    .map(|e| e.path),
            );
        }
        Ok(out)
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(name = "klinesync_hub::delete", skip(self))
    )]
    async fn delete(&self, path: &str, message: &str) -> Result<(), SyncError> {
        let op = serde_json::json!({
            "key": "deletedFile",
            "value": { "path": path },
        });
        self.commit(path, op, message).await
    }
}
