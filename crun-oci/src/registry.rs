//! Docker Registry HTTP API v2 client: anonymous bearer-token auth,
//! index/manifest/blob fetches, bounded-parallel blob download.

use std::os::unix::fs::PermissionsExt as _;
use std::path::Path;
use std::sync::Arc;

use futures_util::StreamExt as _;
use serde::Deserialize;
use tokio::io::AsyncWriteExt as _;
use tokio::sync::Semaphore;

use crate::codec::Descriptor;
use crate::error::{Error, Result};
use crate::reference::digest_hex;

/// Registry base URL. Kept in sync with [`download_blob`]'s base — both
/// read from this same constant.
const REGISTRY: &str = "https://registry-1.docker.io";

/// Token issuer base URL.
const AUTH: &str = "https://auth.docker.io";

/// Maximum number of concurrent blob transfers. Fixed rather than
/// configurable: the fan-out width is part of this client's contract with
/// callers, not a tunable.
const MAX_CONCURRENT_TRANSFERS: usize = 4;

/// `Accept` header media types for [`get_image_index`], in priority order.
const INDEX_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
     application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

/// Anonymous bearer-token client against `registry-1.docker.io`.
#[derive(Debug, Clone)]
pub struct Registry {
    /// The underlying HTTP client, reused across requests (connection
    /// pooling, one resolver).
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Builds a client with a bounded per-request timeout, since the spec
    /// leaves the default client's lack of one as an implementer's
    /// responsibility to close.
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self { http }
    }

    /// GETs an anonymous pull-scope bearer token for `repo` (the
    /// registry-facing, `library/`-qualified form).
    pub async fn get_token(&self, repo: &str) -> Result<String> {
        let url = format!(
            "{AUTH}/token?service=registry.docker.io&scope=repository:{repo}:pull"
        );
        let resp = self.http.get(&url).send().await?;
        let resp = resp.error_for_status()?;
        let body: TokenResponse = resp.json().await?;
        Ok(body.token)
    }

    /// `GET /v2/<repo>/manifests/<tag>` with the multi-arch `Accept`
    /// priority list. Returns the raw response body (an index, or a
    /// single-platform manifest if the registry has no multi-arch variant).
    pub async fn get_image_index(&self, repo: &str, tag: &str, token: &str) -> Result<Vec<u8>> {
        let url = format!("{REGISTRY}/v2/{repo}/manifests/{tag}");
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, INDEX_ACCEPT)
            .send()
            .await?;
        let resp = resp.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// `GET /v2/<repo>/blobs/<digest>` — manifests are content-addressable
    /// blobs on Docker Hub, so the platform manifest is fetched from the
    /// blobs endpoint rather than `/manifests/<digest>`. This is specific
    /// to Docker Hub's behavior; a registry that rejects manifest digests
    /// at the blobs endpoint would need `/manifests/<digest>` instead.
    pub async fn get_image_manifest(&self, repo: &str, digest: &str, token: &str) -> Result<Vec<u8>> {
        let url = format!("{REGISTRY}/v2/{repo}/blobs/{digest}");
        let resp = self.http.get(&url).bearer_auth(token).send().await?;
        let resp = resp.error_for_status()?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// `GET /v2/<repo>/blobs/<digest>`; only HTTP 200 is accepted; streams
    /// the response body into `dest_dir/<hex>.tmp`, renames it to
    /// `dest_dir/<hex>` once fully written, then locks it mode 0444 — the
    /// same temp-write-then-rename-then-chmod discipline `atomic_save` uses
    /// for manifests and tags, applied here chunk-by-chunk so a multi-gigabyte
    /// layer is never held in memory at once.
    pub async fn download_blob(
        &self,
        repo: &str,
        digest: &str,
        token: &str,
        dest_dir: &Path,
    ) -> Result<()> {
        let url = format!("{REGISTRY}/v2/{repo}/blobs/{digest}");
        let resp = self.http.get(&url).bearer_auth(token).send().await?;
        if resp.status() != reqwest::StatusCode::OK {
            return Err(Error::Transport(format!(
                "GET {url}: unexpected status {}",
                resp.status()
            )));
        }

        let hex = digest_hex(digest)?;
        tokio::fs::create_dir_all(dest_dir).await?;
        let dest = dest_dir.join(hex);
        let tmp = dest.with_extension("tmp");

        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &dest).await?;
        tokio::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o444)).await?;
        Ok(())
    }

    /// Fetches a fresh token, then schedules the config blob and every
    /// layer blob concurrently, bounded to
    /// [`MAX_CONCURRENT_TRANSFERS`]. Returns the first reported error, if
    /// any, only after every transfer has completed; partial successes
    /// leave already-written files in place (idempotent on retry).
    pub async fn download_image_blobs(
        &self,
        repo: &str,
        config: &Descriptor,
        layers: &[Descriptor],
        dest_dir: &Path,
    ) -> Result<()> {
        let token = self.get_token(repo).await?;
        let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT_TRANSFERS));

        let mut tasks = Vec::with_capacity(1 + layers.len());
        for descriptor in std::iter::once(config).chain(layers.iter()) {
            let registry = self.clone();
            let repo = repo.to_owned();
            let digest = descriptor.digest.clone();
            let dest_dir = dest_dir.to_path_buf();
            let token = token.clone();
            let semaphore = Arc::clone(&semaphore);
            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| Error::Transport(format!("blob transfer semaphore: {e}")))?;
                registry.download_blob(&repo, &digest, &token, &dest_dir).await
            }));
        }

        let mut first_error = None;
        for task in tasks {
            match task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if first_error.is_none() => first_error = Some(e),
                Err(join_err) if first_error.is_none() => {
                    first_error = Some(Error::Transport(format!("blob task panicked: {join_err}")));
                }
                _ => {}
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_base_urls_are_consistent() {
        assert!(REGISTRY.contains("registry-1.docker.io"));
        assert!(AUTH.contains("auth.docker.io"));
    }

    #[test]
    fn index_accept_header_priority_order() {
        let parts: Vec<&str> = INDEX_ACCEPT.split(", ").collect();
        assert_eq!(parts[0], "application/vnd.oci.image.index.v1+json");
        assert_eq!(
            parts[1],
            "application/vnd.docker.distribution.manifest.list.v2+json"
        );
        assert_eq!(parts[2], "application/vnd.oci.image.manifest.v1+json");
        assert_eq!(
            parts[3],
            "application/vnd.docker.distribution.manifest.v2+json"
        );
    }
}
