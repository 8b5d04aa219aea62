//! Artifact blob storage over two interchangeable backends.
//!
//! The pipeline persists artifacts through the [`BlobStore`] trait and never
//! touches paths or URLs directly. [`LocalStore`] maps keys onto a directory
//! tree with atomic temp-then-rename writes; [`RemoteStore`] speaks
//! path-style HTTP to an object gateway. Which one is used is decided once at
//! startup by [`open_blob_store`].

use async_trait::async_trait;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;

use super::config::{IngestConfig, StorageConfig};
use super::error::{IngestError, Result};

/// Key-addressed blob storage.
///
/// Keys are slash-separated relative paths (see the `layout` module for the
/// artifact scheme). Writes replace whole objects; there are no partial
/// updates.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
    /// Retrieves the object at `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    /// Reports whether an object exists at `key`.
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Lists all keys starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Selects and constructs the blob storage backend for this configuration.
pub fn open_blob_store(config: &IngestConfig) -> Result<Arc<dyn BlobStore>> {
    match &config.storage {
        StorageConfig::Local { root } => Ok(Arc::new(LocalStore::new(root.clone()))),
        StorageConfig::Remote {
            endpoint,
            bucket,
            prefix,
            token,
        } => Ok(Arc::new(RemoteStore::new(
            endpoint,
            bucket,
            prefix,
            token.clone(),
            config.timeout,
        )?)),
    }
}

/// Writes `bytes` to `path` atomically: the data goes to a temp file in the
/// destination directory, is synced, and takes the final name by rename.
/// Readers observe either the old content or the new, never a torn write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().ok_or_else(|| {
        IngestError::StorageError(format!("path has no parent directory: {}", path.display()))
    })?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    Ok(())
}

/// Blob storage on the local filesystem under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn key_path(&self, key: &str) -> PathBuf {
        let mut path = self.root.clone();
        for segment in key.split('/').filter(|s| !s.is_empty()) {
            path.push(segment);
        }
        path
    }

    fn collect_keys(dir: &Path, base: &Path, out: &mut Vec<String>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                Self::collect_keys(&path, base, out)?;
            } else if let Ok(relative) = path.strip_prefix(base) {
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(key);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.key_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomic(&path, bytes)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.key_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.key_path(key).is_file())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        Self::collect_keys(&self.root, &self.root, &mut keys)?;
        keys.retain(|k| k.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

/// Blob storage on an HTTP object gateway.
///
/// The gateway speaks a path-style protocol: objects live at
/// `{endpoint}/{bucket}/{prefix}/{key}` and respond to `PUT`, `GET`, and
/// `HEAD`; `GET {endpoint}/{bucket}?prefix=<p>` returns a JSON body
/// `{"keys": [...]}` listing matching keys within the bucket. An optional
/// bearer token is sent with every request. Writes are last-writer-wins per
/// object; the gateway offers no compare-and-swap.
pub struct RemoteStore {
    client: reqwest::Client,
    endpoint: String,
    bucket: String,
    prefix: String,
    token: Option<String>,
}

#[derive(serde::Deserialize)]
struct ListingResponse {
    keys: Vec<String>,
}

impl RemoteStore {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        prefix: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                IngestError::ConfigError(format!("Failed to build gateway client: {}", e))
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            token,
        })
    }

    fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.prefix, key)
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, self.full_key(key))
    }

    fn listing_url(&self, prefix: &str) -> String {
        format!(
            "{}/{}?prefix={}",
            self.endpoint,
            self.bucket,
            self.full_key(prefix)
        )
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BlobStore for RemoteStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let url = self.object_url(key);
        let response = self
            .authorize(self.client.put(&url).body(bytes.to_vec()))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(IngestError::StorageError(format!(
                "PUT {} returned {}",
                url,
                response.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let url = self.object_url(key);
        let response = self.authorize(self.client.get(&url)).send().await?;
        match response.status() {
            status if status.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status => Err(IngestError::StorageError(format!(
                "GET {} returned {}",
                url, status
            ))),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let url = self.object_url(key);
        let response = self.authorize(self.client.head(&url)).send().await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            reqwest::StatusCode::NOT_FOUND => Ok(false),
            status => Err(IngestError::StorageError(format!(
                "HEAD {} returned {}",
                url, status
            ))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let url = self.listing_url(prefix);
        let response = self.authorize(self.client.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(IngestError::StorageError(format!(
                "LIST {} returned {}",
                url,
                response.status()
            )));
        }
        let listing: ListingResponse = serde_json::from_str(&response.text().await?)?;

        let strip = if self.prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.prefix)
        };
        let mut keys: Vec<String> = listing
            .keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&strip).map(str::to_string))
            .collect();
        keys.sort();
        Ok(keys)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        assert!(store.get("filings/ACME/a.htm").await.unwrap().is_none());
        assert!(!store.exists("filings/ACME/a.htm").await.unwrap());

        store.put("filings/ACME/a.htm", b"<html/>").await.unwrap();
        store.put("filings/ACME/a.txt", b"text").await.unwrap();
        store.put("filings/OTHER/b.htm", b"other").await.unwrap();

        assert_eq!(
            store.get("filings/ACME/a.htm").await.unwrap().unwrap(),
            b"<html/>"
        );
        assert!(store.exists("filings/ACME/a.txt").await.unwrap());

        let keys = store.list("filings/ACME/").await.unwrap();
        assert_eq!(keys, vec!["filings/ACME/a.htm", "filings/ACME/a.txt"]);
    }

    #[tokio::test]
    async fn test_local_store_put_replaces() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(dir.path());

        store.put("state/watchlist.json", b"v1").await.unwrap();
        store.put("state/watchlist.json", b"v2").await.unwrap();
        assert_eq!(
            store.get("state/watchlist.json").await.unwrap().unwrap(),
            b"v2"
        );
    }

    #[tokio::test]
    async fn test_remote_store_round_trip() {
        let gateway = gateway::spawn();
        let store = RemoteStore::new(
            &gateway.endpoint,
            "vault",
            "prod",
            None,
            Duration::from_secs(5),
        )
        .unwrap();

        assert!(store.get("filings/ACME/a.htm").await.unwrap().is_none());

        store.put("filings/ACME/a.htm", b"<html/>").await.unwrap();
        store.put("filings/ACME/a.txt", b"text").await.unwrap();

        assert_eq!(
            store.get("filings/ACME/a.htm").await.unwrap().unwrap(),
            b"<html/>"
        );
        assert!(store.exists("filings/ACME/a.htm").await.unwrap());
        assert!(!store.exists("filings/ACME/missing").await.unwrap());

        // Keys come back without the configured prefix.
        let keys = store.list("filings/ACME/").await.unwrap();
        assert_eq!(keys, vec!["filings/ACME/a.htm", "filings/ACME/a.txt"]);

        // On the wire the prefix is present.
        assert!(
            gateway
                .objects
                .lock()
                .unwrap()
                .contains_key("vault/prod/filings/ACME/a.htm")
        );
    }

    #[tokio::test]
    async fn test_remote_store_sends_bearer_token() {
        let gateway = gateway::spawn();
        let store = RemoteStore::new(
            &gateway.endpoint,
            "vault",
            "",
            Some("sekrit".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();

        store.put("a", b"1").await.unwrap();
        let seen = gateway.auth_headers.lock().unwrap();
        assert!(seen.iter().any(|h| h == "Bearer sekrit"));
    }
}
