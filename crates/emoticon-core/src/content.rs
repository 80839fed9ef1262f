//! Content-addressed blob storage.
//!
//! Bytes are fetched through a [`Transport`], hashed with SHA-256, and written
//! once to `<content_dir>/<hex digest><ext>`. Identical bytes from any number of
//! URLs land on the same file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ContentError, TransportError};
use crate::transport::Transport;

pub struct ContentStore {
    base_dir: PathBuf,
    allowed_extensions: Vec<String>,
    default_extension: String,
    transport: Arc<dyn Transport>,
}

impl ContentStore {
    pub fn new(config: &Config, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_dir: config.content_path(),
            allowed_extensions: config.allowed_extensions.clone(),
            default_extension: config.default_extension.clone(),
            transport,
        }
    }

    #[cfg(test)]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Create the content directory if missing. A non-directory at that path is fatal.
    pub async fn initialize(&self) -> Result<(), ContentError> {
        match tokio::fs::metadata(&self.base_dir).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ContentError::NotADirectory(self.base_dir.clone())),
            Err(_) => {
                tokio::fs::create_dir_all(&self.base_dir)
                    .await
                    .map_err(|source| ContentError::Io {
                        path: self.base_dir.clone(),
                        source,
                    })?;
                info!("Created content directory {}", self.base_dir.display());
                Ok(())
            }
        }
    }

    /// Download `url` and persist it under its content hash. Returns the stored path.
    pub async fn fetch_and_store(&self, url: &str) -> Result<PathBuf, ContentError> {
        let parsed =
            reqwest::Url::parse(url).map_err(|_| TransportError::InvalidUrl(url.to_string()))?;
        let body = self.transport.fetch(url).await?;

        let ext = self.extension_for(&parsed);
        let path = self.base_dir.join(format!("{}{}", content_hash(&body), ext));
        self.write_once(&path, &body).await?;
        Ok(path)
    }

    /// Read stored bytes back.
    pub async fn resolve(&self, path: &Path) -> Result<Vec<u8>, ContentError> {
        tokio::fs::read(path).await.map_err(|source| ContentError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    // Any failure of the existence check counts as "absent".
    async fn write_once(&self, path: &Path, body: &[u8]) -> Result<(), ContentError> {
        if tokio::fs::metadata(path).await.is_ok() {
            debug!("Content {} already stored", path.display());
            return Ok(());
        }
        tokio::fs::write(path, body)
            .await
            .map_err(|source| ContentError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Stored {} bytes at {}", body.len(), path.display());
        Ok(())
    }

    fn extension_for(&self, url: &reqwest::Url) -> String {
        let last = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("");
        let ext = Path::new(last)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e));

        match ext {
            Some(ext) if self.allowed_extensions.contains(&ext) => ext,
            _ => self.default_extension.clone(),
        }
    }
}

/// Hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(&hasher.finalize())
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubTransport;

    fn store_in(dir: &Path, transport: StubTransport) -> ContentStore {
        let config = Config::rooted_at(dir);
        ContentStore::new(&config, Arc::new(transport))
    }

    #[test]
    fn test_content_hash_known_value() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_initialize_creates_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path(), StubTransport::new());
        store.initialize().await.unwrap();
        assert!(store.base_dir().is_dir());
        // Second call is a no-op.
        store.initialize().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_rejects_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("emoticons"), b"oops").unwrap();
        let store = store_in(tmp.path(), StubTransport::new());
        assert!(matches!(
            store.initialize().await,
            Err(ContentError::NotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_same_bytes_same_path() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = StubTransport::new()
            .serve("https://a.example/one.png", b"same bytes")
            .serve("https://b.example/other/two.png", b"same bytes");
        let store = store_in(tmp.path(), transport);
        store.initialize().await.unwrap();

        let p1 = store.fetch_and_store("https://a.example/one.png").await.unwrap();
        let p2 = store
            .fetch_and_store("https://b.example/other/two.png")
            .await
            .unwrap();
        assert_eq!(p1, p2);
        assert_eq!(std::fs::read_dir(store.base_dir()).unwrap().count(), 1);
        assert_eq!(store.resolve(&p1).await.unwrap(), b"same bytes");
    }

    #[tokio::test]
    async fn test_extension_normalization() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = StubTransport::new()
            .serve("https://x.example/a.gif", b"gif")
            .serve("https://x.example/b.webp", b"webp")
            .serve("https://x.example/c", b"none")
            .serve("https://x.example/d.PNG", b"upper");
        let store = store_in(tmp.path(), transport);
        store.initialize().await.unwrap();

        let gif = store.fetch_and_store("https://x.example/a.gif").await.unwrap();
        let webp = store.fetch_and_store("https://x.example/b.webp").await.unwrap();
        let none = store.fetch_and_store("https://x.example/c").await.unwrap();
        let upper = store.fetch_and_store("https://x.example/d.PNG").await.unwrap();

        assert_eq!(gif.extension().unwrap(), "gif");
        assert_eq!(webp.extension().unwrap(), "jpg");
        assert_eq!(none.extension().unwrap(), "jpg");
        assert_eq!(upper.extension().unwrap(), "jpg");
    }

    #[tokio::test]
    async fn test_existing_file_not_rewritten() {
        let tmp = tempfile::tempdir().unwrap();
        let transport = StubTransport::new().serve("https://x.example/a.png", b"payload");
        let store = store_in(tmp.path(), transport);
        store.initialize().await.unwrap();

        let path = store.base_dir().join(format!("{}.png", content_hash(b"payload")));
        std::fs::write(&path, b"preexisting").unwrap();

        let stored = store.fetch_and_store("https://x.example/a.png").await.unwrap();
        assert_eq!(stored, path);
        assert_eq!(std::fs::read(&path).unwrap(), b"preexisting");
    }

    #[tokio::test]
    async fn test_download_failure_surfaces() {
        let tmp = tempfile::tempdir().unwrap();
        let store = store_in(tmp.path(), StubTransport::new());
        store.initialize().await.unwrap();
        let err = store
            .fetch_and_store("https://x.example/missing.png")
            .await
            .unwrap_err();
        assert!(matches!(err, ContentError::Download(_)));
    }
}
