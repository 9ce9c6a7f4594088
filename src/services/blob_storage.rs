use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::services::provider::{build_client, env_string, error_body};

const DEFAULT_BLOB_DIR: &str = "blobs";
const DEFAULT_PUBLIC_URL: &str = "/media";
const DEFAULT_BUCKET: &str = "Images";
const UPLOAD_TIMEOUT_MS: u64 = 30_000;
const LIST_PAGE_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),
    #[error("invalid blob key: {0}")]
    InvalidKey(String),
    #[error("blob I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("blob backend returned HTTP {status}: {body}")]
    HttpStatus { status: reqwest::StatusCode, body: String },
    #[error("blob backend not configured: {0}")]
    NotConfigured(&'static str),
}

/// Decoded `data:<mime>;base64,<payload>` image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: String,
    pub bytes: Bytes,
}

impl ImagePayload {
    pub fn extension(&self) -> &'static str {
        extension_for(&self.mime_type)
    }
}

pub fn is_data_uri(value: &str) -> bool {
    value.starts_with("data:")
}

pub fn decode_data_uri(uri: &str) -> Result<ImagePayload, BlobError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| BlobError::InvalidDataUri("missing data: prefix".into()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| BlobError::InvalidDataUri("missing payload separator".into()))?;
    let mime_type = meta
        .strip_suffix(";base64")
        .ok_or_else(|| BlobError::InvalidDataUri("only base64 payloads are supported".into()))?;
    if !mime_type.starts_with("image/") {
        return Err(BlobError::InvalidDataUri(format!("not an image: {mime_type}")));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| BlobError::InvalidDataUri(e.to_string()))?;

    Ok(ImagePayload {
        mime_type: mime_type.to_string(),
        bytes: Bytes::from(bytes),
    })
}

pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "png",
    }
}

pub fn word_image_key(lesson_id: &str, index: usize, extension: &str) -> String {
    format!("{lesson_id}/word-{index}.{extension}")
}

pub fn distractor_image_key(lesson_id: &str, index: usize, extension: &str) -> String {
    format!("{lesson_id}/distractor-{index}.{extension}")
}

fn validate_key(key: &str) -> Result<(), BlobError> {
    let path = Path::new(key);
    let safe = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(BlobError::InvalidKey(key.to_string()))
    }
}

/// Object storage for lesson images.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    fn name(&self) -> &'static str;

    fn public_url(&self, key: &str) -> String;

    /// Stores the object, overwriting any existing one, and returns its public URL.
    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String, BlobError>;

    /// Removes every object under `prefix/`. Returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, BlobError>;
}

pub struct LocalBlobStorage {
    root: PathBuf,
    public_base: String,
}

impl LocalBlobStorage {
    pub fn new(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base, key)
    }

    async fn put(&self, key: &str, _content_type: &str, bytes: Bytes) -> Result<String, BlobError> {
        validate_key(key)?;
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &bytes).await?;
        debug!(key, size = bytes.len(), "blob stored");
        Ok(self.public_url(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, BlobError> {
        validate_key(prefix)?;
        let dir = self.root.join(prefix);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                removed += 1;
            }
        }
        tokio::fs::remove_dir_all(&dir).await?;
        Ok(removed)
    }
}

#[derive(Debug, Clone)]
pub struct SupabaseConfig {
    pub url: String,
    pub service_key: Option<String>,
    pub bucket: String,
}

pub struct SupabaseBlobStorage {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
}

impl SupabaseBlobStorage {
    pub fn new(config: SupabaseConfig) -> Result<Self, BlobError> {
        let service_key = config
            .service_key
            .ok_or(BlobError::NotConfigured("SUPABASE_SERVICE_KEY"))?;
        Ok(Self {
            client: build_client(Duration::from_millis(UPLOAD_TIMEOUT_MS)),
            base_url: config.url.trim_end_matches('/').to_string(),
            service_key,
            bucket: config.bucket,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, BlobError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        Err(BlobError::HttpStatus {
            status,
            body: error_body(resp).await,
        })
    }
}

#[async_trait]
impl BlobStorage for SupabaseBlobStorage {
    fn name(&self) -> &'static str {
        "supabase"
    }

    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }

    async fn put(&self, key: &str, content_type: &str, bytes: Bytes) -> Result<String, BlobError> {
        validate_key(key)?;
        let resp = self
            .authed(self.client.post(self.object_url(key)))
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(self.public_url(key))
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, BlobError> {
        validate_key(prefix)?;
        let list_url = format!("{}/storage/v1/object/list/{}", self.base_url, self.bucket);
        let resp = self
            .authed(self.client.post(list_url))
            .json(&json!({ "prefix": prefix, "limit": LIST_PAGE_SIZE }))
            .send()
            .await?;
        let objects: Vec<ListedObject> = Self::check(resp).await?.json().await?;
        if objects.is_empty() {
            return Ok(0);
        }

        let keys: Vec<String> = objects
            .iter()
            .map(|o| format!("{prefix}/{}", o.name))
            .collect();
        let delete_url = format!("{}/storage/v1/object/{}", self.base_url, self.bucket);
        let resp = self
            .authed(self.client.delete(delete_url))
            .json(&json!({ "prefixes": keys }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(keys.len())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobBackend {
    Local,
    Supabase,
}

#[derive(Debug, Clone)]
pub struct BlobConfig {
    pub backend: BlobBackend,
    pub dir: PathBuf,
    pub public_url: String,
    pub supabase: SupabaseConfig,
}

impl BlobConfig {
    pub fn from_env() -> Self {
        let backend = match env_string("BLOB_BACKEND").as_deref() {
            Some("supabase") => BlobBackend::Supabase,
            Some("local") | None => BlobBackend::Local,
            Some(other) => {
                warn!(backend = other, "unknown BLOB_BACKEND, using local storage");
                BlobBackend::Local
            }
        };
        Self {
            backend,
            dir: env_string("BLOB_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_blob_dir),
            public_url: env_string("BLOB_PUBLIC_URL")
                .unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string()),
            supabase: SupabaseConfig {
                url: env_string("SUPABASE_URL").unwrap_or_default(),
                service_key: env_string("SUPABASE_SERVICE_KEY"),
                bucket: env_string("SUPABASE_BUCKET").unwrap_or_else(|| DEFAULT_BUCKET.to_string()),
            },
        }
    }

    pub fn build(&self) -> Result<Arc<dyn BlobStorage>, BlobError> {
        let storage: Arc<dyn BlobStorage> = match self.backend {
            BlobBackend::Local => Arc::new(LocalBlobStorage::new(&self.dir, &self.public_url)),
            BlobBackend::Supabase => {
                if self.supabase.url.is_empty() {
                    return Err(BlobError::NotConfigured("SUPABASE_URL"));
                }
                Arc::new(SupabaseBlobStorage::new(self.supabase.clone())?)
            }
        };
        info!(backend = storage.name(), "blob storage ready");
        Ok(storage)
    }
}

fn default_blob_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("vocab-lesson").join(DEFAULT_BLOB_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BLOB_DIR))
}
