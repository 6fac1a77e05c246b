//! Upstream HTTP access and the event document store for evcal.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use evcal_core::{Event, EventSummary};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "evcal-storage";

const SUMMARY_COLLECTION: &str = "summary";
const DETAIL_COLLECTION: &str = "detail";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// Thin wrapper over `reqwest::Client`; one attempt per call, no retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client })
    }

    pub async fn get(&self, source_id: &str, url: &str) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_get", source_id, url);
        async {
            let resp = self.client.get(url).send().await?;
            read_success(resp).await
        }
        .instrument(span)
        .await
    }

    pub async fn post_json(
        &self,
        source_id: &str,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_post", source_id, url);
        async {
            let mut request = self.client.post(url);
            for (name, value) in headers {
                request = request.header(*name, *value);
            }
            let resp = request.json(body).send().await?;
            read_success(resp).await
        }
        .instrument(span)
        .await
    }
}

async fn read_success(resp: reqwest::Response) -> Result<FetchedResponse, FetchError> {
    let status = resp.status();
    let final_url = resp.url().to_string();
    if !status.is_success() {
        return Err(FetchError::HttpStatus {
            status: status.as_u16(),
            url: final_url,
        });
    }
    let body = resp.bytes().await?.to_vec();
    debug!(status = status.as_u16(), bytes = body.len(), "fetched");
    Ok(FetchedResponse {
        status,
        final_url,
        body,
    })
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid event id {0:?}")]
    InvalidId(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Two logical collections (`summary`, `detail`) keyed by event id.
///
/// Both views of an event are written by a single `put_event` call and always
/// replace the previous documents in full.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Returns `true` when an existing record was replaced.
    async fn put_event(&self, event: &Event) -> Result<bool, StoreError>;

    /// Summary collection snapshot, ordered by id.
    async fn summaries(&self) -> Result<Vec<EventSummary>, StoreError>;

    async fn event(&self, id: &str) -> Result<Option<Event>, StoreError>;
}

pub fn is_valid_event_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn validate_id(id: &str) -> Result<(), StoreError> {
    if is_valid_event_id(id) {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

#[derive(Debug, Default)]
struct Collections {
    summary: BTreeMap<String, EventSummary>,
    detail: BTreeMap<String, Event>,
}

#[derive(Debug, Default)]
pub struct MemoryEventStore {
    collections: Mutex<Collections>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn put_event(&self, event: &Event) -> Result<bool, StoreError> {
        validate_id(&event.id)?;
        let mut collections = self.collections.lock().await;
        collections
            .summary
            .insert(event.id.clone(), event.summary());
        let replaced = collections
            .detail
            .insert(event.id.clone(), event.clone())
            .is_some();
        Ok(replaced)
    }

    async fn summaries(&self) -> Result<Vec<EventSummary>, StoreError> {
        let collections = self.collections.lock().await;
        Ok(collections.summary.values().cloned().collect())
    }

    async fn event(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let collections = self.collections.lock().await;
        Ok(collections.detail.get(id).cloned())
    }
}

/// JSON documents on disk: `<root>/summary/<id>.json` and `<root>/detail/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileEventStore {
    root: PathBuf,
}

impl FileEventStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn document_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{id}.json"))
    }

    async fn write_temp(&self, target: &Path, bytes: &[u8]) -> anyhow::Result<PathBuf> {
        let parent = target
            .parent()
            .context("document path always has a parent")?;
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating collection directory {}", parent.display()))?;
        let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
        fs::write(&temp_path, bytes)
            .await
            .with_context(|| format!("writing temp document {}", temp_path.display()))?;
        Ok(temp_path)
    }

    /// Put back the detail view that was current before a failed write.
    async fn restore_detail(&self, detail_path: &Path, previous: Option<&[u8]>) {
        let restored = match previous {
            Some(bytes) => match self.write_temp(detail_path, bytes).await {
                Ok(temp) => rename_into_place(&temp, detail_path).await,
                Err(err) => Err(err),
            },
            None => fs::remove_file(detail_path)
                .await
                .with_context(|| format!("removing document {}", detail_path.display())),
        };
        if let Err(err) = restored {
            warn!(path = %detail_path.display(), error = %err, "could not restore detail view");
        }
    }

    async fn read_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Option<T>> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading document {}", path.display()))
            }
        };
        let doc = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing document {}", path.display()))?;
        Ok(Some(doc))
    }
}

async fn rename_into_place(temp_path: &Path, target: &Path) -> anyhow::Result<()> {
    if let Err(err) = fs::rename(temp_path, target).await {
        let _ = fs::remove_file(temp_path).await;
        return Err(err).with_context(|| {
            format!(
                "atomically renaming temp document {} -> {}",
                temp_path.display(),
                target.display()
            )
        });
    }
    Ok(())
}

#[async_trait]
impl EventStore for FileEventStore {
    async fn put_event(&self, event: &Event) -> Result<bool, StoreError> {
        validate_id(&event.id)?;
        let summary_path = self.document_path(SUMMARY_COLLECTION, &event.id);
        let detail_path = self.document_path(DETAIL_COLLECTION, &event.id);

        let summary_bytes =
            serde_json::to_vec_pretty(&event.summary()).context("serializing summary view")?;
        let detail_bytes = serde_json::to_vec_pretty(event).context("serializing detail view")?;

        let previous_detail = match fs::read(&detail_path).await {
            Ok(bytes) => Some(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("reading document {}", detail_path.display()))
                    .into())
            }
        };
        let replaced = previous_detail.is_some();

        // Both temp files exist before either view is swapped in.
        let summary_temp = self.write_temp(&summary_path, &summary_bytes).await?;
        let detail_temp = match self.write_temp(&detail_path, &detail_bytes).await {
            Ok(path) => path,
            Err(err) => {
                let _ = fs::remove_file(&summary_temp).await;
                return Err(err.into());
            }
        };

        if let Err(err) = rename_into_place(&detail_temp, &detail_path).await {
            let _ = fs::remove_file(&summary_temp).await;
            return Err(err.into());
        }
        if let Err(err) = rename_into_place(&summary_temp, &summary_path).await {
            self.restore_detail(&detail_path, previous_detail.as_deref()).await;
            return Err(err.into());
        }
        Ok(replaced)
    }

    async fn summaries(&self) -> Result<Vec<EventSummary>, StoreError> {
        let dir = self.root.join(SUMMARY_COLLECTION);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(anyhow::Error::new(err)
                    .context(format!("listing collection {}", dir.display()))
                    .into())
            }
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("listing collection {}", dir.display()))?
        {
            let path = entry.path();
            let is_document = path.extension().is_some_and(|ext| ext == "json")
                && !entry.file_name().to_string_lossy().starts_with('.');
            if is_document {
                paths.push(path);
            }
        }
        paths.sort();

        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            if let Some(summary) = Self::read_document::<EventSummary>(&path).await? {
                out.push(summary);
            }
        }
        Ok(out)
    }

    async fn event(&self, id: &str) -> Result<Option<Event>, StoreError> {
        if !is_valid_event_id(id) {
            return Ok(None);
        }
        let path = self.document_path(DETAIL_COLLECTION, id);
        Ok(Self::read_document(&path).await?)
    }
}
