//! Ingestion orchestration: source registry, upsert and the scheduled run.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use evcal_adapters::{
    AdapterError, FixturesPageAdapter, FixturesPageConfig, SourceAdapter, WidgetApiAdapter,
    WidgetApiConfig,
};
use evcal_core::Event;
use evcal_storage::{EventStore, FetchError, FileEventStore, HttpClientConfig, HttpFetcher, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

pub const CRATE_NAME: &str = "evcal-sync";

#[derive(Debug, Clone, Deserialize)]
pub struct SourceRegistry {
    pub sources: Vec<SourceConfig>,
}

impl SourceRegistry {
    pub async fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn enabled(&self) -> impl Iterator<Item = &SourceConfig> {
        self.sources.iter().filter(|s| s.enabled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    WidgetApi,
    FixturesPage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub source_id: String,
    pub display_name: String,
    pub enabled: bool,
    pub kind: SourceKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default)]
    pub page_url: Option<String>,
    #[serde(default)]
    pub listing_marker: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

fn override_with(target: &mut String, value: &Option<String>, field: &str, source_id: &str) -> Result<()> {
    if let Some(value) = value {
        anyhow::ensure!(
            !value.trim().is_empty(),
            "source {source_id}: {field} must not be blank"
        );
        *target = value.trim().to_string();
    }
    Ok(())
}

pub fn adapter_for_source(source: &SourceConfig) -> Result<Box<dyn SourceAdapter>> {
    let id = source.source_id.as_str();
    anyhow::ensure!(!id.trim().is_empty(), "source_id must not be blank");
    match source.kind {
        SourceKind::WidgetApi => {
            let mut config = WidgetApiConfig::new(id);
            override_with(&mut config.endpoint, &source.endpoint, "endpoint", id)?;
            override_with(&mut config.origin, &source.origin, "origin", id)?;
            override_with(&mut config.referer, &source.referer, "referer", id)?;
            Ok(Box::new(WidgetApiAdapter::new(config)))
        }
        SourceKind::FixturesPage => {
            let mut config = FixturesPageConfig::new(id);
            override_with(&mut config.page_url, &source.page_url, "page_url", id)?;
            override_with(&mut config.listing_marker, &source.listing_marker, "listing_marker", id)?;
            override_with(&mut config.category, &source.category, "category", id)?;
            Ok(Box::new(FixturesPageAdapter::new(config)))
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Shared secret for triggered runs. `None` rejects every trigger.
    pub update_api_key: Option<String>,
    pub store_dir: PathBuf,
    pub sources_file: PathBuf,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    pub web_port: u16,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            update_api_key: None,
            store_dir: PathBuf::from("./data"),
            sources_file: PathBuf::from("./sources.yaml"),
            user_agent: "evcal-bot/0.1".to_string(),
            http_timeout_secs: 20,
            scheduler_enabled: false,
            sync_cron: "0 0 5 * * *".to_string(),
            web_port: 8000,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            update_api_key: std::env::var("EVCAL_UPDATE_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            store_dir: std::env::var("EVCAL_STORE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.store_dir),
            sources_file: std::env::var("EVCAL_SOURCES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.sources_file),
            user_agent: std::env::var("EVCAL_USER_AGENT").unwrap_or(defaults.user_agent),
            http_timeout_secs: std::env::var("EVCAL_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.http_timeout_secs),
            scheduler_enabled: std::env::var("EVCAL_SCHEDULER_ENABLED")
                .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
                .unwrap_or(defaults.scheduler_enabled),
            sync_cron: std::env::var("EVCAL_SYNC_CRON").unwrap_or(defaults.sync_cron),
            web_port: std::env::var("EVCAL_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.web_port),
        }
    }

    pub fn http_client_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.http_timeout_secs),
            user_agent: Some(self.user_agent.clone()),
        }
    }

    pub fn accepts_key(&self, presented: Option<&str>) -> bool {
        match (self.update_api_key.as_deref(), presented) {
            (Some(expected), Some(presented)) => !expected.is_empty() && expected == presented,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Replaced,
}

/// Writes both views of an event through the store in one call.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn EventStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    pub async fn upsert(&self, event: &Event) -> Result<UpsertOutcome, StoreError> {
        if event.id.trim().is_empty() {
            return Err(StoreError::InvalidId(event.id.clone()));
        }
        let replaced = self.store.put_event(event).await?;
        Ok(if replaced {
            UpsertOutcome::Replaced
        } else {
            UpsertOutcome::Created
        })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Listing items seen across every source, fetched or not.
    pub total_events: usize,
    pub persisted: usize,
    pub created: usize,
    pub replaced: usize,
    pub skipped: usize,
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("listing for source {source_id} unreachable: {source}")]
    Transport {
        source_id: String,
        #[source]
        source: FetchError,
    },
}

pub struct IngestPipeline {
    config: SyncConfig,
    http: HttpFetcher,
    reconciler: Reconciler,
    store: Arc<dyn EventStore>,
    adapters: Vec<Box<dyn SourceAdapter>>,
}

impl IngestPipeline {
    pub fn new(
        config: SyncConfig,
        http: HttpFetcher,
        store: Arc<dyn EventStore>,
        adapters: Vec<Box<dyn SourceAdapter>>,
    ) -> Self {
        Self {
            config,
            http,
            reconciler: Reconciler::new(Arc::clone(&store)),
            store,
            adapters,
        }
    }

    /// Builds adapters for every enabled source in the registry file.
    pub async fn from_config(config: SyncConfig, store: Arc<dyn EventStore>) -> Result<Self> {
        let registry = SourceRegistry::load(&config.sources_file).await?;
        let adapters = registry
            .enabled()
            .map(|source| {
                info!(
                    source_id = %source.source_id,
                    display_name = %source.display_name,
                    "source enabled"
                );
                adapter_for_source(source)
            })
            .collect::<Result<Vec<_>>>()?;
        let http = HttpFetcher::new(config.http_client_config())?;
        Ok(Self::new(config, http, store, adapters))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.store)
    }

    pub fn source_ids(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.source_id()).collect()
    }

    /// Checks the shared secret before anything else, then runs once.
    pub async fn trigger(&self, presented_key: Option<&str>) -> Result<IngestSummary, IngestError> {
        if !self.config.accepts_key(presented_key) {
            warn!("ingestion trigger rejected");
            return Err(IngestError::Unauthorized);
        }
        self.run_once().await
    }

    pub async fn run_once(&self) -> Result<IngestSummary, IngestError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("ingest_run", %run_id);
        self.run_sources(run_id).instrument(span).await
    }

    async fn run_sources(&self, run_id: Uuid) -> Result<IngestSummary, IngestError> {
        let started_at = Utc::now();
        let mut total_events = 0usize;
        let mut created = 0usize;
        let mut replaced = 0usize;
        let mut skipped = 0usize;

        for adapter in &self.adapters {
            let source_id = adapter.source_id();
            let targets = match adapter.fetch_listing(&self.http).await {
                Ok(targets) => targets,
                Err(AdapterError::Transport(source)) => {
                    warn!(source_id, error = %source, "listing unreachable; aborting run");
                    return Err(IngestError::Transport {
                        source_id: source_id.to_string(),
                        source,
                    });
                }
                Err(err) => {
                    warn!(source_id, error = %err, "listing unusable; source contributes no events");
                    continue;
                }
            };
            info!(source_id, listed = targets.len(), "listing fetched");
            total_events += targets.len();

            for target in &targets {
                let event = match adapter.fetch_detail(&self.http, target).await {
                    Ok(Some(event)) => event,
                    Ok(None) => {
                        warn!(source_id, key = %target.key, "no detail available; skipping");
                        skipped += 1;
                        continue;
                    }
                    Err(err) => {
                        warn!(source_id, key = %target.key, error = %err, "detail fetch failed; skipping");
                        skipped += 1;
                        continue;
                    }
                };
                match self.reconciler.upsert(&event).await {
                    Ok(UpsertOutcome::Created) => created += 1,
                    Ok(UpsertOutcome::Replaced) => replaced += 1,
                    Err(err) => {
                        warn!(source_id, key = %target.key, error = %err, "store write failed; skipping");
                        skipped += 1;
                    }
                }
            }
        }

        let summary = IngestSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total_events,
            persisted: created + replaced,
            created,
            replaced,
            skipped,
        };
        info!(
            total_events,
            persisted = summary.persisted,
            created,
            replaced,
            skipped,
            "ingestion run finished"
        );
        Ok(summary)
    }

    /// Cron job running [`IngestPipeline::run_once`] when the scheduler is enabled.
    pub async fn maybe_build_scheduler(self: &Arc<Self>) -> Result<Option<JobScheduler>> {
        if !self.config.scheduler_enabled {
            return Ok(None);
        }

        let sched = JobScheduler::new().await.context("creating scheduler")?;
        let cron = &self.config.sync_cron;
        let pipeline = Arc::clone(self);
        let job = Job::new_async(cron, move |_uuid, _l| {
            let pipeline = Arc::clone(&pipeline);
            Box::pin(async move {
                if let Err(err) = pipeline.run_once().await {
                    warn!(error = %err, "scheduled ingestion failed");
                }
            })
        })
        .with_context(|| format!("creating scheduler job for cron {cron}"))?;
        sched.add(job).await.context("adding scheduler job")?;
        Ok(Some(sched))
    }
}

/// Pipeline over the on-disk store, configured from the environment.
pub async fn pipeline_from_env() -> Result<Arc<IngestPipeline>> {
    let config = SyncConfig::from_env();
    let store: Arc<dyn EventStore> = Arc::new(FileEventStore::new(config.store_dir.clone()));
    Ok(Arc::new(IngestPipeline::from_config(config, store).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use evcal_adapters::{Crawlability, DetailTarget};
    use evcal_core::{derive_event_id, AddressView};
    use evcal_storage::MemoryEventStore;

    const REGISTRY: &str = r#"
sources:
  - source_id: scottish-athletics
    display_name: Scottish Athletics events
    enabled: true
    kind: widget_api
  - source_id: bmc
    display_name: British Milers' Club fixtures
    enabled: true
    kind: fixtures_page
    page_url: https://www.britishmilersclub.com/fixtures/
    category: Track & Field
  - source_id: parked
    display_name: Parked source
    enabled: false
    kind: fixtures_page
"#;

    fn event(name: &str, handle: &str) -> Event {
        let start_date = NaiveDate::from_ymd_opt(2025, 6, 1);
        Event {
            id: derive_event_id(name, "2025-06-01", handle),
            source: "stub".into(),
            external_id: String::new(),
            name: name.into(),
            start_date,
            end_date: None,
            location: "Pitreavie".into(),
            lat_lng: String::new(),
            address: AddressView::default(),
            category: "Track".into(),
            detail_html: String::new(),
            source_url: String::new(),
            doc_hash: handle.into(),
        }
    }

    enum Listing {
        Items(Vec<&'static str>),
        Malformed,
        Unreachable,
    }

    struct StubAdapter {
        id: &'static str,
        listing: Listing,
        details: HashMap<&'static str, Option<Event>>,
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn source_id(&self) -> &str {
            self.id
        }

        fn crawlability(&self) -> Crawlability {
            Crawlability::Api
        }

        async fn fetch_listing(&self, _http: &HttpFetcher) -> Result<Vec<DetailTarget>, AdapterError> {
            match &self.listing {
                Listing::Items(keys) => Ok(keys
                    .iter()
                    .map(|k| DetailTarget {
                        key: k.to_string(),
                        label: k.to_string(),
                    })
                    .collect()),
                Listing::Malformed => Err(AdapterError::MalformedSource("not json".into())),
                Listing::Unreachable => Err(AdapterError::Transport(FetchError::HttpStatus {
                    status: 503,
                    url: "http://upstream.test/".into(),
                })),
            }
        }

        async fn fetch_detail(
            &self,
            _http: &HttpFetcher,
            target: &DetailTarget,
        ) -> Result<Option<Event>, AdapterError> {
            self.details
                .get(target.key.as_str())
                .cloned()
                .ok_or_else(|| AdapterError::MalformedSource(format!("bad detail {}", target.key)))
        }
    }

    fn keyed_config() -> SyncConfig {
        SyncConfig {
            update_api_key: Some("s3cret".into()),
            ..SyncConfig::default()
        }
    }

    fn pipeline(store: Arc<MemoryEventStore>, adapters: Vec<Box<dyn SourceAdapter>>) -> IngestPipeline {
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        IngestPipeline::new(keyed_config(), http, store, adapters)
    }

    #[test]
    fn registry_builds_adapters_for_enabled_sources() {
        let registry = SourceRegistry::parse(REGISTRY).unwrap();
        let adapters = registry
            .enabled()
            .map(adapter_for_source)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(adapters.len(), 2);
        assert_eq!(adapters[0].source_id(), "scottish-athletics");
        assert_eq!(adapters[0].crawlability(), Crawlability::Api);
        assert_eq!(adapters[1].source_id(), "bmc");
        assert_eq!(adapters[1].crawlability(), Crawlability::PublicHtml);
    }

    #[test]
    fn blank_overrides_are_rejected() {
        let registry = SourceRegistry::parse(
            "sources:\n  - {source_id: x, display_name: X, enabled: true, kind: widget_api, endpoint: '  '}\n",
        )
        .unwrap();
        assert!(adapter_for_source(&registry.sources[0]).is_err());
        assert!(SourceRegistry::parse("sources:\n  - {source_id: x, kind: ftp}\n").is_err());
    }

    #[tokio::test]
    async fn registry_load_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("sources.yaml");
        let err = SourceRegistry::load(&missing).await.unwrap_err();
        assert!(err.to_string().contains("sources.yaml"));

        std::fs::write(&missing, REGISTRY).unwrap();
        assert_eq!(SourceRegistry::load(&missing).await.unwrap().sources.len(), 3);
    }

    #[tokio::test]
    async fn from_config_wires_only_enabled_sources() {
        let dir = tempfile::tempdir().unwrap();
        let sources_file = dir.path().join("sources.yaml");
        std::fs::write(&sources_file, REGISTRY).unwrap();
        let config = SyncConfig {
            sources_file,
            ..SyncConfig::default()
        };
        let pipeline = IngestPipeline::from_config(config, Arc::new(MemoryEventStore::new()))
            .await
            .unwrap();
        assert_eq!(pipeline.source_ids(), vec!["scottish-athletics", "bmc"]);
    }

    #[test]
    fn trigger_key_must_match_a_configured_secret() {
        let config = keyed_config();
        assert!(config.accepts_key(Some("s3cret")));
        assert!(!config.accepts_key(Some("S3CRET")));
        assert!(!config.accepts_key(Some("")));
        assert!(!config.accepts_key(None));

        let unset = SyncConfig::default();
        assert!(!unset.accepts_key(Some("s3cret")));
        assert!(!unset.accepts_key(Some("")));
        assert!(!unset.accepts_key(None));
    }

    #[tokio::test]
    async fn reconciler_reports_created_then_replaced() {
        let store = Arc::new(MemoryEventStore::new());
        let reconciler = Reconciler::new(store.clone());
        let mut ev = event("Fife AC Open", "a1");
        assert_eq!(reconciler.upsert(&ev).await.unwrap(), UpsertOutcome::Created);

        ev.location = "Pitreavie Athletics Centre".into();
        assert_eq!(reconciler.upsert(&ev).await.unwrap(), UpsertOutcome::Replaced);
        let stored = store.event(&ev.id).await.unwrap().unwrap();
        assert_eq!(stored, ev);
        assert_eq!(store.summaries().await.unwrap(), vec![ev.summary()]);
    }

    #[tokio::test]
    async fn reconciler_rejects_empty_ids() {
        let store = Arc::new(MemoryEventStore::new());
        let mut ev = event("Nameless", "");
        ev.id = String::new();
        let err = Reconciler::new(store.clone()).upsert(&ev).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidId(_)));
        assert!(store.summaries().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_skips_bad_items_and_malformed_listings() {
        let store = Arc::new(MemoryEventStore::new());
        let good = event("Fife AC Open", "a1");
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![
            Box::new(StubAdapter {
                id: "broken-listing",
                listing: Listing::Malformed,
                details: HashMap::new(),
            }),
            Box::new(StubAdapter {
                id: "widget",
                listing: Listing::Items(vec!["a1", "gone", "garbled"]),
                details: HashMap::from([("a1", Some(good.clone())), ("gone", None)]),
            }),
        ];
        let pipeline = pipeline(store.clone(), adapters);

        let summary = pipeline.run_once().await.unwrap();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.persisted, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(store.summaries().await.unwrap(), vec![good.summary()]);

        let again = pipeline.run_once().await.unwrap();
        assert_eq!((again.created, again.replaced), (0, 1));
        assert_eq!(store.summaries().await.unwrap(), vec![good.summary()]);
    }

    #[tokio::test]
    async fn unreachable_listing_fails_the_run() {
        let store = Arc::new(MemoryEventStore::new());
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(StubAdapter {
            id: "widget",
            listing: Listing::Unreachable,
            details: HashMap::new(),
        })];
        let err = pipeline(store, adapters).run_once().await.unwrap_err();
        match err {
            IngestError::Transport { source_id, .. } => assert_eq!(source_id, "widget"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthorized_trigger_touches_nothing() {
        let store = Arc::new(MemoryEventStore::new());
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(StubAdapter {
            id: "widget",
            listing: Listing::Items(vec!["a1"]),
            details: HashMap::from([("a1", Some(event("Fife AC Open", "a1")))]),
        })];
        let pipeline = pipeline(store.clone(), adapters);

        assert!(matches!(
            pipeline.trigger(Some("guess")).await,
            Err(IngestError::Unauthorized)
        ));
        assert!(matches!(pipeline.trigger(None).await, Err(IngestError::Unauthorized)));
        assert!(store.summaries().await.unwrap().is_empty());

        let summary = pipeline.trigger(Some("s3cret")).await.unwrap();
        assert_eq!(summary.persisted, 1);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["totalEvents"], 1);
    }

    #[tokio::test]
    async fn scheduler_is_off_unless_enabled() {
        let store = Arc::new(MemoryEventStore::new());
        let pipeline = Arc::new(pipeline(store, Vec::new()));
        assert!(pipeline.maybe_build_scheduler().await.unwrap().is_none());
    }
}
