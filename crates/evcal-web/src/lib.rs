//! Axum JSON API for evcal: ingestion trigger, event listing and lookup.

use std::sync::Arc;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use evcal_core::{run_query, EventQuery, QueryError, QueryParams};
use evcal_storage::{EventStore, StoreError};
use evcal_sync::{IngestError, IngestPipeline};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

pub const CRATE_NAME: &str = "evcal-web";

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub pipeline: Arc<IngestPipeline>,
}

impl AppState {
    pub fn new(pipeline: Arc<IngestPipeline>) -> Self {
        Self {
            store: pipeline.store(),
            pipeline,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateBody {
    success: bool,
    total_events: usize,
}

#[derive(Debug, Default, Deserialize)]
struct UpdateParams {
    key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EventLookupParams {
    id: Option<String>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/update", get(update_handler).post(update_handler))
        .route("/api/events", get(events_handler))
        .route("/api/event", get(event_by_query_handler))
        .route("/api/event/{id}", get(event_by_path_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "serving event API");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Serve over the on-disk store, with the cron scheduler when enabled.
pub async fn serve_from_env() -> anyhow::Result<()> {
    let pipeline = evcal_sync::pipeline_from_env().await?;
    let port = pipeline.config().web_port;
    let scheduler = pipeline.maybe_build_scheduler().await?;
    if let Some(sched) = &scheduler {
        sched.start().await?;
        info!(cron = %pipeline.config().sync_cron, "ingestion scheduler started");
    }
    serve(AppState::new(pipeline), port).await
}

async fn update_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<UpdateParams>,
) -> Response {
    let header_key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    let key = params.key.as_deref().or(header_key);

    match state.pipeline.trigger(key).await {
        Ok(summary) => Json(UpdateBody {
            success: true,
            total_events: summary.total_events,
        })
        .into_response(),
        Err(IngestError::Unauthorized) => error_response(StatusCode::UNAUTHORIZED, "Unauthorized"),
        Err(err) => {
            warn!(error = %err, "triggered ingestion failed");
            error_response(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

async fn events_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<QueryParams>,
) -> Response {
    let summaries = match state.store.summaries().await {
        Ok(summaries) => summaries,
        Err(err) => return store_error(err),
    };
    match run_query(&summaries, &EventQuery::from_params(&params)) {
        Ok(page) => Json(page).into_response(),
        Err(QueryError::EmptyCollection) => error_response(StatusCode::NOT_FOUND, "No cached data"),
    }
}

async fn event_by_query_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EventLookupParams>,
) -> Response {
    lookup_event(&state, params.id.as_deref()).await
}

async fn event_by_path_handler(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    lookup_event(&state, Some(&id)).await
}

async fn lookup_event(state: &AppState, id: Option<&str>) -> Response {
    let Some(id) = id.map(str::trim).filter(|id| !id.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing event id");
    };
    match state.store.event(id).await {
        Ok(Some(event)) => Json(event).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Event not found"),
        Err(err) => store_error(err),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

fn store_error(err: StoreError) -> Response {
    error!(error = %err, "event store failure");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use evcal_adapters::{SourceAdapter, WidgetApiAdapter, WidgetApiConfig};
    use evcal_core::{derive_event_id, AddressView, Event};
    use evcal_storage::{HttpClientConfig, HttpFetcher, MemoryEventStore};
    use evcal_sync::SyncConfig;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    fn event(name: &str, date: (i32, u32, u32), location: &str, category: &str) -> Event {
        let start_date = NaiveDate::from_ymd_opt(date.0, date.1, date.2);
        let iso = evcal_core::iso_date(start_date);
        Event {
            id: derive_event_id(name, &iso, ""),
            source: "test".into(),
            external_id: String::new(),
            name: name.into(),
            start_date,
            end_date: None,
            location: location.into(),
            lat_lng: String::new(),
            address: AddressView::default(),
            category: category.into(),
            detail_html: "<p>details</p>".into(),
            source_url: String::new(),
            doc_hash: String::new(),
        }
    }

    fn state_with(store: Arc<MemoryEventStore>, adapters: Vec<Box<dyn SourceAdapter>>) -> AppState {
        let config = SyncConfig {
            update_api_key: Some("s3cret".into()),
            ..SyncConfig::default()
        };
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        AppState::new(Arc::new(IngestPipeline::new(config, http, store, adapters)))
    }

    async fn seeded() -> (AppState, Vec<Event>) {
        let store = Arc::new(MemoryEventStore::new());
        let events = vec![
            event("A", (2025, 6, 1), "Edinburgh", "Track"),
            event("B", (2025, 6, 15), "Glasgow", "Road"),
            event("C", (2025, 7, 20), "Glasgow", "Track"),
        ];
        for ev in &events {
            store.put_event(ev).await.unwrap();
        }
        (state_with(store, Vec::new()), events)
    }

    async fn call(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
        let resp = app(state).oneshot(request).await.unwrap();
        let status = resp.status();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        call(state, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
    }

    #[tokio::test]
    async fn events_on_empty_store_is_not_found() {
        let state = state_with(Arc::new(MemoryEventStore::new()), Vec::new());
        let (status, body) = get_json(state, "/api/events").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No cached data");
    }

    #[tokio::test]
    async fn events_filters_sorts_and_aggregates() {
        let (state, events) = seeded().await;
        let (status, body) = get_json(
            state,
            "/api/events?after=2025-06-01&before=2025-06-30&sortBy=date&sortDir=asc",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["page"], 1);
        assert_eq!(body["pageSize"], 10);
        assert_eq!(body["events"][0]["id"], events[0].id.as_str());
        assert_eq!(body["events"][1]["id"], events[1].id.as_str());
        assert_eq!(body["earliest"], "2025-06-01");
        assert_eq!(body["latest"], "2025-06-15");
        assert_eq!(body["types"], serde_json::json!(["Road", "Track"]));
    }

    #[tokio::test]
    async fn events_pages_and_tolerates_bad_params() {
        let (state, events) = seeded().await;
        let (_, body) = get_json(state.clone(), "/api/events?pageSize=2&page=2&sortDir=desc").await;
        assert_eq!(body["total"], 3);
        assert_eq!(body["events"].as_array().unwrap().len(), 1);
        assert_eq!(body["events"][0]["id"], events[0].id.as_str());

        let (status, body) = get_json(state.clone(), "/api/events?page=zero&pageSize=-3&sortBy=nope").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["page"], 1);
        assert_eq!(body["pageSize"], 10);

        let (_, body) = get_json(state, "/api/events?city=Glasgow&type=track").await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["events"][0]["name"], "C");
    }

    #[tokio::test]
    async fn event_lookup_by_query_and_path() {
        let (state, events) = seeded().await;
        let id = &events[1].id;

        let (status, body) = get_json(state.clone(), &format!("/api/event?id={id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "B");
        assert_eq!(body["detailHtml"], "<p>details</p>");

        let (status, body) = get_json(state.clone(), &format!("/api/event/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["startDate"], "2025-06-15");

        let (status, body) = get_json(state.clone(), "/api/event?id=ffffffff").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Event not found");

        for uri in ["/api/event", "/api/event?id=", "/api/event?id=%20"] {
            let (status, body) = get_json(state.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["error"], "Missing event id");
        }
    }

    #[tokio::test]
    async fn update_requires_the_shared_key() {
        let (state, _) = seeded().await;
        let (status, body) = get_json(state.clone(), "/api/update").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Unauthorized");

        let (status, _) = get_json(state.clone(), "/api/update?key=guess").await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = get_json(state.clone(), "/api/update?key=s3cret").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["totalEvents"], 0);

        let (status, _) = call(
            state,
            Request::builder()
                .method("POST")
                .uri("/api/update")
                .header(API_KEY_HEADER, "s3cret")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn update_reports_unreachable_upstream() {
        let mut widget = WidgetApiConfig::new("scottish-athletics");
        widget.endpoint = "http://127.0.0.1:9/widget".into();
        let adapters: Vec<Box<dyn SourceAdapter>> = vec![Box::new(WidgetApiAdapter::new(widget))];
        let state = state_with(Arc::new(MemoryEventStore::new()), adapters);

        let (status, body) = get_json(state, "/api/update?key=s3cret").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("scottish-athletics"));
    }
}
