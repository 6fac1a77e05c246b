//! Source adapter contracts, the widget command API and meeting fixtures
//! page adapters, and normalization into the canonical [`Event`].

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Utc};
use evcal_core::{decode_widget_date, derive_event_id, iso_date, AddressView, Event, PostalAddress};
use evcal_storage::{FetchError, HttpFetcher};
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use thiserror::Error;
use tracing::warn;

pub const CRATE_NAME: &str = "evcal-adapters";

pub const DEFAULT_WIDGET_ENDPOINT: &str =
    "https://scottishathletics.justgo.com/WidgetService.mvc/ExecuteWidgetCommandAlt";
pub const DEFAULT_WIDGET_ORIGIN: &str = "https://scottishathletics.justgo.com";
pub const DEFAULT_WIDGET_REFERER: &str =
    "https://scottishathletics.justgo.com/Workbench/r/public/EventsAndBookingsPublic/browse/";
pub const DEFAULT_FIXTURES_URL: &str = "https://www.britishmilersclub.com/fixtures/";
pub const DEFAULT_LISTING_MARKER: &str = "meeting";
pub const DEFAULT_MEETING_CATEGORY: &str = "Track & Field";

/// Rows requested by the bulk listing call; large enough to mean "everything".
const FIND_EVENTS_PAGE_SIZE: u32 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Crawlability {
    PublicHtml,
    Api,
}

/// One item from a source listing, ready for its detail fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailTarget {
    /// Detail handle (widget API) or absolute page URL (fixtures page).
    pub key: String,
    pub label: String,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("malformed source data: {0}")]
    MalformedSource(String),
    #[error(transparent)]
    Transport(#[from] FetchError),
}

impl AdapterError {
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_id(&self) -> &str;
    fn crawlability(&self) -> Crawlability;

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<Vec<DetailTarget>, AdapterError>;

    /// `Ok(None)` when the source has no detail for the target.
    async fn fetch_detail(
        &self,
        http: &HttpFetcher,
        target: &DetailTarget,
    ) -> Result<Option<Event>, AdapterError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetApiConfig {
    pub source_id: String,
    pub endpoint: String,
    pub origin: String,
    pub referer: String,
}

impl WidgetApiConfig {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            endpoint: DEFAULT_WIDGET_ENDPOINT.to_string(),
            origin: DEFAULT_WIDGET_ORIGIN.to_string(),
            referer: DEFAULT_WIDGET_REFERER.to_string(),
        }
    }
}

/// Immutable description of one POST to the command endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: JsonValue,
}

impl CommandRequest {
    pub fn header_pairs(&self) -> Vec<(&str, &str)> {
        self.headers
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect()
    }
}

fn widget_headers(config: &WidgetApiConfig) -> Vec<(&'static str, String)> {
    vec![
        (
            "accept",
            "text/javascript, application/javascript, application/ecmascript, application/x-ecmascript, */*; q=0.01"
                .to_string(),
        ),
        ("accept-language", "en-GB,en-US;q=0.9,en;q=0.8".to_string()),
        ("content-type", "application/json".to_string()),
        ("dnt", "1".to_string()),
        ("origin", config.origin.clone()),
        ("referer", config.referer.clone()),
        ("x-requested-with", "XMLHttpRequest".to_string()),
    ]
}

fn command_body(arguments: JsonValue) -> JsonValue {
    json!({
        "payload": {
            "commands": [{
                "Id": 1,
                "Service": "GDE",
                "Method": "FetchObjectsPublic",
                "Arguments": ["Event", arguments],
            }],
        },
        "paths": ["commands"],
    })
}

pub fn find_events_request(config: &WidgetApiConfig) -> CommandRequest {
    CommandRequest {
        url: config.endpoint.clone(),
        headers: widget_headers(config),
        body: command_body(json!({
            "Method": "FindEvents",
            "key": "",
            "Categories": {},
            "Provider": [],
            "OrderBy": "asc",
            "SortBy": "distance",
            "PageNumber": 1,
            "NumberOfRows": FIND_EVENTS_PAGE_SIZE,
            "IsShop": false,
            "InstallmentAvailable": false,
            "SortByRegion": { "Lat": "0", "Lng": "0" },
        })),
    }
}

pub fn event_details_request(config: &WidgetApiConfig, doc_hash: &str) -> CommandRequest {
    CommandRequest {
        url: config.endpoint.clone(),
        headers: widget_headers(config),
        body: command_body(json!({
            "Method": "GetEventDetails",
            "IsShop": false,
            "EventDocIdHash": doc_hash,
            "PreviewMode": false,
            "PastEvent": false,
        })),
    }
}

#[derive(Debug, Deserialize)]
struct CommandResponse<T> {
    #[serde(rename = "Result")]
    result: Option<CommandResult<T>>,
}

#[derive(Debug, Deserialize)]
struct CommandResult<T> {
    #[serde(rename = "Result")]
    result: Option<T>,
}

fn first_result<T>(responses: Vec<CommandResponse<T>>) -> Option<T> {
    responses.into_iter().next()?.result?.result
}

#[derive(Debug, Deserialize)]
struct FindEventsData {
    #[serde(rename = "Data")]
    data: Option<Vec<JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct EventDetailsData {
    #[serde(rename = "EventInfo")]
    event_info: Option<JsonValue>,
}

/// String member of a JSON object. Absent, null and non-string values are `None`.
fn str_field(value: &JsonValue, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

/// Scalar member rendered as text; upstream sends ids and postcodes as
/// either strings or numbers.
fn scalar_field(value: &JsonValue, key: &str) -> Option<String> {
    match value.get(key)? {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Raw `/Date(...)/` text from a `{ "Date": ... }` wrapper.
fn date_field(value: &JsonValue, key: &str) -> Option<String> {
    str_field(value.get(key)?, "Date")
}

fn postal_address(value: &JsonValue) -> Option<PostalAddress> {
    if !value.is_object() {
        return None;
    }
    Some(PostalAddress {
        line1: scalar_field(value, "Address1"),
        line2: scalar_field(value, "Address2"),
        line3: scalar_field(value, "Address3"),
        town: scalar_field(value, "Town"),
        county: scalar_field(value, "County"),
        postcode: scalar_field(value, "Postcode"),
        country: scalar_field(value, "Country"),
    })
}

/// Listing entry from the bulk `FindEvents` call. Every listed item is kept;
/// one without a detail handle is skipped when its detail is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetSummary {
    pub external_id: String,
    pub name: String,
    pub raw_date: String,
    pub location: String,
    pub category: String,
    pub detail_handle: Option<String>,
}

impl WidgetSummary {
    pub fn from_value(item: &JsonValue) -> Self {
        Self {
            external_id: scalar_field(item, "DocId").unwrap_or_default(),
            name: str_field(item, "EventName").unwrap_or_default(),
            raw_date: date_field(item, "Starts").unwrap_or_default(),
            location: str_field(item, "Location").unwrap_or_default(),
            category: str_field(item, "EventCategory").unwrap_or_default(),
            detail_handle: non_blank(str_field(item, "EventDocIdHash")),
        }
    }
}

/// `EventInfo` object from `GetEventDetails`; every field may be absent or
/// of an unexpected type, which reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WidgetEventInfo {
    pub doc_id: Option<String>,
    pub event_name: Option<String>,
    pub starts: Option<String>,
    pub ends: Option<String>,
    pub event_location: Option<String>,
    pub latlng: Option<String>,
    pub address: Option<PostalAddress>,
    pub event_detail: Option<String>,
    pub event_category: Option<String>,
    pub direct_link: Option<String>,
    pub event_doc_id_hash: Option<String>,
}

impl WidgetEventInfo {
    pub fn from_value(info: &JsonValue) -> Self {
        Self {
            doc_id: scalar_field(info, "DocId"),
            event_name: str_field(info, "EventName"),
            starts: date_field(info, "Starts"),
            ends: date_field(info, "Ends"),
            event_location: str_field(info, "EventLocation"),
            latlng: scalar_field(info, "Latlng"),
            address: info.get("Address").and_then(postal_address),
            event_detail: str_field(info, "EventDetail"),
            event_category: str_field(info, "EventCategory"),
            direct_link: str_field(info, "DirectLink"),
            event_doc_id_hash: str_field(info, "EventDocIdHash"),
        }
    }
}

/// Parse the bulk listing response. A body without the expected result path
/// is an empty listing; each entry is read field by field so one odd item
/// never costs the rest of the listing.
pub fn parse_find_events(body: &[u8]) -> Result<Vec<WidgetSummary>, AdapterError> {
    let responses: Vec<CommandResponse<FindEventsData>> = serde_json::from_slice(body)
        .map_err(|e| AdapterError::MalformedSource(format!("find events response: {e}")))?;
    let items = first_result(responses)
        .and_then(|d| d.data)
        .unwrap_or_default();
    Ok(items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                warn!(index, "listing item is not an object");
            }
            WidgetSummary::from_value(item)
        })
        .collect())
}

pub fn parse_event_details(body: &[u8]) -> Result<Option<WidgetEventInfo>, AdapterError> {
    let responses: Vec<CommandResponse<EventDetailsData>> = serde_json::from_slice(body)
        .map_err(|e| AdapterError::MalformedSource(format!("event details response: {e}")))?;
    match first_result(responses).and_then(|d| d.event_info) {
        None => Ok(None),
        Some(info) if info.is_object() => Ok(Some(WidgetEventInfo::from_value(&info))),
        Some(_) => Err(AdapterError::MalformedSource(
            "event details response: EventInfo is not an object".into(),
        )),
    }
}

/// Map a widget `EventInfo` onto the canonical event. `fallback_handle` is
/// used when the detail omits its own `EventDocIdHash`.
pub fn normalize_widget_event(
    source_id: &str,
    info: WidgetEventInfo,
    fallback_handle: &str,
) -> Event {
    let name = info.event_name.unwrap_or_default();
    let start_date = info.starts.as_deref().and_then(decode_widget_date);
    let end_date = info.ends.as_deref().and_then(decode_widget_date);
    let doc_hash =
        non_blank(info.event_doc_id_hash).unwrap_or_else(|| fallback_handle.to_string());

    Event {
        id: derive_event_id(&name, &iso_date(start_date), &doc_hash),
        source: source_id.to_string(),
        external_id: info.doc_id.unwrap_or_default(),
        name,
        start_date,
        end_date,
        location: info.event_location.unwrap_or_default(),
        lat_lng: info.latlng.unwrap_or_default(),
        address: AddressView::from_raw(info.address),
        category: info.event_category.unwrap_or_default(),
        detail_html: info.event_detail.unwrap_or_default(),
        source_url: info.direct_link.unwrap_or_default(),
        doc_hash,
    }
}

#[derive(Debug, Clone)]
pub struct WidgetApiAdapter {
    config: WidgetApiConfig,
}

impl WidgetApiAdapter {
    pub fn new(config: WidgetApiConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WidgetApiConfig {
        &self.config
    }

    async fn post(&self, http: &HttpFetcher, request: &CommandRequest) -> Result<Vec<u8>, AdapterError> {
        let resp = http
            .post_json(
                &self.config.source_id,
                &request.url,
                &request.header_pairs(),
                &request.body,
            )
            .await?;
        Ok(resp.body)
    }

    pub async fn list_summaries(&self, http: &HttpFetcher) -> Result<Vec<WidgetSummary>, AdapterError> {
        let body = self.post(http, &find_events_request(&self.config)).await?;
        parse_find_events(&body)
    }

    pub async fn fetch_event_info(
        &self,
        http: &HttpFetcher,
        detail_handle: &str,
    ) -> Result<Option<WidgetEventInfo>, AdapterError> {
        let body = self
            .post(http, &event_details_request(&self.config, detail_handle))
            .await?;
        parse_event_details(&body)
    }
}

#[async_trait]
impl SourceAdapter for WidgetApiAdapter {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::Api
    }

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<Vec<DetailTarget>, AdapterError> {
        Ok(self
            .list_summaries(http)
            .await?
            .into_iter()
            .map(|s| DetailTarget {
                key: s.detail_handle.unwrap_or_default(),
                label: s.name,
            })
            .collect())
    }

    async fn fetch_detail(
        &self,
        http: &HttpFetcher,
        target: &DetailTarget,
    ) -> Result<Option<Event>, AdapterError> {
        if target.key.trim().is_empty() {
            return Err(AdapterError::MalformedSource(format!(
                "listing item {:?} has no EventDocIdHash",
                target.label
            )));
        }
        let info = self.fetch_event_info(http, &target.key).await?;
        Ok(info.map(|info| normalize_widget_event(&self.config.source_id, info, &target.key)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixturesPageConfig {
    pub source_id: String,
    pub page_url: String,
    pub listing_marker: String,
    pub category: String,
}

impl FixturesPageConfig {
    pub fn new(source_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            page_url: DEFAULT_FIXTURES_URL.to_string(),
            listing_marker: DEFAULT_LISTING_MARKER.to_string(),
            category: DEFAULT_MEETING_CATEGORY.to_string(),
        }
    }
}

/// Details scraped for one meeting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingPage {
    pub title: String,
    pub location: String,
    pub date: NaiveDate,
    pub category: String,
    pub url: String,
    pub description: String,
}

/// What the meeting page itself yields before the venue fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MeetingDocument {
    pub venue_href: Option<String>,
    pub description: String,
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::MalformedSource(e.to_string()))
}

fn element_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    Url::parse(base).ok()?.join(href).ok().map(|u| u.to_string())
}

/// Meeting links on the fixtures page: href carries `marker` and the link
/// text mentions `reference_year` or the year after. Order of first
/// appearance is kept, duplicates dropped.
pub fn candidate_links(
    html: &str,
    page_url: &str,
    marker: &str,
    reference_year: i32,
) -> Result<Vec<String>, AdapterError> {
    let document = Html::parse_document(html);
    let anchors = selector("a[href]")?;
    let years = [reference_year.to_string(), (reference_year + 1).to_string()];

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let text = element_text(&anchor);
        if !href.contains(marker) || !years.iter().any(|y| text.contains(y.as_str())) {
            continue;
        }
        let Some(url) = absolute_url(page_url, href) else {
            continue;
        };
        if seen.insert(url.clone()) {
            links.push(url);
        }
    }
    Ok(links)
}

fn month_from_abbreviation(token: &str) -> Option<u32> {
    let abbrev = token.chars().take(3).collect::<String>().to_ascii_lowercase();
    let month = match abbrev.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn title_case(words: &[&str]) -> String {
    words
        .iter()
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    let mut s = String::new();
                    s.extend(first.to_uppercase());
                    s.push_str(chars.as_str());
                    s
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Title and date encoded in a meeting URL such as
/// `/meeting/bmc-grand-prix-sport-city-14-jun-2025/`.
pub fn parse_meeting_url(url: &str) -> Result<(String, NaiveDate), AdapterError> {
    let malformed = |why: &str| AdapterError::MalformedSource(format!("meeting url {url}: {why}"));

    let parsed = Url::parse(url).map_err(|e| malformed(&e.to_string()))?;
    let slug = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .last()
        .ok_or_else(|| malformed("no path segment"))?
        .to_string();
    let tokens = slug.split('-').collect::<Vec<_>>();
    if tokens.len() < 4 {
        return Err(malformed("expected title followed by day-month-year"));
    }
    let (title_tokens, date_tokens) = tokens.split_at(tokens.len() - 3);

    let day: u32 = date_tokens[0]
        .parse()
        .map_err(|_| malformed("day is not a number"))?;
    let month = month_from_abbreviation(date_tokens[1]).ok_or_else(|| malformed("unknown month"))?;
    let year: i32 = date_tokens[2]
        .parse()
        .map_err(|_| malformed("year is not a number"))?;
    let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| malformed("no such date"))?;

    Ok((title_case(title_tokens), date))
}

fn find_quick_links_heading<'a>(document: &'a Html) -> Option<ElementRef<'a>> {
    let headings = Selector::parse("h2").ok()?;
    document
        .select(&headings)
        .find(|h| element_text(h).to_lowercase().contains("quick links"))
}

fn heading_container(heading: ElementRef<'_>) -> Option<ElementRef<'_>> {
    heading.parent()?.parent().and_then(ElementRef::wrap)
}

fn following_element(container: ElementRef<'_>) -> Option<ElementRef<'_>> {
    container.next_siblings().find_map(ElementRef::wrap)
}

fn venue_anchor_href(links: ElementRef<'_>) -> Option<String> {
    let anchors = Selector::parse("a").ok()?;
    links
        .select(&anchors)
        .find(|a| element_text(a).eq_ignore_ascii_case("venue"))?
        .value()
        .attr("href")
        .map(str::to_string)
}

/// Venue link from the page's "quick links" block, or `None` at the first
/// missing step.
pub fn venue_link(document: &Html, page_url: &str) -> Option<String> {
    let heading = find_quick_links_heading(document)?;
    let container = heading_container(heading)?;
    let links = following_element(container)?;
    let href = venue_anchor_href(links)?;
    absolute_url(page_url, &href)
}

pub fn parse_meeting_document(html: &str, page_url: &str) -> MeetingDocument {
    let document = Html::parse_document(html);
    let description = match Selector::parse("p") {
        Ok(paragraphs) => document
            .select(&paragraphs)
            .map(|p| element_text(&p))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"),
        Err(_) => String::new(),
    };
    MeetingDocument {
        venue_href: venue_link(&document, page_url),
        description,
    }
}

/// Venue name: the page title up to the first " - ".
pub fn venue_name_from_title(html: &str) -> String {
    let document = Html::parse_document(html);
    let Ok(title) = Selector::parse("title") else {
        return String::new();
    };
    let text = document
        .select(&title)
        .map(|t| element_text(&t))
        .collect::<String>();
    text.split(" - ").next().unwrap_or_default().trim().to_string()
}

pub fn normalize_meeting(source_id: &str, page: MeetingPage) -> Event {
    let start_date = Some(page.date);
    Event {
        id: derive_event_id(&page.title, &iso_date(start_date), ""),
        source: source_id.to_string(),
        external_id: String::new(),
        name: page.title,
        start_date,
        end_date: None,
        location: page.location,
        lat_lng: String::new(),
        address: AddressView::default(),
        category: page.category,
        detail_html: page.description,
        source_url: page.url,
        doc_hash: String::new(),
    }
}

#[derive(Debug, Clone)]
pub struct FixturesPageAdapter {
    config: FixturesPageConfig,
    reference_year: i32,
}

impl FixturesPageAdapter {
    pub fn new(config: FixturesPageConfig) -> Self {
        Self {
            config,
            reference_year: Utc::now().year(),
        }
    }

    pub fn with_reference_year(mut self, year: i32) -> Self {
        self.reference_year = year;
        self
    }

    pub fn config(&self) -> &FixturesPageConfig {
        &self.config
    }

    pub async fn list_candidate_links(&self, http: &HttpFetcher) -> Result<Vec<String>, AdapterError> {
        let page = http.get(&self.config.source_id, &self.config.page_url).await?;
        candidate_links(
            &page.text(),
            &page.final_url,
            &self.config.listing_marker,
            self.reference_year,
        )
    }

    pub async fn fetch_event_page(&self, http: &HttpFetcher, url: &str) -> Result<MeetingPage, AdapterError> {
        let (title, date) = parse_meeting_url(url)?;
        let page = http.get(&self.config.source_id, url).await?;
        let document = parse_meeting_document(&page.text(), &page.final_url);
        let location = match document.venue_href {
            Some(href) => self.fetch_venue_name(http, &href).await,
            None => String::new(),
        };
        Ok(MeetingPage {
            title,
            location,
            date,
            category: self.config.category.clone(),
            url: url.to_string(),
            description: document.description,
        })
    }

    async fn fetch_venue_name(&self, http: &HttpFetcher, venue_url: &str) -> String {
        match http.get(&self.config.source_id, venue_url).await {
            Ok(page) => venue_name_from_title(&page.text()),
            Err(err) => {
                warn!(source_id = %self.config.source_id, venue_url, error = %err, "venue lookup failed");
                String::new()
            }
        }
    }
}

#[async_trait]
impl SourceAdapter for FixturesPageAdapter {
    fn source_id(&self) -> &str {
        &self.config.source_id
    }

    fn crawlability(&self) -> Crawlability {
        Crawlability::PublicHtml
    }

    async fn fetch_listing(&self, http: &HttpFetcher) -> Result<Vec<DetailTarget>, AdapterError> {
        Ok(self
            .list_candidate_links(http)
            .await?
            .into_iter()
            .map(|url| DetailTarget {
                label: url.clone(),
                key: url,
            })
            .collect())
    }

    async fn fetch_detail(
        &self,
        http: &HttpFetcher,
        target: &DetailTarget,
    ) -> Result<Option<Event>, AdapterError> {
        let page = self.fetch_event_page(http, &target.key).await?;
        Ok(Some(normalize_meeting(&self.config.source_id, page)))
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
