//! Filter, sort and paginate the cached summary collection.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{iso_date_or_empty, parse_iso_date, EventSummary};

pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Name,
    #[default]
    Date,
    Location,
    Category,
}

impl SortField {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" => Some(Self::Name),
            "date" => Some(Self::Date),
            "location" => Some(Self::Location),
            "category" | "type" => Some(Self::Category),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }
}

/// Raw request parameters, all optional and unvalidated.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub page: Option<String>,
    pub page_size: Option<String>,
    #[serde(alias = "sortField")]
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
    #[serde(rename = "type")]
    pub type_filter: Option<String>,
    pub city: Option<String>,
    pub after: Option<String>,
    pub before: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub page: usize,
    pub page_size: usize,
    pub sort_field: SortField,
    pub sort_dir: SortDir,
    pub type_filter: Option<String>,
    pub city_filter: Option<String>,
    pub date_after: Option<NaiveDate>,
    pub date_before: Option<NaiveDate>,
}

impl Default for EventQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_field: SortField::default(),
            sort_dir: SortDir::default(),
            type_filter: None,
            city_filter: None,
            date_after: None,
            date_before: None,
        }
    }
}

impl EventQuery {
    /// Missing or invalid values fall back to the defaults; unparsable date
    /// bounds are ignored.
    pub fn from_params(params: &QueryParams) -> Self {
        Self {
            page: positive(params.page.as_deref()).unwrap_or(1),
            page_size: positive(params.page_size.as_deref()).unwrap_or(DEFAULT_PAGE_SIZE),
            sort_field: params
                .sort_by
                .as_deref()
                .and_then(SortField::parse)
                .unwrap_or_default(),
            sort_dir: params
                .sort_dir
                .as_deref()
                .and_then(SortDir::parse)
                .unwrap_or_default(),
            type_filter: non_blank(params.type_filter.as_deref()),
            city_filter: non_blank(params.city.as_deref()),
            date_after: params.after.as_deref().and_then(parse_iso_date),
            date_before: params.before.as_deref().and_then(parse_iso_date),
        }
    }
}

fn positive(raw: Option<&str>) -> Option<usize> {
    raw?.trim().parse::<usize>().ok().filter(|n| *n >= 1)
}

fn non_blank(raw: Option<&str>) -> Option<String> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPage {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub events: Vec<EventSummary>,
    #[serde(with = "iso_date_or_empty", default)]
    pub earliest: Option<NaiveDate>,
    #[serde(with = "iso_date_or_empty", default)]
    pub latest: Option<NaiveDate>,
    pub types: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("no cached events")]
    EmptyCollection,
}

/// Produce one page of results plus aggregates over the filtered set.
pub fn run_query(all: &[EventSummary], query: &EventQuery) -> Result<EventPage, QueryError> {
    if all.is_empty() {
        return Err(QueryError::EmptyCollection);
    }

    let mut filtered = all
        .iter()
        .filter(|e| within_date_range(e, query))
        .filter(|e| matches_type(e, query))
        .filter(|e| matches_city(e, query))
        .collect::<Vec<_>>();

    // `sort_by` is stable; reversing the ordering keeps ties in input order.
    filtered.sort_by(|a, b| {
        let ord = compare_by(a, b, query.sort_field);
        match query.sort_dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    });

    let types = filtered
        .iter()
        .map(|e| e.category.trim())
        .filter(|c| !c.is_empty())
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let earliest = filtered.iter().filter_map(|e| e.start_date).min();
    let latest = filtered.iter().filter_map(|e| e.start_date).max();

    let total = filtered.len();
    let offset = (query.page.max(1) - 1).saturating_mul(query.page_size);
    let events = filtered
        .into_iter()
        .skip(offset)
        .take(query.page_size)
        .cloned()
        .collect::<Vec<_>>();

    Ok(EventPage {
        page: query.page,
        page_size: query.page_size,
        total,
        events,
        earliest,
        latest,
        types,
    })
}

fn within_date_range(event: &EventSummary, query: &EventQuery) -> bool {
    if query.date_after.is_none() && query.date_before.is_none() {
        return true;
    }
    let Some(date) = event.start_date else {
        return false;
    };
    query.date_after.map_or(true, |after| date >= after)
        && query.date_before.map_or(true, |before| date <= before)
}

fn matches_type(event: &EventSummary, query: &EventQuery) -> bool {
    query
        .type_filter
        .as_deref()
        .map_or(true, |t| event.category.trim().to_lowercase() == t.to_lowercase())
}

fn matches_city(event: &EventSummary, query: &EventQuery) -> bool {
    query
        .city_filter
        .as_deref()
        .map_or(true, |city| event.location.trim() == city)
}

fn compare_by(a: &EventSummary, b: &EventSummary, field: SortField) -> Ordering {
    match field {
        SortField::Name => a.name.cmp(&b.name),
        SortField::Date => a.start_date.cmp(&b.start_date),
        SortField::Location => a.location.cmp(&b.location),
        SortField::Category => a.category.cmp(&b.category),
    }
}
